//! reactor-httpd - single-threaded, non-blocking HTTP/1.1 front end
//!
//! A [`reactor::Reactor`] multiplexes socket readiness and drives one
//! request state machine per connection; complete requests are handed to an
//! [`app::Application`] and its response is written back before the
//! connection closes.

pub mod app;
pub mod config;
pub mod http;
pub mod reactor;
pub mod server;
