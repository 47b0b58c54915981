use bytes::BytesMut;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::{Application, Environment};
use crate::http::request::{ReadLimit, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::reactor::{Event, EventHandler, Handle, Reactor};

/// Value of `SERVER_SOFTWARE` in every request environment.
pub const SERVER_SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const READ_CHUNK: usize = 4096;

/// Per-connection data, owned by one [`RequestHandler`].
#[derive(Debug)]
pub struct ConnectionContext {
    pub server_name: String,
    pub server_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
    pub request: Request,
}

impl ConnectionContext {
    pub fn new(local: SocketAddr, peer: SocketAddr) -> Self {
        Self {
            server_name: local.ip().to_string(),
            server_port: local.port(),
            remote_addr: peer.ip().to_string(),
            remote_port: peer.port(),
            request: Request::new(),
        }
    }

    /// Builds the application environment and moves the request body into it.
    pub fn environment(&mut self) -> Environment {
        let mut env = Environment::new();
        env.insert("SERVER_SOFTWARE", SERVER_SOFTWARE);
        env.insert("SCRIPT_NAME", "");
        env.insert("REQUEST_START", unix_now());

        if let Some(head) = self.request.head() {
            for (name, value) in &head.headers {
                env.insert(name.clone(), value.clone());
            }
            env.insert("REQUEST_METHOD", head.method.as_str());
            env.insert("PATH_INFO", head.path.clone());
            env.insert("QUERY_STRING", head.query_string.clone());
            env.insert("SERVER_PROTOCOL", head.protocol());
        }

        env.insert("SERVER_NAME", self.server_name.clone());
        env.insert("SERVER_PORT", self.server_port.to_string());
        env.insert("REMOTE_ADDR", self.remote_addr.clone());
        env.insert("REMOTE_PORT", self.remote_port.to_string());
        env.input = self.request.take_body();

        env
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[derive(Debug)]
pub enum RequestState {
    ReadingHeaders,
    ReadingBody,
    /// The whole request is buffered; the application runs on the next write event.
    Complete,
    /// The head could not be parsed; a 400 goes out on the next write event.
    Rejected,
    Responding(ResponseWriter),
    Disconnected,
}

/// Drives one accepted connection from its first byte to its disconnect.
///
/// ```text
///   ReadingHeaders ──blank line──► ReadingBody ──body complete──► Complete
///        │                             │                             │ write event
///        └──parse error──► Rejected ───┼─────────────────────────────┤
///                                      │                             ▼
///                     peer EOF ────────┴──────► Disconnected ◄── Responding
/// ```
pub struct RequestHandler {
    context: ConnectionContext,
    app: Rc<dyn Application>,
    state: RequestState,
    inbound: BytesMut,
    write_armed: bool,
}

impl RequestHandler {
    pub fn new(context: ConnectionContext, app: Rc<dyn Application>) -> Self {
        Self {
            context,
            app,
            state: RequestState::ReadingHeaders,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            write_armed: false,
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.state, RequestState::ReadingHeaders | RequestState::ReadingBody)
    }

    /// Whether a response is ready or underway.
    pub fn awaits_write(&self) -> bool {
        matches!(
            self.state,
            RequestState::Complete | RequestState::Rejected | RequestState::Responding(_)
        )
    }

    /// Feeds bytes received from the peer through the state machine.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);

        while self.is_reading() {
            let chunk = match self.context.request.next_read() {
                ReadLimit::Line => match self.inbound.iter().position(|&b| b == b'\n') {
                    Some(pos) => self.inbound.split_to(pos + 1),
                    None => return,
                },
                ReadLimit::Bytes(_) if self.inbound.is_empty() => return,
                ReadLimit::Bytes(remaining) => {
                    let take = remaining.min(self.inbound.len());
                    self.inbound.split_to(take)
                }
                ReadLimit::Done => {
                    // Nothing ever completes this request; drop what arrives.
                    self.inbound.clear();
                    return;
                }
            };

            match self.context.request.push(&chunk) {
                Ok(true) => {
                    if let Some(head) = self.context.request.head() {
                        tracing::debug!(
                            method = head.method.as_str(),
                            path = %head.path,
                            content_length = ?head.content_length,
                            "Request head parsed"
                        );
                    }
                    self.state = RequestState::ReadingBody;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(peer = %self.context.remote_addr, error = %e, "Rejecting request");
                    self.inbound.clear();
                    self.state = RequestState::Rejected;
                    return;
                }
            }

            if self.context.request.is_complete() {
                self.state = RequestState::Complete;
            }
        }
    }

    /// Turns a complete or rejected request into a pending response.
    ///
    /// The application runs here, at most once per connection. Returns
    /// whether a response is pending.
    pub fn respond(&mut self) -> bool {
        let response = match self.state {
            RequestState::Complete => self.run_app(),
            RequestState::Rejected => Response::bad_request(),
            RequestState::Responding(_) => return true,
            _ => return false,
        };

        self.state = RequestState::Responding(ResponseWriter::new(&response));
        true
    }

    fn run_app(&mut self) -> Response {
        let env = self.context.environment();
        let app = Rc::clone(&self.app);

        match panic::catch_unwind(AssertUnwindSafe(|| app.call(&env))) {
            Ok(Ok(response)) => {
                tracing::info!(
                    method = env.method(),
                    path = env.path(),
                    peer = %self.context.remote_addr,
                    status = %response.status,
                    "Request handled"
                );
                response
            }
            Ok(Err(e)) => {
                tracing::error!(method = env.method(), path = env.path(), error = %e, "Application failed");
                Response::internal_error()
            }
            Err(_) => {
                tracing::error!(method = env.method(), path = env.path(), "Application panicked");
                Response::internal_error()
            }
        }
    }

    fn on_read(&mut self, reactor: &mut Reactor, handle: Handle) -> bool {
        let mut scratch = [0u8; READ_CHUNK];

        while self.is_reading() {
            let Some(stream) = reactor.stream_mut(handle) else {
                return false;
            };

            match stream.read(&mut scratch) {
                Ok(0) => {
                    tracing::info!(%handle, peer = %self.context.remote_addr, "Client closed connection");
                    self.disconnect(reactor, handle);
                    return false;
                }
                Ok(n) => {
                    tracing::trace!(%handle, bytes = n, "Read from client");
                    self.receive(&scratch[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(%handle, error = %e, "Read failed");
                    self.disconnect(reactor, handle);
                    return false;
                }
            }
        }

        if self.awaits_write() && !self.write_armed {
            if let Err(e) = reactor.watch_writes(handle) {
                tracing::warn!(%handle, error = %e, "Could not watch for write readiness");
                self.disconnect(reactor, handle);
                return false;
            }
            self.write_armed = true;
        }

        true
    }

    fn on_write(&mut self, reactor: &mut Reactor, handle: Handle) -> bool {
        if !self.respond() {
            return true;
        }

        let RequestState::Responding(writer) = &mut self.state else {
            return true;
        };
        let Some(stream) = reactor.stream_mut(handle) else {
            return false;
        };

        match writer.write_to(stream) {
            Ok(true) => {
                tracing::debug!(%handle, bytes = writer.written(), "Response written");
                self.disconnect(reactor, handle);
                false
            }
            Ok(false) => true,
            Err(e) => {
                tracing::warn!(%handle, written = writer.written(), error = %e, "Write failed");
                self.disconnect(reactor, handle);
                false
            }
        }
    }

    fn disconnect(&mut self, reactor: &mut Reactor, handle: Handle) {
        self.state = RequestState::Disconnected;
        reactor.notify(handle, Event::Disconnect);
    }
}

impl EventHandler for RequestHandler {
    fn on_event(&mut self, reactor: &mut Reactor, event: Event, handle: Handle) -> bool {
        match event {
            Event::Read => self.on_read(reactor, handle),
            Event::Write => self.on_write(reactor, handle),
            Event::Disconnect => {
                self.disconnect(reactor, handle);
                false
            }
        }
    }
}
