//! HTTP protocol implementation.
//!
//! One request per connection: the connection closes after its response.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`connection`**: The per-connection request state machine, driven by reactor events
//! - **`parser`**: Parses a buffered request head into method, path, and normalized headers
//! - **`request`**: Method classes and the incremental request accumulator
//! - **`response`**: Status, header values, and the response builder
//! - **`writer`**: Serializes responses and writes them out across partial writes
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌──────────────────┐
//!        │  ReadingHeaders  │ ← Buffer lines until the blank line
//!        └──────┬───────────┘
//!               │ Head parsed
//!               ▼
//!        ┌──────────────────┐
//!        │   ReadingBody    │ ← Buffer up to Content-Length bytes
//!        └──────┬───────────┘
//!               │ Request complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Complete      │ ← Wait for write readiness
//!        └──────┬───────────┘
//!               │ Application called
//!               ▼
//!        ┌──────────────────┐
//!        │   Responding     │ ← Write until the buffer is drained
//!        └──────┬───────────┘
//!               │ Response sent (or peer gone)
//!               ▼
//!          Disconnected
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
