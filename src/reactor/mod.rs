//! Event dispatch.
//!
//! The [`Reactor`] maps each [`Handle`] to the handlers registered for its
//! events and drives them from the readiness reported by the [`Demuxer`].
//!
//! ```text
//!   Demuxer::poll ──► Readiness { readable, writable }
//!                            │
//!                            ▼
//!   Reactor::notify(handle, Read) ... then notify(handle, Write)
//!                            │
//!                            ▼
//!   EventHandler::on_event(reactor, event, handle)
//!        │  may call register / deregister / notify / watch_writes
//!        └──► returns false to stop receiving events for that handle
//! ```
//!
//! Everything runs on one thread. Handlers are shared between the events of
//! a handle through `Rc<RefCell<_>>`; a handler is never entered twice at once.

pub mod demuxer;

use mio::Token;
use mio::net::{TcpListener, TcpStream};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use demuxer::{Demuxer, Readiness, Socket, WriteInterest};

/// Opaque identifier of a socket owned by the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl From<Token> for Handle {
    fn from(token: Token) -> Self {
        Handle(token.0)
    }
}

impl From<Handle> for Token {
    fn from(handle: Handle) -> Self {
        Token(handle.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Read,
    Write,
    Disconnect,
}

/// Something that reacts to events on a handle.
pub trait EventHandler {
    /// Handles one event. Returning `false` retires this handler from `handle`.
    fn on_event(&mut self, reactor: &mut Reactor, event: Event, handle: Handle) -> bool;
}

pub type SharedHandler = Rc<RefCell<dyn EventHandler>>;

type HandlerTable = HashMap<Handle, HashMap<Event, SharedHandler>>;

pub struct Reactor {
    demuxer: Demuxer,
    handlers: HandlerTable,
}

impl Reactor {
    pub fn new(max_events: usize, policy: WriteInterest) -> io::Result<Self> {
        Ok(Self {
            demuxer: Demuxer::new(max_events, policy)?,
            handlers: HashMap::new(),
        })
    }

    /// Hands a socket to the reactor. It is watched once a handler is registered.
    pub fn adopt(&mut self, socket: Socket) -> Handle {
        self.demuxer.insert(socket)
    }

    /// Binds `handler` to `event` on `handle`, replacing any previous one.
    pub fn register(&mut self, handle: Handle, event: Event, handler: SharedHandler) -> io::Result<()> {
        self.demuxer.add(handle)?;
        self.handlers_for(handle).insert(event, handler);
        Ok(())
    }

    /// Drops every handler of `handle` and stops watching it.
    ///
    /// Returns the socket so the caller decides how to release it.
    pub fn deregister(&mut self, handle: Handle) -> Option<Socket> {
        self.handlers.remove(&handle);
        self.demuxer.remove(handle)
    }

    /// Delivers `event` to the handler registered for it on `handle`, if any.
    pub fn notify(&mut self, handle: Handle, event: Event) {
        // The handle may have been deregistered earlier in this dispatch pass.
        let Some(handler) = self
            .handlers
            .get(&handle)
            .and_then(|events| events.get(&event))
            .map(Rc::clone)
        else {
            return;
        };

        let keep = match handler.try_borrow_mut() {
            Ok(mut h) => h.on_event(self, event, handle),
            Err(_) => {
                tracing::warn!(%handle, ?event, "Handler already running, event dropped");
                return;
            }
        };

        if !keep {
            self.retire(handle, &handler);
        }
    }

    /// Adds write interest for `handle` so its pending response gets a write event.
    pub fn watch_writes(&mut self, handle: Handle) -> io::Result<()> {
        self.demuxer.watch_writes(handle)
    }

    pub fn stream_mut(&mut self, handle: Handle) -> Option<&mut TcpStream> {
        match self.demuxer.socket_mut(handle)? {
            Socket::Stream(stream) => Some(stream),
            Socket::Listener(_) => None,
        }
    }

    pub fn listener(&self, handle: Handle) -> Option<&TcpListener> {
        match self.demuxer.socket(handle)? {
            Socket::Listener(listener) => Some(listener),
            Socket::Stream(_) => None,
        }
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.handlers.contains_key(&handle)
    }

    pub fn is_watched(&self, handle: Handle) -> bool {
        self.demuxer.is_watched(handle)
    }

    pub fn is_write_watched(&self, handle: Handle) -> bool {
        self.demuxer.is_write_watched(handle)
    }

    /// Number of handles with at least one registered handler.
    pub fn registered(&self) -> usize {
        self.handlers.len()
    }

    /// Waits for readiness once and dispatches it: all reads, then all writes.
    ///
    /// Returns how many readiness entries were dispatched.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let readiness = self.demuxer.poll(timeout)?;
        let dispatched = readiness.readable.len() + readiness.writable.len();

        for handle in readiness.readable {
            self.notify(handle, Event::Read);
        }
        for handle in readiness.writable {
            self.notify(handle, Event::Write);
        }

        Ok(dispatched)
    }

    /// Dispatches events until `shutdown` is set. `timeout` bounds how long a
    /// set flag can go unnoticed.
    pub fn run(&mut self, shutdown: &AtomicBool, timeout: Duration) -> io::Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            self.turn(Some(timeout))?;
        }
        Ok(())
    }

    fn handlers_for(&mut self, handle: Handle) -> &mut HashMap<Event, SharedHandler> {
        self.handlers.entry(handle).or_default()
    }

    /// Removes every registration of `handler` on `handle`; a handle left with
    /// no handlers is no longer watched and its socket is released.
    fn retire(&mut self, handle: Handle, handler: &SharedHandler) {
        let Some(events) = self.handlers.get_mut(&handle) else {
            return;
        };

        events.retain(|_, h| !Rc::ptr_eq(h, handler));
        if events.is_empty() {
            self.handlers.remove(&handle);
            self.demuxer.remove(handle);
        }
    }
}
