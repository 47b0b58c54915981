//! Readiness multiplexing over the watched sockets.
//!
//! The demuxer owns every socket the reactor knows about, keyed by [`Handle`],
//! and tracks which of them are watched for read and for write readiness.
//! Readiness comes from `mio`, which is edge-triggered: callers must drain a
//! socket until `WouldBlock` before waiting on it again.

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Duration;

use super::Handle;

/// When accepted connections are watched for write readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteInterest {
    /// Only once a response is pending (see [`Demuxer::watch_writes`]).
    #[default]
    OnDemand,
    /// From the moment the connection is added. Idle connections receive
    /// write readiness their handlers have nothing to do with.
    Always,
}

/// A socket owned by the demuxer.
#[derive(Debug)]
pub enum Socket {
    Listener(TcpListener),
    Stream(TcpStream),
}

impl Source for Socket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.register(registry, token, interests),
            Socket::Stream(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.reregister(registry, token, interests),
            Socket::Stream(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Socket::Listener(l) => l.deregister(registry),
            Socket::Stream(s) => s.deregister(registry),
        }
    }
}

/// Handles that became ready during one poll, reads listed separately from writes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub readable: Vec<Handle>,
    pub writable: Vec<Handle>,
}

pub struct Demuxer {
    poll: Poll,
    events: Events,
    sockets: HashMap<Handle, Socket>,
    readers: HashSet<Handle>,
    writers: HashSet<Handle>,
    next_handle: usize,
    policy: WriteInterest,
}

impl Demuxer {
    pub fn new(max_events: usize, policy: WriteInterest) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(max_events.max(1)),
            sockets: HashMap::new(),
            readers: HashSet::new(),
            writers: HashSet::new(),
            next_handle: 0,
            policy,
        })
    }

    /// Takes ownership of `socket` and assigns it a fresh handle. The socket
    /// is not watched until [`Demuxer::add`] is called.
    pub fn insert(&mut self, socket: Socket) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.sockets.insert(handle, socket);
        handle
    }

    /// Starts watching `handle`. Idempotent.
    pub fn add(&mut self, handle: Handle) -> io::Result<()> {
        if self.readers.contains(&handle) {
            return Ok(());
        }

        let socket = self.sockets.get_mut(&handle).ok_or_else(|| unknown(handle))?;
        let interest = match (self.policy, &*socket) {
            (WriteInterest::Always, Socket::Stream(_)) => Interest::READABLE | Interest::WRITABLE,
            _ => Interest::READABLE,
        };

        self.poll.registry().register(socket, handle.into(), interest)?;
        self.readers.insert(handle);
        if interest.is_writable() {
            self.writers.insert(handle);
        }

        Ok(())
    }

    /// Adds write interest to an already watched handle.
    ///
    /// Always re-registers, so a socket that is already writable reports it
    /// again on the next poll.
    pub fn watch_writes(&mut self, handle: Handle) -> io::Result<()> {
        if !self.readers.contains(&handle) {
            return Err(unknown(handle));
        }

        let socket = self.sockets.get_mut(&handle).ok_or_else(|| unknown(handle))?;
        self.poll.registry().reregister(
            socket,
            handle.into(),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.writers.insert(handle);

        Ok(())
    }

    /// Stops watching `handle` and hands its socket back. Idempotent.
    pub fn remove(&mut self, handle: Handle) -> Option<Socket> {
        let watched = self.readers.remove(&handle);
        self.writers.remove(&handle);

        let mut socket = self.sockets.remove(&handle)?;
        if watched {
            if let Err(e) = self.poll.registry().deregister(&mut socket) {
                tracing::debug!(%handle, error = %e, "Deregistering socket from poller failed");
            }
        }

        Some(socket)
    }

    /// Blocks until at least one watched handle is ready or `timeout` passes.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Readiness::default()),
            Err(e) => return Err(e),
        }

        let mut readiness = Readiness::default();
        for event in self.events.iter() {
            let handle = Handle::from(event.token());

            // Errors and hang-ups surface through the next read.
            let readable = event.is_readable() || event.is_read_closed() || event.is_error();
            if readable && self.readers.contains(&handle) {
                readiness.readable.push(handle);
            }

            let writable = event.is_writable() || event.is_write_closed();
            if writable && self.writers.contains(&handle) {
                readiness.writable.push(handle);
            }
        }

        Ok(readiness)
    }

    pub fn socket(&self, handle: Handle) -> Option<&Socket> {
        self.sockets.get(&handle)
    }

    pub fn socket_mut(&mut self, handle: Handle) -> Option<&mut Socket> {
        self.sockets.get_mut(&handle)
    }

    pub fn is_watched(&self, handle: Handle) -> bool {
        self.readers.contains(&handle)
    }

    pub fn is_write_watched(&self, handle: Handle) -> bool {
        self.writers.contains(&handle)
    }
}

fn unknown(handle: Handle) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("unknown handle {handle}"))
}
