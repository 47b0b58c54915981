use anyhow::Context;
use mio::net::{TcpListener, TcpStream};
use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

use crate::app::Application;
use crate::config::Config;
use crate::http::connection::{ConnectionContext, RequestHandler};
use crate::reactor::{Event, EventHandler, Handle, Reactor, SharedHandler, Socket};

/// Accepts connections on the listening socket and tears them down on disconnect.
pub struct ConnectionHandler {
    app: Rc<dyn Application>,
    this: Weak<RefCell<ConnectionHandler>>,
}

impl ConnectionHandler {
    pub fn new(app: Rc<dyn Application>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                app,
                this: this.clone(),
            })
        })
    }

    fn accept_all(&mut self, reactor: &mut Reactor, handle: Handle) {
        let mut accepted = 0usize;

        loop {
            let Some(listener) = reactor.listener(handle) else {
                tracing::warn!(%handle, "Read event for a handle that is not a listener");
                return;
            };

            match listener.accept() {
                Ok((stream, peer)) => {
                    accepted += 1;
                    if let Err(e) = self.attach(reactor, stream, peer) {
                        tracing::warn!(%peer, error = %e, "Dropping accepted connection");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(%handle, error = %e, "Accept failed");
                    break;
                }
            }
        }

        if accepted == 0 {
            tracing::debug!(%handle, "Listener readable but nothing to accept");
        }
    }

    fn attach(&mut self, reactor: &mut Reactor, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        let local = stream.local_addr()?;
        let context = ConnectionContext::new(local, peer);
        let request: SharedHandler = Rc::new(RefCell::new(RequestHandler::new(context, Rc::clone(&self.app))));

        let handle = reactor.adopt(Socket::Stream(stream));
        info!(%handle, %peer, "Accepted connection");

        let registered = self.register_client(reactor, handle, request);
        if registered.is_err() {
            reactor.deregister(handle);
        }
        registered
    }

    fn register_client(&self, reactor: &mut Reactor, handle: Handle, request: SharedHandler) -> io::Result<()> {
        reactor.register(handle, Event::Read, Rc::clone(&request))?;
        reactor.register(handle, Event::Write, request)?;

        if let Some(this) = self.this.upgrade() {
            reactor.register(handle, Event::Disconnect, this)?;
        }
        Ok(())
    }
}

impl EventHandler for ConnectionHandler {
    fn on_event(&mut self, reactor: &mut Reactor, event: Event, handle: Handle) -> bool {
        match event {
            Event::Read => self.accept_all(reactor, handle),
            Event::Disconnect => {
                if let Some(socket) = reactor.deregister(handle) {
                    if let Socket::Stream(stream) = &socket {
                        if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                            tracing::debug!(%handle, error = %e, "Socket shutdown failed");
                        }
                    }
                    tracing::debug!(%handle, "Connection closed");
                }
            }
            Event::Write => {}
        }

        true
    }
}

/// A bound listener plus the reactor serving it.
pub struct Server {
    reactor: Reactor,
    listener: Handle,
    local_addr: SocketAddr,
    poll_timeout: Duration,
}

impl Server {
    pub fn bind<A>(cfg: &Config, app: A) -> anyhow::Result<Self>
    where
        A: Application + 'static,
    {
        let addr = cfg.socket_addr()?;
        let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
        let local_addr = listener.local_addr()?;

        let mut reactor = Reactor::new(cfg.server.max_events, cfg.server.write_interest)
            .context("creating poller")?;
        let handle = reactor.adopt(Socket::Listener(listener));
        let acceptor: SharedHandler = ConnectionHandler::new(Rc::new(app));
        reactor
            .register(handle, Event::Read, acceptor)
            .context("watching listener")?;

        info!("Listening on {}", local_addr);

        Ok(Self {
            reactor,
            listener: handle,
            local_addr,
            poll_timeout: cfg.poll_timeout(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn listener(&self) -> Handle {
        self.listener
    }

    pub fn reactor(&mut self) -> &mut Reactor {
        &mut self.reactor
    }

    /// Serves until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) -> anyhow::Result<()> {
        self.reactor
            .run(shutdown, self.poll_timeout)
            .context("event loop failed")
    }
}

/// Binds per `cfg` and serves `app` until `shutdown` is set.
pub fn run<A>(cfg: &Config, app: A, shutdown: &AtomicBool) -> anyhow::Result<()>
where
    A: Application + 'static,
{
    Server::bind(cfg, app)?.run(shutdown)
}
