use reactor_httpd::reactor::{Event, EventHandler, Handle, Reactor, SharedHandler, Socket, WriteInterest};
use std::cell::RefCell;
use std::net::{TcpListener as StdListener, TcpStream as StdStream};
use std::rc::Rc;
use std::time::Duration;

type Log = Rc<RefCell<Vec<(Event, Handle)>>>;

struct Recorder {
    log: Log,
    keep: bool,
}

impl EventHandler for Recorder {
    fn on_event(&mut self, _reactor: &mut Reactor, event: Event, handle: Handle) -> bool {
        self.log.borrow_mut().push((event, handle));
        self.keep
    }
}

fn recorder(log: &Log, keep: bool) -> SharedHandler {
    Rc::new(RefCell::new(Recorder { log: Rc::clone(log), keep }))
}

fn reactor(policy: WriteInterest) -> Reactor {
    Reactor::new(64, policy).unwrap()
}

fn listener_socket() -> Socket {
    let listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    Socket::Listener(listener)
}

/// A connected pair: the client end stays blocking, the server end goes to the reactor.
fn stream_pair() -> (StdStream, Socket) {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    let client = StdStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (client, Socket::Stream(mio::net::TcpStream::from_std(server)))
}

fn turn_until(reactor: &mut Reactor, log: &Log, wanted: usize) {
    for _ in 0..50 {
        if log.borrow().len() >= wanted {
            return;
        }
        reactor.turn(Some(Duration::from_millis(100))).unwrap();
    }
}

#[test]
fn test_notify_reaches_registered_handler() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, recorder(&log, true)).unwrap();
    reactor.notify(handle, Event::Read);

    assert_eq!(*log.borrow(), vec![(Event::Read, handle)]);
    assert!(reactor.is_registered(handle));
    assert!(reactor.is_watched(handle));
}

#[test]
fn test_notify_without_handler_for_event_is_noop() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, recorder(&log, true)).unwrap();
    reactor.notify(handle, Event::Write);
    reactor.notify(handle, Event::Disconnect);

    assert!(log.borrow().is_empty());
}

#[test]
fn test_notify_after_deregister_is_noop() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());
    let handler = recorder(&log, true);

    reactor.register(handle, Event::Read, Rc::clone(&handler)).unwrap();
    reactor.register(handle, Event::Write, Rc::clone(&handler)).unwrap();
    reactor.register(handle, Event::Disconnect, handler).unwrap();

    assert!(reactor.deregister(handle).is_some());
    for event in [Event::Read, Event::Write, Event::Disconnect] {
        reactor.notify(handle, event);
    }

    assert!(log.borrow().is_empty());
    assert!(!reactor.is_registered(handle));
    assert!(!reactor.is_watched(handle));
    assert!(reactor.deregister(handle).is_none());
}

#[test]
fn test_register_replaces_existing_handler() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let first: Log = Rc::default();
    let second: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, recorder(&first, true)).unwrap();
    reactor.register(handle, Event::Read, recorder(&second, true)).unwrap();
    reactor.notify(handle, Event::Read);

    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 1);
}

#[test]
fn test_handler_returning_false_is_retired() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, recorder(&log, false)).unwrap();
    reactor.notify(handle, Event::Read);
    reactor.notify(handle, Event::Read);

    assert_eq!(log.borrow().len(), 1);
    assert!(!reactor.is_registered(handle));
    assert!(!reactor.is_watched(handle));
}

#[test]
fn test_retired_handler_leaves_other_handlers_in_place() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let stopping: Log = Rc::default();
    let staying: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, recorder(&stopping, false)).unwrap();
    reactor.register(handle, Event::Disconnect, recorder(&staying, true)).unwrap();
    reactor.notify(handle, Event::Read);
    reactor.notify(handle, Event::Disconnect);

    assert_eq!(stopping.borrow().len(), 1);
    assert_eq!(staying.borrow().len(), 1);
    assert!(reactor.is_watched(handle));
}

struct Closer;

impl EventHandler for Closer {
    fn on_event(&mut self, reactor: &mut Reactor, _event: Event, handle: Handle) -> bool {
        reactor.deregister(handle);
        false
    }
}

#[test]
fn test_write_after_deregister_in_same_pass_is_dropped() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let handle = reactor.adopt(listener_socket());

    reactor.register(handle, Event::Read, Rc::new(RefCell::new(Closer))).unwrap();
    reactor.register(handle, Event::Write, recorder(&log, true)).unwrap();

    reactor.notify(handle, Event::Read);
    reactor.notify(handle, Event::Write);

    assert!(log.borrow().is_empty());
}

struct Reentrant {
    calls: usize,
}

impl EventHandler for Reentrant {
    fn on_event(&mut self, reactor: &mut Reactor, event: Event, handle: Handle) -> bool {
        self.calls += 1;
        reactor.notify(handle, event);
        true
    }
}

#[test]
fn test_reentrant_notify_is_dropped() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let handle = reactor.adopt(listener_socket());
    let handler = Rc::new(RefCell::new(Reentrant { calls: 0 }));

    reactor.register(handle, Event::Read, handler.clone()).unwrap();
    reactor.notify(handle, Event::Read);

    assert_eq!(handler.borrow().calls, 1);
}

#[test]
fn test_turn_reports_listener_readiness() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let socket = listener_socket();
    let addr = match &socket {
        Socket::Listener(l) => l.local_addr().unwrap(),
        Socket::Stream(_) => unreachable!(),
    };
    let handle = reactor.adopt(socket);
    reactor.register(handle, Event::Read, recorder(&log, true)).unwrap();

    let _client = StdStream::connect(addr).unwrap();
    turn_until(&mut reactor, &log, 1);

    assert_eq!(log.borrow()[0], (Event::Read, handle));
}

#[test]
fn test_on_demand_write_interest() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let log: Log = Rc::default();
    let (_client, socket) = stream_pair();
    let handle = reactor.adopt(socket);
    let handler = recorder(&log, true);

    reactor.register(handle, Event::Read, Rc::clone(&handler)).unwrap();
    reactor.register(handle, Event::Write, handler).unwrap();
    reactor.turn(Some(Duration::from_millis(100))).unwrap();

    assert!(!reactor.is_write_watched(handle));
    assert!(log.borrow().is_empty());

    reactor.watch_writes(handle).unwrap();
    turn_until(&mut reactor, &log, 1);

    assert!(reactor.is_write_watched(handle));
    assert_eq!(*log.borrow(), vec![(Event::Write, handle)]);
}

#[test]
fn test_always_write_interest() {
    let mut reactor = reactor(WriteInterest::Always);
    let log: Log = Rc::default();
    let (_client, socket) = stream_pair();
    let handle = reactor.adopt(socket);

    reactor.register(handle, Event::Write, recorder(&log, true)).unwrap();
    turn_until(&mut reactor, &log, 1);

    assert!(reactor.is_write_watched(handle));
    assert_eq!(log.borrow()[0], (Event::Write, handle));
}

#[test]
fn test_reads_dispatched_before_writes() {
    use std::io::Write;

    let mut reactor = reactor(WriteInterest::Always);
    let log: Log = Rc::default();
    let (mut client, socket) = stream_pair();
    client.write_all(b"ping").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let handle = reactor.adopt(socket);
    let handler = recorder(&log, true);
    reactor.register(handle, Event::Read, Rc::clone(&handler)).unwrap();
    reactor.register(handle, Event::Write, handler).unwrap();
    turn_until(&mut reactor, &log, 2);

    let log = log.borrow();
    let first_read = log.iter().position(|(e, _)| *e == Event::Read).unwrap();
    let first_write = log.iter().position(|(e, _)| *e == Event::Write).unwrap();
    assert!(first_read < first_write);
}

#[test]
fn test_watch_writes_unknown_handle_fails() {
    let mut reactor = reactor(WriteInterest::OnDemand);
    let handle = reactor.adopt(listener_socket());
    reactor.deregister(handle);

    assert!(reactor.watch_writes(handle).is_err());
}
