//! Tests for the port forwarder.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

use mockall::{Sequence, mock, predicate::eq};
use rstest::{fixture, rstest};

use super::*;
use crate::observer::NoopForwarderObserver;

const GUEST_PORT: u32 = 10022;
const WAIT: Duration = Duration::from_secs(5);

mock! {
    Dialer {}

    impl GuestDialer for Dialer {
        fn dial(&self, port: u32) -> io::Result<Box<dyn DuplexStream>>;
    }
}

#[derive(Debug, Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    fn record(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl ForwarderObserver for RecordingObserver {
    fn started(&self, name: &str, _listen: SocketAddr, guest_port: u32) {
        self.record(format!("started {name} {guest_port}"));
    }

    fn stopped(&self, name: &str, _listen: SocketAddr) {
        self.record(format!("stopped {name}"));
    }

    fn accept_failed(&self, name: &str, error: &io::Error) {
        self.record(format!("accept_failed {name} {error}"));
    }

    fn dial_succeeded(&self, name: &str, _guest_port: u32, attempts: u32) {
        self.record(format!("dial_succeeded {name} {attempts}"));
    }

    fn dial_exhausted(&self, name: &str, _guest_port: u32, attempts: u32, _error: &io::Error) {
        self.record(format!("dial_exhausted {name} {attempts}"));
    }

    fn relay_failed(&self, name: &str, error: &io::Error) {
        self.record(format!("relay_failed {name} {error}"));
    }

    fn close_failed(&self, name: &str, error: &ForwarderError) {
        self.record(format!("close_failed {name} {error}"));
    }
}

fn refused() -> io::Error {
    io::Error::from(ErrorKind::ConnectionRefused)
}

#[fixture]
fn config() -> ForwarderConfig {
    ForwarderConfig::new("ssh", "127.0.0.1:0", GUEST_PORT)
        .with_dial_retry(3, Duration::from_millis(10))
}

fn connect(forwarder: &PortForwarder) -> TcpStream {
    let stream = TcpStream::connect(forwarder.local_addr()).expect("connect to forwarder");
    stream.set_read_timeout(Some(WAIT)).expect("client timeout");
    stream
}

#[cfg(unix)]
mod guest {
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;

    use super::*;

    /// Dialer handing out one end of a socket pair per dial and passing the
    /// guest end to the test.
    fn channel_dialer() -> (Arc<dyn GuestDialer>, mpsc::Receiver<UnixStream>) {
        let (sender, receiver) = mpsc::channel();
        let dialer = move |port: u32| -> io::Result<Box<dyn DuplexStream>> {
            assert_eq!(port, GUEST_PORT);
            let (host, guest) = UnixStream::pair()?;
            sender
                .send(guest)
                .map_err(|_| io::Error::from(ErrorKind::BrokenPipe))?;
            Ok(Box::new(host))
        };
        (Arc::new(dialer), receiver)
    }

    #[rstest]
    fn relays_bytes_unmodified_in_both_directions(config: ForwarderConfig) {
        let (dialer, guests) = channel_dialer();
        let forwarder =
            PortForwarder::start(config, dialer, Arc::new(NoopForwarderObserver)).expect("start");

        let mut client = connect(&forwarder);
        let mut guest = guests.recv_timeout(WAIT).expect("guest dialled");
        guest.set_read_timeout(Some(WAIT)).expect("guest timeout");

        let request: Vec<u8> = (0..=255_u8).cycle().take(16 * 1024).collect();
        client.write_all(&request).expect("client write");
        let mut received = vec![0_u8; request.len()];
        guest.read_exact(&mut received).expect("guest read");
        assert_eq!(received, request);

        guest.write_all(b"SSH-2.0-guest\r\n").expect("guest write");
        let mut banner = [0_u8; 15];
        client.read_exact(&mut banner).expect("client read");
        assert_eq!(&banner, b"SSH-2.0-guest\r\n");

        forwarder.close().expect("close");
    }

    #[rstest]
    fn client_half_close_reaches_the_guest(config: ForwarderConfig) {
        let (dialer, guests) = channel_dialer();
        let forwarder =
            PortForwarder::start(config, dialer, Arc::new(NoopForwarderObserver)).expect("start");

        let mut client = connect(&forwarder);
        let mut guest = guests.recv_timeout(WAIT).expect("guest dialled");
        guest.set_read_timeout(Some(WAIT)).expect("guest timeout");

        client.write_all(b"last words").expect("client write");
        client.shutdown(Shutdown::Write).expect("client half-close");

        let mut received = Vec::new();
        guest.read_to_end(&mut received).expect("guest sees EOF");
        assert_eq!(received, b"last words");

        guest.write_all(b"goodbye").expect("guest write after half-close");
        drop(guest);
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).expect("client sees EOF");
        assert_eq!(reply, b"goodbye");

        forwarder.close().expect("close");
    }

    #[rstest]
    fn close_drains_active_relays(config: ForwarderConfig) {
        let (dialer, guests) = channel_dialer();
        let observer = Arc::new(RecordingObserver::default());
        let forwarder = PortForwarder::start(
            config,
            dialer,
            Arc::clone(&observer) as Arc<dyn ForwarderObserver>,
        )
        .expect("start");

        let mut client = connect(&forwarder);
        let mut guest = guests.recv_timeout(WAIT).expect("guest dialled");
        guest.set_read_timeout(Some(WAIT)).expect("guest timeout");
        client.write_all(b"x").expect("client write");
        let mut byte = [0_u8; 1];
        guest.read_exact(&mut byte).expect("relay established");

        let started = Instant::now();
        forwarder.close().expect("close");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(observer.events().last().map(String::as_str), Some("stopped ssh"));

        let mut rest = Vec::new();
        guest.read_to_end(&mut rest).expect("guest side closed");
        assert!(rest.is_empty());
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).expect("client side closed");
        assert!(rest.is_empty());
    }
}

#[rstest]
fn dial_retries_until_the_guest_answers(config: ForwarderConfig) {
    let mut dialer = MockDialer::new();
    let mut sequence = Sequence::new();
    dialer
        .expect_dial()
        .with(eq(GUEST_PORT))
        .times(2)
        .in_sequence(&mut sequence)
        .returning(|_| Err(refused()));
    let (host, mut guest) = tcp_pair();
    dialer
        .expect_dial()
        .with(eq(GUEST_PORT))
        .times(1)
        .in_sequence(&mut sequence)
        .return_once(move |_| Ok(Box::new(host)));

    let observer = Arc::new(RecordingObserver::default());
    let forwarder = PortForwarder::start(
        config,
        Arc::new(dialer),
        Arc::clone(&observer) as Arc<dyn ForwarderObserver>,
    )
    .expect("start");

    let mut client = connect(&forwarder);
    client.write_all(b"ping").expect("client write");
    let mut received = [0_u8; 4];
    guest.read_exact(&mut received).expect("guest read");
    assert_eq!(&received, b"ping");

    drop(client);
    drop(guest);
    forwarder.close().expect("close");
    assert!(
        observer
            .events()
            .contains(&"dial_succeeded ssh 3".to_owned())
    );
}

#[rstest]
fn exhausted_dials_drop_the_client(config: ForwarderConfig) {
    let mut dialer = MockDialer::new();
    dialer
        .expect_dial()
        .times(3)
        .returning(|_| Err(refused()));
    let observer = Arc::new(RecordingObserver::default());
    let forwarder = PortForwarder::start(
        config,
        Arc::new(dialer),
        Arc::clone(&observer) as Arc<dyn ForwarderObserver>,
    )
    .expect("start");

    let mut client = connect(&forwarder);
    let mut rest = Vec::new();
    match client.read_to_end(&mut rest) {
        Ok(_) => assert!(rest.is_empty()),
        Err(error) => assert!(
            !matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
            "client was left hanging"
        ),
    }

    forwarder.close().expect("close");
    assert!(
        observer
            .events()
            .contains(&"dial_exhausted ssh 3".to_owned())
    );
}

#[rstest]
fn close_interrupts_a_pending_dial() {
    let dials = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dials);
    let dialer = move |_port: u32| -> io::Result<Box<dyn DuplexStream>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    };
    let forwarder = PortForwarder::start(
        ForwarderConfig::new("api", "127.0.0.1:0", 18443),
        Arc::new(dialer),
        Arc::new(NoopForwarderObserver),
    )
    .expect("start");

    let _client = connect(&forwarder);
    let deadline = Instant::now() + WAIT;
    while dials.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "dial never attempted");
        thread::sleep(Duration::from_millis(10));
    }

    let started = Instant::now();
    forwarder.close().expect("close");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(dials.load(Ordering::SeqCst) < DIAL_ATTEMPTS as usize);
}

#[rstest]
fn close_refuses_further_connections(config: ForwarderConfig) {
    let forwarder = PortForwarder::start(
        config,
        Arc::new(MockDialer::new()),
        Arc::new(NoopForwarderObserver),
    )
    .expect("start");
    let addr = forwarder.local_addr();
    forwarder.close().expect("close");
    assert!(TcpStream::connect(addr).is_err(), "forwarder still accepting");
}

#[rstest]
fn binding_a_taken_port_fails(config: ForwarderConfig) {
    let first = PortForwarder::start(
        config.clone(),
        Arc::new(MockDialer::new()),
        Arc::new(NoopForwarderObserver),
    )
    .expect("start");
    let taken = ForwarderConfig {
        listen_addr: first.local_addr().to_string(),
        ..config
    };
    let error = PortForwarder::start(
        taken,
        Arc::new(MockDialer::new()),
        Arc::new(NoopForwarderObserver),
    )
    .expect_err("port already bound");
    assert!(matches!(error, ForwarderError::Bind { .. }), "{error}");
    first.close().expect("close");
}

#[rstest]
fn dropping_after_a_relay_panic_reports_the_failure(config: ForwarderConfig) {
    let (dialled, dials) = std::sync::mpsc::channel();
    let dialer = move |_port: u32| -> io::Result<Box<dyn DuplexStream>> {
        let _ = dialled.send(());
        panic!("dialer bug");
    };
    let observer = Arc::new(RecordingObserver::default());
    let forwarder = PortForwarder::start(
        config,
        Arc::new(dialer),
        Arc::clone(&observer) as Arc<dyn ForwarderObserver>,
    )
    .expect("start");

    let _client = connect(&forwarder);
    dials.recv_timeout(WAIT).expect("dial attempted");
    drop(forwarder);

    assert!(
        observer
            .events()
            .iter()
            .any(|event| event.starts_with("close_failed ssh")),
        "{:?}",
        observer.events()
    );
}

/// Loopback TCP connection standing in for a guest channel.
fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind pair listener");
    let near = TcpStream::connect(listener.local_addr().expect("pair addr")).expect("connect");
    let (far, _) = listener.accept().expect("accept");
    far.set_read_timeout(Some(WAIT)).expect("pair timeout");
    (near, far)
}
