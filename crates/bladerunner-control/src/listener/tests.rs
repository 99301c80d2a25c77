//! Tests for the control listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::controller::LocalController;
use crate::message::Message;
use crate::observer::NoopObserver;
use crate::request::Request;
use crate::transport::TcpTransport;

fn quiet_options() -> ListenerOptions {
    ListenerOptions {
        observer: Arc::new(NoopObserver),
        ..ListenerOptions::default()
    }
}

fn exchange(addr: std::net::SocketAddr, line: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(line.as_bytes()).expect("write");
    let mut reply = String::new();
    BufReader::new(&stream).read_line(&mut reply).expect("read");
    reply
}

#[fixture]
fn tcp_listener() -> ControlListener {
    let mut listener =
        ControlListener::bind(Arc::new(TcpTransport), "127.0.0.1:0", quiet_options())
            .expect("bind tcp listener");
    listener.register_controller(Arc::new(LocalController::detached()));
    listener
}

#[rstest]
fn serves_one_reply_per_connection(mut tcp_listener: ControlListener) {
    tcp_listener.handle("echo", |request: &Request| {
        Message::response(request.arg("0").unwrap_or_default().to_owned())
    });
    let addr = tcp_listener.local_addr().expect("tcp address");
    let handle = tcp_listener.start().expect("start");

    assert_eq!(exchange(addr, "v1 ping\n"), "v1 pong\n");
    assert_eq!(exchange(addr, "echo hello\n"), "hello\n");
    assert_eq!(
        exchange(addr, "v1 reboot\n"),
        "v1 error: unknown command: reboot\n"
    );

    handle.close().expect("close");
}

#[rstest]
fn close_releases_the_socket(tcp_listener: ControlListener) {
    let addr = tcp_listener.local_addr().expect("tcp address");
    let handle = tcp_listener.start().expect("start");
    handle.close().expect("close");
    assert!(TcpStream::connect(addr).is_err(), "socket still accepting");
}

#[cfg(unix)]
mod unix {
    use super::*;
    use crate::transport::UnixTransport;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::net::{UnixListener, UnixStream};

    #[fixture]
    fn socket_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    fn address(dir: &tempfile::TempDir) -> String {
        dir.path()
            .join("control.sock")
            .to_str()
            .expect("utf8 path")
            .to_owned()
    }

    #[rstest]
    fn replaces_stale_socket_and_removes_it_on_close(socket_dir: tempfile::TempDir) {
        let address = address(&socket_dir);
        drop(UnixListener::bind(&address).expect("bind stale listener"));

        let listener = ControlListener::bind(Arc::new(UnixTransport), &address, quiet_options())
            .expect("bind over stale socket");
        let mode = std::fs::metadata(&address)
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        let handle = listener.start().expect("start");
        UnixStream::connect(&address).expect("connect");
        handle.close().expect("close");
        assert!(!std::path::Path::new(&address).exists());
    }

    #[rstest]
    fn refuses_to_replace_live_supervisor(socket_dir: tempfile::TempDir) {
        let address = address(&socket_dir);
        let first = ControlListener::bind(Arc::new(UnixTransport), &address, quiet_options())
            .expect("bind first")
            .start()
            .expect("start first");

        let error = ControlListener::bind(Arc::new(UnixTransport), &address, quiet_options())
            .expect_err("second bind must fail");
        assert!(matches!(error, ListenerError::AlreadyRunning { .. }));

        first.close().expect("close");
    }

    #[rstest]
    fn keeps_unrelated_files(socket_dir: tempfile::TempDir) {
        let address = address(&socket_dir);
        std::fs::write(&address, b"data").expect("write file");
        let error = ControlListener::bind(Arc::new(UnixTransport), &address, quiet_options())
            .expect_err("regular file must not be replaced");
        assert!(matches!(error, ListenerError::StaleCleanup { .. }));
        assert!(std::path::Path::new(&address).exists());
    }
}
