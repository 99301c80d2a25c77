//! Pluggable connection layer for the control plane.
//!
//! A [`Transport`] knows how to bind a listener at an address, dial an
//! address with a bounded timeout, and remove whatever the listener left on
//! the filesystem. Addresses are plain strings: a socket path for
//! [`UnixTransport`] and `host:port` for [`TcpTransport`].

mod connection;

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use bladerunner_config::SocketEndpoint;
use thiserror::Error;

pub use self::connection::{Connection, TransportListener};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

/// Errors raised while binding a transport listener.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve address {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to restrict permissions on {address}: {source}")]
    Permissions {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("{transport} transport is unsupported on this platform")]
    Unsupported { transport: &'static str },
}

/// Connection establishment, listening, and cleanup.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Binds a listener at `address`.
    fn listen(&self, address: &str) -> Result<TransportListener, TransportError>;

    /// Connects to `address`, failing once `timeout` elapses.
    fn dial(&self, address: &str, timeout: Duration) -> io::Result<Connection>;

    /// Removes filesystem artefacts left at `address`; a no-op when nothing
    /// is there.
    fn cleanup(&self, address: &str) -> io::Result<()>;
}

#[cfg(unix)]
const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Unix domain socket transport. The socket file is owner-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTransport;

#[cfg(unix)]
impl Transport for UnixTransport {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn listen(&self, address: &str) -> Result<TransportListener, TransportError> {
        let listener = UnixListener::bind(address).map_err(|source| TransportError::Bind {
            address: address.to_owned(),
            source,
        })?;
        if let Err(source) = fs::set_permissions(address, fs::Permissions::from_mode(0o600)) {
            drop(listener);
            if let Err(error) = self.cleanup(address) {
                tracing::warn!(
                    target: TRANSPORT_TARGET,
                    event = "cleanup_failed",
                    address,
                    error = %error,
                    "failed to remove socket after permission error"
                );
            }
            return Err(TransportError::Permissions {
                address: address.to_owned(),
                source,
            });
        }
        Ok(TransportListener::Unix(listener))
    }

    fn dial(&self, address: &str, timeout: Duration) -> io::Result<Connection> {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        let target = SockAddr::unix(address)?;
        socket.connect_timeout(&target, timeout)?;
        let stream: UnixStream = socket.into();
        Ok(Connection::Unix(stream))
    }

    fn cleanup(&self, address: &str) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(address) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };
        if !metadata.file_type().is_socket() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{address} is not a unix socket"),
            ));
        }
        match fs::remove_file(address) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}

#[cfg(not(unix))]
impl Transport for UnixTransport {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn listen(&self, _address: &str) -> Result<TransportListener, TransportError> {
        Err(TransportError::Unsupported { transport: "unix" })
    }

    fn dial(&self, _address: &str, _timeout: Duration) -> io::Result<Connection> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets unsupported on this platform",
        ))
    }

    fn cleanup(&self, _address: &str) -> io::Result<()> {
        Ok(())
    }
}

/// TCP transport. Leaves nothing on the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn listen(&self, address: &str) -> Result<TransportListener, TransportError> {
        let resolved = resolve_tcp(address).map_err(|source| TransportError::Resolve {
            address: address.to_owned(),
            source,
        })?;
        TcpListener::bind(resolved)
            .map(TransportListener::Tcp)
            .map_err(|source| TransportError::Bind {
                address: address.to_owned(),
                source,
            })
    }

    fn dial(&self, address: &str, timeout: Duration) -> io::Result<Connection> {
        let resolved = resolve_tcp(address)?;
        TcpStream::connect_timeout(&resolved, timeout).map(Connection::Tcp)
    }

    fn cleanup(&self, _address: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Selects the transport matching a configured endpoint.
pub fn transport_for(endpoint: &SocketEndpoint) -> Arc<dyn Transport> {
    match endpoint {
        SocketEndpoint::Unix { .. } => Arc::new(UnixTransport),
        SocketEndpoint::Tcp { .. } => Arc::new(TcpTransport),
    }
}

/// Determines whether a dial error means nothing is listening.
///
/// Covers a missing socket file, a refused connection, and an address that
/// cannot be assigned. Timeouts and permission failures are not treated as
/// "nothing listening".
pub fn is_unavailable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}

fn resolve_tcp(address: &str) -> io::Result<SocketAddr> {
    let mut addrs = address.to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::{Read, Write};
    use std::thread;

    #[cfg(unix)]
    #[test]
    fn unix_listener_is_owner_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("control.sock");
        let address = path.to_str().expect("utf8 path");
        let _listener = UnixTransport.listen(address).expect("bind unix listener");
        let mode = fs::metadata(&path).expect("socket metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn unix_cleanup_removes_socket_and_tolerates_absence() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("control.sock");
        let address = path.to_str().expect("utf8 path");
        drop(UnixTransport.listen(address).expect("bind unix listener"));
        assert!(path.exists(), "socket file outlives the listener");
        UnixTransport.cleanup(address).expect("cleanup");
        assert!(!path.exists());
        UnixTransport.cleanup(address).expect("cleanup is idempotent");
    }

    #[cfg(unix)]
    #[test]
    fn unix_cleanup_refuses_regular_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("control.sock");
        fs::write(&path, b"not a socket").expect("write file");
        let error = UnixTransport
            .cleanup(path.to_str().expect("utf8 path"))
            .expect_err("regular file must be kept");
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn unix_dial_reports_missing_socket_as_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.sock");
        let error = UnixTransport
            .dial(path.to_str().expect("utf8 path"), Duration::from_millis(100))
            .expect_err("dial must fail");
        assert!(is_unavailable(&error), "unexpected error kind: {error}");
    }

    #[test]
    fn tcp_transport_round_trips_bytes() {
        let listener = TcpTransport.listen("127.0.0.1:0").expect("bind tcp");
        let addr = listener.local_addr().expect("tcp address");
        let server = thread::spawn(move || {
            let mut connection = loop {
                if let Some(connection) = listener.accept().expect("accept") {
                    break connection;
                }
            };
            let mut buf = [0_u8; 4];
            connection.read_exact(&mut buf).expect("read");
            connection.write_all(&buf).expect("echo");
        });

        let mut client = TcpTransport
            .dial(&addr.to_string(), Duration::from_secs(1))
            .expect("dial tcp");
        client.write_all(b"ping").expect("write");
        let mut reply = [0_u8; 4];
        client.read_exact(&mut reply).expect("read reply");
        assert_eq!(&reply, b"ping");
        server.join().expect("join server");
    }

    #[test]
    fn tcp_cleanup_is_a_no_op() {
        TcpTransport.cleanup("127.0.0.1:1").expect("no-op cleanup");
    }

    #[rstest]
    #[case::refused(io::ErrorKind::ConnectionRefused, true)]
    #[case::not_found(io::ErrorKind::NotFound, true)]
    #[case::addr_not_available(io::ErrorKind::AddrNotAvailable, true)]
    #[case::timed_out(io::ErrorKind::TimedOut, false)]
    #[case::permission_denied(io::ErrorKind::PermissionDenied, false)]
    #[case::connection_reset(io::ErrorKind::ConnectionReset, false)]
    fn classifies_unavailability(#[case] kind: io::ErrorKind, #[case] expected: bool) {
        assert_eq!(is_unavailable(&io::Error::new(kind, "test error")), expected);
    }
}
