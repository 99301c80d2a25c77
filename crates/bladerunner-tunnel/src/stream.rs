//! Byte streams the forwarder can relay between.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connected, clonable, full-duplex byte stream.
///
/// Clones share the underlying socket, so a shutdown or timeout applied
/// through one handle affects every clone.
pub trait DuplexStream: Read + Write + Send + 'static {
    /// Returns a second handle to the same connection.
    fn try_clone_duplex(&self) -> io::Result<Box<dyn DuplexStream>>;

    /// Shuts down the read half, the write half, or both.
    fn shutdown(&self, how: Shutdown) -> io::Result<()>;

    /// Bounds blocking reads; `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Bounds blocking writes; `None` blocks indefinitely.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl DuplexStream for TcpStream {
    fn try_clone_duplex(&self) -> io::Result<Box<dyn DuplexStream>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl DuplexStream for UnixStream {
    fn try_clone_duplex(&self) -> io::Result<Box<dyn DuplexStream>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        UnixStream::shutdown(self, how)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }
}

#[cfg(target_os = "linux")]
impl DuplexStream for socket2::Socket {
    fn try_clone_duplex(&self) -> io::Result<Box<dyn DuplexStream>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        socket2::Socket::shutdown(self, how)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        socket2::Socket::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        socket2::Socket::set_write_timeout(self, timeout)
    }
}
