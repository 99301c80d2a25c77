//! One request, one reply per accepted control connection.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::message::Message;
use crate::observer::ControlObserver;
use crate::request::Request;
use crate::router::Router;
use crate::transport::Connection;
use crate::wire::{WireError, WireFormat};

/// Everything a connection thread needs, shared across connections.
pub(super) struct ConnectionContext {
    pub(super) router: Arc<Router>,
    pub(super) wire: Arc<dyn WireFormat>,
    pub(super) observer: Arc<dyn ControlObserver>,
    pub(super) deadline: Duration,
}

impl ConnectionContext {
    /// Serves a single round trip and closes the connection.
    ///
    /// The whole exchange shares one absolute deadline; a client that stalls
    /// while sending or reading cannot hold the thread past it.
    pub(super) fn serve(&self, mut connection: Connection) {
        let deadline = Instant::now() + self.deadline;
        if let Err(error) = self.exchange(&mut connection, deadline) {
            self.observer.connection_failed(&error);
        }
        let _ = connection.shutdown(Shutdown::Both);
    }

    fn exchange(&self, connection: &mut Connection, deadline: Instant) -> Result<(), WireError> {
        let mut stream = DeadlineStream {
            connection,
            deadline,
        };
        let reply = match self.wire.decode(&mut stream) {
            Ok(message) => self.respond(message),
            Err(error) if error.is_malformed() => {
                self.observer.connection_failed(&error);
                Message::error(format!("malformed request: {error}"))
            }
            Err(error) => return Err(error),
        };
        self.wire.encode(&mut stream, &reply)
    }

    fn respond(&self, message: Message) -> Message {
        let version = message.version;
        let command = message.command.unwrap_or_default();
        let reply = self.router.dispatch(&Request::parse(&command));
        let reply = if reply.error.is_none() && reply.response.is_none() {
            Message::response(String::new())
        } else {
            reply
        };
        reply.with_version(version)
    }
}

/// A connection whose every read and write is bounded by what is left of
/// one deadline, so trickled bytes cannot extend it.
struct DeadlineStream<'a> {
    connection: &'a mut Connection,
    deadline: Instant,
}

impl DeadlineStream<'_> {
    fn arm(&self) -> io::Result<()> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "control connection deadline exceeded",
            ));
        }
        self.connection.set_timeout(remaining)
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.arm()?;
        self.connection.read(buf)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.arm()?;
        self.connection.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.connection.flush()
    }
}
