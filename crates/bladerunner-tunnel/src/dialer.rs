//! Opening byte streams to guest services.

use std::io;

use crate::stream::DuplexStream;

/// Connects to a service inside the guest by virtual-socket port.
pub trait GuestDialer: Send + Sync {
    /// Opens a stream to `port` on the guest.
    fn dial(&self, port: u32) -> io::Result<Box<dyn DuplexStream>>;
}

impl<F> GuestDialer for F
where
    F: Fn(u32) -> io::Result<Box<dyn DuplexStream>> + Send + Sync,
{
    fn dial(&self, port: u32) -> io::Result<Box<dyn DuplexStream>> {
        self(port)
    }
}

#[cfg(target_os = "linux")]
pub use self::vsock::VsockDialer;

#[cfg(target_os = "linux")]
mod vsock {
    use std::io;
    use std::time::Duration;

    use socket2::{Domain, SockAddr, Socket, Type};

    use super::GuestDialer;
    use crate::stream::DuplexStream;

    /// Per-attempt connect timeout for guest vsock dials.
    const VSOCK_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Dials `AF_VSOCK` ports on the guest with context id `cid`.
    #[derive(Debug, Clone, Copy)]
    pub struct VsockDialer {
        cid: u32,
        connect_timeout: Duration,
    }

    impl VsockDialer {
        /// Targets the guest with context id `cid`.
        pub fn new(cid: u32) -> Self {
            Self {
                cid,
                connect_timeout: VSOCK_CONNECT_TIMEOUT,
            }
        }

        /// The guest context id.
        pub fn cid(&self) -> u32 {
            self.cid
        }
    }

    impl GuestDialer for VsockDialer {
        fn dial(&self, port: u32) -> io::Result<Box<dyn DuplexStream>> {
            let socket = Socket::new(Domain::VSOCK, Type::STREAM, None)?;
            socket.connect_timeout(&SockAddr::vsock(self.cid, port), self.connect_timeout)?;
            Ok(Box::new(socket))
        }
    }
}
