//! Bidirectional byte relay between a host client and a guest stream.

use std::io::{self, ErrorKind};
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::stream::DuplexStream;

/// Read and write timeout used to poll the cancellation flag.
pub(super) const RELAY_POLL: Duration = Duration::from_millis(100);
const RELAY_BUFFER: usize = 32 * 1024;

enum Flow {
    Drained,
    Cancelled,
}

/// Copies bytes both ways until each side reaches EOF or the relay is
/// cancelled. Returns once both directions have finished.
///
/// `report` receives every I/O failure; a failure in either direction
/// shuts both streams down completely.
pub(super) fn bridge(
    client: Box<dyn DuplexStream>,
    guest: Box<dyn DuplexStream>,
    cancel: &AtomicBool,
    report: &(dyn Fn(&io::Error) + Sync),
) -> io::Result<()> {
    for stream in [&client, &guest] {
        stream.set_read_timeout(Some(RELAY_POLL))?;
        stream.set_write_timeout(Some(RELAY_POLL))?;
    }
    let client_reader = client.try_clone_duplex()?;
    let guest_reader = guest.try_clone_duplex()?;

    thread::scope(|scope| {
        let inbound = thread::Builder::new()
            .name("relay-guest".to_owned())
            .spawn_scoped(scope, || run_direction(guest_reader, client, cancel, report));
        if let Err(error) = inbound {
            report(&error);
            return;
        }
        run_direction(client_reader, guest, cancel, report);
    });
    Ok(())
}

fn run_direction(
    mut source: Box<dyn DuplexStream>,
    mut sink: Box<dyn DuplexStream>,
    cancel: &AtomicBool,
    report: &(dyn Fn(&io::Error) + Sync),
) {
    match pump(source.as_mut(), sink.as_mut(), cancel) {
        Ok(Flow::Drained) => {}
        Ok(Flow::Cancelled) => teardown(source.as_ref(), sink.as_ref()),
        Err(error) => {
            report(&error);
            teardown(source.as_ref(), sink.as_ref());
        }
    }
}

fn pump(
    source: &mut dyn DuplexStream,
    sink: &mut dyn DuplexStream,
    cancel: &AtomicBool,
) -> io::Result<Flow> {
    let mut buffer = vec![0_u8; RELAY_BUFFER];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => {
                // Peer may already be gone; the half-close is best effort.
                let _ = sink.shutdown(Shutdown::Write);
                return Ok(Flow::Drained);
            }
            Ok(read) => read,
            Err(error) if is_poll_timeout(&error) => {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(Flow::Cancelled);
                }
                continue;
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if let Flow::Cancelled = write_through(sink, &buffer[..read], cancel)? {
            return Ok(Flow::Cancelled);
        }
    }
}

fn write_through(
    sink: &mut dyn DuplexStream,
    mut data: &[u8],
    cancel: &AtomicBool,
) -> io::Result<Flow> {
    while !data.is_empty() {
        match sink.write(data) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(written) => data = &data[written..],
            Err(error) if is_poll_timeout(&error) => {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(Flow::Cancelled);
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(Flow::Drained)
}

fn teardown(source: &dyn DuplexStream, sink: &dyn DuplexStream) {
    let _ = source.shutdown(Shutdown::Both);
    let _ = sink.shutdown(Shutdown::Both);
}

fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
