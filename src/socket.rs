//! Byte stream adapter under the record layer.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// A blocking byte stream with a per-call timeout.
///
/// A read returning `Ok(0)` means the peer closed the stream. A call that
/// waited out `timeout` reports `io::ErrorKind::TimedOut`. A call that could
/// not make progress without waiting reports `io::ErrorKind::WouldBlock`.
/// Both leave the connection resumable.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write some prefix of `buf`, waiting at most `timeout`.
    fn send(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize>;
}

fn as_socket_timeout(timeout: Duration) -> Option<Duration> {
    // A zero timeout is rejected by the socket API; treat it as "block".
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

/// Kernel timer granularity tolerated when deciding a wait ran out.
const TIMER_SLACK: Duration = Duration::from_millis(1);

/// Unix reports an expired socket timeout as `WouldBlock`. Only a call that
/// actually waited for the timeout becomes `TimedOut`; a non-blocking socket
/// keeps its `WouldBlock`.
fn classify<T>(
    result: io::Result<T>,
    started: Instant,
    timeout: Option<Duration>,
) -> io::Result<T> {
    match (result, timeout) {
        (Err(e), Some(timeout))
            if e.kind() == io::ErrorKind::WouldBlock
                && started.elapsed() + TIMER_SLACK >= timeout =>
        {
            Err(io::Error::new(io::ErrorKind::TimedOut, e))
        }
        (result, _) => result,
    }
}

impl Transport for TcpStream {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let timeout = as_socket_timeout(timeout);
        self.set_read_timeout(timeout)?;
        let started = Instant::now();
        classify(self.read(buf), started, timeout)
    }

    fn send(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        let timeout = as_socket_timeout(timeout);
        self.set_write_timeout(timeout)?;
        let started = Instant::now();
        classify(self.write(buf), started, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).recv(buf, timeout)
    }

    fn send(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        (**self).send(buf, timeout)
    }
}

/// Where records are read from and written to.
pub(crate) enum Transports {
    None,
    Duplex(Box<dyn Transport>),
    Split {
        reader: Box<dyn Transport>,
        writer: Box<dyn Transport>,
    },
}

impl Transports {
    pub fn reader(&mut self) -> Option<&mut dyn Transport> {
        match self {
            Transports::None => None,
            Transports::Duplex(t) => Some(t.as_mut()),
            Transports::Split { reader, .. } => Some(reader.as_mut()),
        }
    }

    pub fn writer(&mut self) -> Option<&mut dyn Transport> {
        match self {
            Transports::None => None,
            Transports::Duplex(t) => Some(t.as_mut()),
            Transports::Split { writer, .. } => Some(writer.as_mut()),
        }
    }
}
