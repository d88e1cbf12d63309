//! Serial port transport
//!
//! A [`Transport`] on top of the `serialport` crate. The port is opened with
//! a zero read timeout so every `read` returns immediately; timeouts and
//! `WouldBlock` are folded into "no data now", which is exactly what the
//! polling engine wants.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::error::Result;
use crate::logging::warn;
use crate::transport::Transport;

/// Non-blocking serial transport over a [`serialport::SerialPort`].
///
/// ## Examples
///
/// ```no_run
/// use at_engine::transport::serial::SerialTransport;
///
/// # fn main() -> at_engine::error::Result<()> {
/// let transport = SerialTransport::open("/dev/ttyUSB0", 115_200)?;
/// # Ok(())
/// # }
/// ```
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    epoch: Instant,
}

impl SerialTransport {
    /// Opens `path` at `baud` with a zero read timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened or configured.
    pub fn open<S: AsRef<str>>(path: S, baud: u32) -> Result<Self> {
        let port = serialport::new(path.as_ref(), baud)
            .timeout(Duration::ZERO)
            .open()?;

        Ok(Self::from_port(port))
    }

    /// Wraps an already configured port.
    ///
    /// The port's read timeout should be zero (or very small); a large
    /// timeout would stall every `poll()` for its full duration.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            epoch: Instant::now(),
        }
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.port.name())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.port.read(buf) {
            Ok(n) => n,
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
            Err(e) => {
                warn!("serial read error: {e}");
                0
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> usize {
        match self.port.write(data) {
            Ok(n) => n,
            Err(ref e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => 0,
            Err(e) => {
                warn!("serial write error: {e}");
                0
            }
        }
    }

    fn now_ms(&mut self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}
