//! Byte transport abstraction and the serial port implementation.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Default serial baud rate used by the panels.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Half-duplex byte channel to a panel.
///
/// A transport is owned by exactly one session.
pub trait Transport: Send {
    /// Opens (or re-opens) the underlying channel.
    ///
    /// Fails with [`Error::Connection`] when the device is unavailable.
    fn open(&mut self) -> Result<()>;

    /// Writes all bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reads exactly `n` bytes, failing with [`Error::Timeout`] if they do not
    /// arrive within `timeout`.
    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Discards pending input until the line has been quiet for `quiet_period`.
    fn drain_input(&mut self, quiet_period: Duration) -> Result<()>;
}

/// Serial port transport (8N1, RTS/CTS flow control).
pub struct SerialTransport {
    port_path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Creates a transport for `port_path`. Nothing is opened yet.
    pub fn new(port_path: &str, baud_rate: u32) -> Self {
        Self {
            port_path: port_path.to_string(),
            baud_rate,
            port: None,
        }
    }

    /// Returns the port path.
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Connection(format!("{} is not open", self.port_path)))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        self.port = None;
        let port = tokio_serial::new(&self.port_path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|e| {
                if let tokio_serial::ErrorKind::Io(kind) = &e.kind {
                    if (*kind == ErrorKind::NotFound || *kind == ErrorKind::PermissionDenied)
                        && !std::path::Path::new(&self.port_path).exists()
                    {
                        return Error::Connection(format!("{} not found", self.port_path));
                    }
                }
                Error::Connection(format!("{}: {}", self.port_path, e))
            })?;

        info!(
            "Serial port opened: {} @ {} baud",
            self.port_path, self.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let port = self.port()?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Read timed out with {}/{} bytes", filled, n);
                return Err(Error::Timeout(timeout));
            }
            port.set_timeout(remaining)?;
            match port.read(&mut buf[filled..]) {
                Ok(0) => {}
                Ok(count) => filled += count,
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }

    fn drain_input(&mut self, quiet_period: Duration) -> Result<()> {
        let port = self.port()?;
        port.clear(ClearBuffer::Input)?;
        port.set_timeout(quiet_period)?;

        let discarded = discard_until_quiet(port, quiet_period * MAX_DRAIN_PERIODS)?;
        debug!("Drained {} stale bytes from {}", discarded, self.port_path);
        Ok(())
    }
}

/// A drain gives up after this many quiet periods of continuous input.
const MAX_DRAIN_PERIODS: u32 = 8;

/// Reads and discards until a read comes back empty or times out.
///
/// Fails with [`Error::Timeout`] if input is still arriving after `limit`.
fn discard_until_quiet<R: Read + ?Sized>(reader: &mut R, limit: Duration) -> Result<usize> {
    let deadline = Instant::now() + limit;
    let mut scratch = [0u8; 256];
    let mut discarded = 0usize;
    loop {
        if Instant::now() >= deadline {
            warn!("Input never went quiet, {} bytes discarded", discarded);
            return Err(Error::Timeout(limit));
        }
        match reader.read(&mut scratch) {
            Ok(0) => return Ok(discarded),
            Ok(count) => discarded += count,
            Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(discarded),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_port_is_connection_error() {
        let mut transport = SerialTransport::new("/dev/null-smartscreen", DEFAULT_BAUD_RATE);
        assert!(matches!(transport.write(&[0]), Err(Error::Connection(_))));
    }

    #[test]
    fn test_missing_port_is_connection_error() {
        let mut transport =
            SerialTransport::new("/dev/does-not-exist-smartscreen", DEFAULT_BAUD_RATE);
        assert!(matches!(transport.open(), Err(Error::Connection(_))));
    }

    #[test]
    fn test_discard_stops_when_input_ends() {
        let mut stale: &[u8] = &[0xFF; 300];
        let discarded = discard_until_quiet(&mut stale, Duration::from_secs(1)).unwrap();
        assert_eq!(discarded, 300);
    }

    #[test]
    fn test_discard_gives_up_on_endless_input() {
        let mut chatter = std::io::repeat(0xAA);
        assert!(matches!(
            discard_until_quiet(&mut chatter, Duration::from_millis(20)),
            Err(Error::Timeout(_))
        ));
    }

    // Hardware tests are skipped by default
    #[test]
    #[ignore]
    fn test_device_open() {
        let mut transport = SerialTransport::new("/dev/ttyACM0", DEFAULT_BAUD_RATE);
        assert!(transport.open().is_ok());
    }
}
