//! Byte-stream transport over the serial link.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::debug;

use crate::errors::Result;

/// Default baud rate for ADC-8 family boards.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout outside the streaming phase.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Contract the driver needs from a byte-stream connection.
///
/// Reads are bounded by the current timeout and may return fewer bytes
/// than asked for; a timeout with nothing received yields an empty
/// result, not an error. The connection closes when the transport is
/// dropped.
pub trait Transport: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `n` bytes, waiting at most the current timeout for more.
    fn read_up_to(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Read until `delim` arrives (kept in the result), `max` bytes
    /// accumulate, or the timeout elapses.
    fn read_until(&mut self, delim: u8, max: usize) -> Result<Vec<u8>>;

    /// Return whatever has already arrived, without waiting.
    fn read_available(&mut self) -> Result<Vec<u8>>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    fn timeout(&self) -> Duration;
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// `serialport`-backed transport.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        debug!("opened {path} at {baud_rate} baud");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_up_to(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(ref e) if is_timeout(e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn read_until(&mut self, delim: u8, max: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while out.len() < max {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    out.push(byte[0]);
                    if byte[0] == delim {
                        break;
                    }
                }
                Err(ref e) if is_timeout(e) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        self.read_up_to(waiting)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.port.timeout()
    }
}
