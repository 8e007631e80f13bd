//! Echo-cancelling byte link over the single-wire UPDI UART.
//!
//! The UPDI data line is shared between host TX and RX, so every byte the
//! host transmits comes straight back as an echo. [`UpdiLink::send`] drains
//! that echo before the caller may read actual response bytes; nothing above
//! this layer ever sees its own transmission.

use std::io::ErrorKind;

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::constants::BREAK;

/// Baud rate used for the double-break recovery. At 300 baud a zero byte
/// holds the line low for roughly 30 ms, long enough for the target PHY to
/// register a BREAK and resynchronise.
const BREAK_BAUD_RATE: u32 = 300;

/// Byte-level link over a [`Port`].
pub struct UpdiLink<P: Port> {
    port: P,
    baud_rate: u32,
}

impl<P: Port> UpdiLink<P> {
    /// Wrap an open port and send a single BREAK as the initial handshake.
    pub fn new(port: P) -> Result<Self> {
        let baud_rate = port.baud_rate();
        let mut link = Self { port, baud_rate };
        link.send(&[BREAK])?;
        Ok(link)
    }

    /// Write all bytes, then read back and discard the same number of echo
    /// bytes. A short write or a short echo is a link fault.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        log::trace!("link send {bytes:02x?}");
        self.port
            .write_all(bytes)
            .map_err(|e| Error::Link(format!("write failed: {e}")))?;
        self.port
            .flush()
            .map_err(|e| Error::Link(format!("flush failed: {e}")))?;

        let echo = self.receive(bytes.len())?;
        if echo.len() != bytes.len() {
            return Err(Error::Link(format!(
                "echo short: sent {} bytes, got {} back",
                bytes.len(),
                echo.len()
            )));
        }
        Ok(())
    }

    /// Read until `expected` bytes have arrived or the port goes quiet.
    ///
    /// A read timeout ends the loop and yields whatever arrived; callers
    /// treat a size mismatch as a protocol error. Any other I/O error is a
    /// link fault.
    pub fn receive(&mut self, expected: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; expected];
        let mut count = 0;

        while count < expected {
            match self.port.read(&mut data[count..]) {
                Ok(0) => break,
                Ok(n) => count += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(Error::Link(format!("read failed: {e}"))),
            }
        }

        data.truncate(count);
        log::trace!("link recv {data:02x?}");
        Ok(data)
    }

    /// Force the target PHY into a known idle state.
    ///
    /// Reopens the port at 300 baud, sends two BREAK bytes (each ~30 ms of
    /// line-low), then reopens at the configured rate.
    pub fn double_break(&mut self) -> Result<()> {
        log::debug!("sending double break at {BREAK_BAUD_RATE} baud");
        self.port.reopen(BREAK_BAUD_RATE)?;
        self.send(&[BREAK, BREAK])?;

        self.port.reopen(self.baud_rate)?;
        self.port.clear_buffers()?;
        Ok(())
    }

    /// Access to the underlying port, used by tests to inspect traffic.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
