//! Native serial port implementation using the `serialport` crate.

use {
    crate::{
        error::Result,
        port::{Port, SerialConfig},
    },
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::io::{Read, Write},
};

/// Native serial port configured for the UPDI line discipline (8E2).
///
/// The handle is held in an `Option` so a baud-rate change can release the
/// exclusively-opened device node before reopening it.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
    baud_rate: u32,
}

impl NativePort {
    /// Open the adapter with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = Self::open_raw(config, config.baud_rate)?;
        Ok(Self {
            port: Some(port),
            config: config.clone(),
            baud_rate: config.baud_rate,
        })
    }

    fn open_raw(config: &SerialConfig, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
        let port = serialport::new(&config.port_name, baud_rate)
            .timeout(config.timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .open()?;
        Ok(port)
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for NativePort {
    fn reopen(&mut self, baud_rate: u32) -> Result<()> {
        log::trace!("reopening {} at {baud_rate} baud", self.config.port_name);
        // Release the exclusive handle before opening the node again.
        self.port.take();
        self.port = Some(Self::open_raw(&self.config, baud_rate)?);
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.config.port_name
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.flush())
    }
}
