//! Port abstraction for the UPDI serial adapter.
//!
//! The protocol layers are written against the [`Port`] trait so they stay
//! I/O-agnostic: production code talks to a real adapter through
//! [`NativePort`] (the `serialport` crate), tests drive the same code paths
//! through an in-memory mock.
//!
//! UPDI is a single-wire half-duplex UART. The line discipline is fixed:
//! 8 data bits, even parity, two stop bits, no flow control, and a 1 s read
//! timeout so a silent target surfaces as `TimedOut` rather than a hang.

pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rates the adapter accepts. Anything else snaps to the default.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[300, 9_600, 19_200, 38_400, 115_200];

/// Default baud rate when the requested one is unrecognised.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout for a single blocking read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port configuration. Line settings beyond the baud rate are fixed
/// by the UPDI PHY (8E2, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g. "/dev/ttyUSB0").
    pub port_name: String,
    /// Baud rate, snapped to [`SUPPORTED_BAUD_RATES`].
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a configuration, snapping unsupported baud rates to the
    /// default.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        let baud_rate = if SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            baud_rate
        } else {
            log::warn!("unsupported baud rate {baud_rate}, using {DEFAULT_BAUD_RATE}");
            DEFAULT_BAUD_RATE
        };
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: READ_TIMEOUT,
        }
    }
}

/// Unified port trait for the UPDI adapter.
///
/// `read` must return `ErrorKind::TimedOut` when the timeout elapses with no
/// data; the link layer treats that as "target went quiet", not as a fault.
pub trait Port: Read + Write + Send {
    /// Reopen the port at the given baud rate, dropping any buffered bytes.
    ///
    /// The double-break recovery drops to 300 baud and back; reopening
    /// rather than reconfiguring matches how adapters reliably pick up a
    /// new line rate mid-session.
    fn reopen(&mut self, baud_rate: u32) -> Result<()>;

    /// Current baud rate.
    fn baud_rate(&self) -> u32;

    /// Discard anything sitting in the input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Port name/path.
    fn name(&self) -> &str;
}

pub use native::NativePort;
