//! Error types for updiflash.

use std::io;
use thiserror::Error;

/// Result type for updiflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for updiflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, raw descriptor access).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error (open, reconfigure).
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Link fault on the half-duplex wire (short write, missing echo).
    #[error("Link failure: {0}")]
    Link(String),

    /// UPDI protocol violation (missing ACK, wrong response length, bad SIB).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A KEY was sent but the matching ASI_KEY_STATUS bit never came up.
    #[error("Key not accepted: {0}")]
    KeyRejected(String),

    /// A poll loop exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// NVMCTRL.STATUS reported WRITE_ERROR.
    #[error("NVM controller write error")]
    NvmWriteError,

    /// Operation requires programming mode.
    #[error("Not in programming mode, enter progmode first")]
    NotInProgMode,

    /// Unsupported operation (PDI v2 NVM access, unknown record type).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Device name not present in the family tables.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Malformed Intel-HEX input.
    #[error("HEX parse error: {0}")]
    HexParse(String),
}
