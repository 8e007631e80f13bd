//! UPDI protocol implementation.

pub mod constants;
pub mod phy;

pub use phy::UpdiPhy;
