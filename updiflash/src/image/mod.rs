//! Firmware image handling.

pub mod hex;

pub use hex::{HexImage, Page};
