//! # updiflash
//!
//! A library for programming UPDI-equipped AVR devices (tiny, mega-0 and Dx
//! families) over a plain serial adapter.
//!
//! The stack is layered the way the wire protocol is:
//!
//! - [`port`]: serial adapter abstraction (8E2 line discipline) with a
//!   native `serialport` implementation
//! - [`link`]: echo cancellation and BREAK handling for the single-wire
//!   half-duplex UART
//! - [`protocol`]: the UPDI instruction codec (LDS/STS/LD/ST/LDCS/STCS/
//!   KEY/REPEAT)
//! - [`session`]: key handshakes, reset toggles, NVM controller command
//!   flow
//! - [`programmer`]: the gated front door the CLI drives
//! - [`device`]: per-part memory map tables
//! - [`image`]: Intel-HEX parsing into page-aligned images
//!
//! ## Example
//!
//! ```rust,no_run
//! use updiflash::{
//!     DeviceProfile, HexImage, NvmProgrammer, UpdiLink, UpdiPhy, UpdiSession,
//!     port::{NativePort, SerialConfig},
//! };
//!
//! fn main() -> updiflash::Result<()> {
//!     let profile = DeviceProfile::new("tiny416")?;
//!
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115_200))?;
//!     let phy = UpdiPhy::new(UpdiLink::new(port)?)?;
//!     let session = UpdiSession::new(&profile, phy);
//!     let mut nvm = NvmProgrammer::new(&profile, session);
//!
//!     println!("SIB: {}", nvm.get_device_info()?);
//!
//!     nvm.enter_progmode()?;
//!     nvm.chip_erase()?;
//!
//!     let mut image = HexImage::new(profile.flash_size, profile.page_size);
//!     let start = image.load_file("firmware.hex")?;
//!     nvm.write_flash(start, image.pages(), |_, _| {})?;
//!
//!     nvm.leave_progmode()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod link;
pub mod port;
pub mod programmer;
pub mod protocol;
pub mod session;

pub use {
    device::DeviceProfile,
    error::{Error, Result},
    image::{HexImage, Page},
    link::UpdiLink,
    port::{Port, SerialConfig},
    programmer::NvmProgrammer,
    protocol::UpdiPhy,
    session::UpdiSession,
};
