//! High-level NVM programming front door.
//!
//! [`NvmProgrammer`] wraps a session and enforces one invariant: NVM
//! operations only run while programming mode has been entered through
//! [`enter_progmode`](NvmProgrammer::enter_progmode) or
//! [`unlock_device`](NvmProgrammer::unlock_device). It also maps
//! flash-relative HEX offsets onto the device's logical flash window.

use log::info;

use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::image::Page;
use crate::port::Port;
use crate::session::UpdiSession;

/// Gated programming interface over one UPDI session.
pub struct NvmProgrammer<'a, P: Port> {
    profile: &'a DeviceProfile,
    session: UpdiSession<'a, P>,
    programming: bool,
}

impl<'a, P: Port> NvmProgrammer<'a, P> {
    /// Wrap a session. The device starts out gated.
    pub fn new(profile: &'a DeviceProfile, session: UpdiSession<'a, P>) -> Self {
        Self {
            profile,
            session,
            programming: false,
        }
    }

    /// Read the SIB and set up the session for the detected NVM version.
    pub fn get_device_info(&mut self) -> Result<String> {
        self.session.init_nvm_operation()
    }

    /// Enter programming mode and lift the gate.
    pub fn enter_progmode(&mut self) -> Result<()> {
        info!("entering NVM programming mode");
        self.session.enter_progmode()?;
        self.programming = true;
        Ok(())
    }

    /// Leave programming mode and drop the gate.
    pub fn leave_progmode(&mut self) -> Result<()> {
        self.session.leave_progmode()?;
        self.programming = false;
        Ok(())
    }

    /// Recover a locked device with the chip-erase key. A no-op when the
    /// gate is already lifted.
    pub fn unlock_device(&mut self) -> Result<()> {
        if self.programming {
            info!("device already unlocked");
            return Ok(());
        }

        self.session.unlock()?;
        self.programming = true;
        Ok(())
    }

    /// Erase the chip.
    pub fn chip_erase(&mut self) -> Result<()> {
        self.check_gate()?;
        self.session.chip_erase()
    }

    /// Program pages starting at `address`.
    ///
    /// HEX images are flash-relative, the hardware wants logical addresses:
    /// anything below `flash_base` is mapped up by adding it. `progress`
    /// receives (pages done, pages total) after each page.
    pub fn write_flash<F>(&mut self, address: u32, pages: &[Page], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        self.check_gate()?;

        let mut page_addr = address;
        if page_addr < self.profile.flash_base {
            page_addr += self.profile.flash_base;
        }

        for (done, page) in pages.iter().enumerate() {
            info!("writing page at {page_addr:#08x}");
            self.session.write_nvm_page(page_addr, &page.data)?;
            page_addr += page.size as u32;
            progress(done + 1, pages.len());
        }
        Ok(())
    }

    /// Read `size` bytes starting at `address`, page by page as words.
    /// `size` must be a whole number of pages.
    pub fn read_flash(&mut self, address: u32, size: u32) -> Result<Vec<u8>> {
        self.check_gate()?;

        let page_size = self.profile.page_size;
        if size % page_size != 0 {
            return Err(Error::Protocol(
                "read_flash: size must be page aligned".into(),
            ));
        }

        let mut flash_data = Vec::with_capacity(size as usize);
        let mut page_addr = address;
        for _ in 0..size / page_size {
            let page = self
                .session
                .read_data_words(page_addr, page_size as usize / 2)?;
            flash_data.extend_from_slice(&page);
            page_addr += page_size;
        }
        Ok(flash_data)
    }

    /// Read one fuse byte.
    pub fn read_fuse(&mut self, fuse_number: u32) -> Result<u8> {
        self.check_gate()?;
        self.session.read_fuse_data(fuse_number)
    }

    /// Write one fuse byte.
    pub fn write_fuse(&mut self, fuse_number: u32, value: u8) -> Result<()> {
        self.check_gate()?;
        self.session.write_fuse_data(fuse_number, value)
    }

    /// Access to the underlying session, used by tests to inspect traffic.
    pub fn session_mut(&mut self) -> &mut UpdiSession<'a, P> {
        &mut self.session
    }

    fn check_gate(&self) -> Result<()> {
        if self.programming {
            Ok(())
        } else {
            Err(Error::NotInProgMode)
        }
    }
}
