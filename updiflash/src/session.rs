//! UPDI application protocol: keys, reset sequencing and NVM access.
//!
//! Composes [`UpdiPhy`] instructions into the operations a programmer needs:
//! SIB inspection, programming-mode entry (key + reset toggle + status
//! polling), lock recovery via the chip-erase key, page programming through
//! the NVM controller's page buffer, and bulk/fuse memory I/O.
//!
//! All polling runs against wall-clock deadlines with fixed sleep
//! granularity; the protocol is strictly request/response and the link is
//! the only I/O.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::constants::{self as c, cs, nvm_cmd, nvmctrl};
use crate::protocol::UpdiPhy;

/// Deadline for RSTSYS to clear after a reset release.
const RESET_RELEASE_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for a reset release.
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Deadline for the NVMPROG key status after a reset toggle.
const PROGMODE_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for NVMPROG.
const PROGMODE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Deadline for LOCKSTATUS to clear after an erase-key reset.
const UNLOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval while waiting for the unlock.
const UNLOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Deadline for the NVM controller to go idle.
const FLASH_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for the NVM controller.
const FLASH_READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// UPDI session against one target device.
pub struct UpdiSession<'a, P: Port> {
    profile: &'a DeviceProfile,
    phy: UpdiPhy<P>,
    pdi_v2: bool,
}

impl<'a, P: Port> UpdiSession<'a, P> {
    /// Create a session from an initialised PHY and the target's memory map.
    pub fn new(profile: &'a DeviceProfile, phy: UpdiPhy<P>) -> Self {
        Self {
            profile,
            phy,
            pdi_v2: false,
        }
    }

    /// Whether the SIB identified a PDI v2 NVM controller.
    pub fn pdi_v2(&self) -> bool {
        self.pdi_v2
    }

    /// Access to the underlying PHY, used by tests to inspect traffic.
    pub fn phy_mut(&mut self) -> &mut UpdiPhy<P> {
        &mut self.phy
    }

    /// Read the SIB and configure the session for the detected NVM
    /// interface version. Must run before any NVM operation.
    pub fn init_nvm_operation(&mut self) -> Result<String> {
        if !self.phy.is_ready()? {
            return Err(Error::Protocol("UPDI interface is not ready".into()));
        }

        let sib = self.phy.read_sib()?;
        if sib.len() < 16 {
            return Err(Error::Protocol(format!("short SIB: {sib:?}")));
        }

        // The NVM version field sits at bytes 8..11; a non-ASCII SIB must
        // not panic the slice, so compare on bytes.
        if sib.as_bytes().get(8..11) == Some(b"P:2".as_slice()) {
            info!("using PDI v2 interfaces");
            self.pdi_v2 = true;
            // PDI v2 parts use 24-bit addresses instead of 16-bit.
            self.phy.set_24bit_addr(true);
        }

        if let Some(ocd) = sib.get(11..14) {
            debug!("debug interface: {ocd}");
        }
        Ok(sib)
    }

    /// Whether the device currently reports NVM programming mode.
    pub fn in_prog_mode(&mut self) -> Result<bool> {
        let status = self.phy.ldcs(cs::ASI_SYS_STATUS)?;
        Ok(status & (1 << c::SYS_STATUS_NVMPROG_BIT) != 0)
    }

    /// Enter NVM programming mode. A no-op when already there.
    pub fn enter_progmode(&mut self) -> Result<()> {
        if self.in_prog_mode()? {
            info!("already in NVM programming mode");
            return Ok(());
        }

        self.write_progmode_key()?;

        self.reset(true)?;
        self.reset(false)?;

        debug!("waiting for NVMPROG status");
        let start = Instant::now();
        loop {
            let key_status = self.phy.ldcs(cs::ASI_KEY_STATUS)?;
            if key_status & (1 << c::KEY_STATUS_NVMPROG_BIT) != 0 {
                break;
            }
            if start.elapsed() > PROGMODE_TIMEOUT {
                break;
            }
            thread::sleep(PROGMODE_POLL_INTERVAL);
        }

        if !self.in_prog_mode()? {
            return Err(Error::Timeout(
                "failed to enter NVM programming mode".into(),
            ));
        }
        Ok(())
    }

    /// Unlock a locked device with the chip-erase key.
    ///
    /// The NVMProg key is written alongside the erase key so a CRC-enabled
    /// part comes back up in programming mode after the erase.
    pub fn unlock(&mut self) -> Result<()> {
        self.phy.key(c::KEY_CHIPERASE)?;
        let key_status = self.phy.ldcs(cs::ASI_KEY_STATUS)?;
        if key_status & (1 << c::KEY_STATUS_CHIPERASE_BIT) == 0 {
            return Err(Error::KeyRejected("CHIPERASE".into()));
        }

        self.write_progmode_key()?;

        self.reset(true)?;
        self.reset(false)?;

        self.wait_unlocked(UNLOCK_TIMEOUT)
    }

    /// Leave programming mode and disable the UPDI interface cleanly.
    pub fn leave_progmode(&mut self) -> Result<()> {
        info!("leaving NVM programming mode");

        self.reset(true)?;
        self.reset(false)?;

        self.phy.stcs(
            cs::CTRLB,
            (1 << c::CTRLB_UPDIDIS_BIT) | (1 << c::CTRLB_CCDETDIS_BIT),
        )
    }

    /// Apply or release the UPDI reset condition.
    pub fn reset(&mut self, apply: bool) -> Result<()> {
        if apply {
            debug!("applying UPDI reset");
            self.phy.stcs(cs::ASI_RESET_REQ, c::RESET_REQ_VALUE)?;

            let status = self.phy.ldcs(cs::ASI_SYS_STATUS)?;
            if status & (1 << c::SYS_STATUS_RSTSYS_BIT) == 0 {
                return Err(Error::Protocol("reset request not taken".into()));
            }
        } else {
            debug!("releasing UPDI reset");
            self.phy.stcs(cs::ASI_RESET_REQ, 0)?;

            let start = Instant::now();
            loop {
                let status = self.phy.ldcs(cs::ASI_SYS_STATUS)?;
                if status & (1 << c::SYS_STATUS_RSTSYS_BIT) == 0 {
                    break;
                }
                if start.elapsed() > RESET_RELEASE_TIMEOUT {
                    return Err(Error::Timeout("reset still active".into()));
                }
                thread::sleep(RESET_POLL_INTERVAL);
            }
        }
        Ok(())
    }

    /// Erase flash and EEPROM. PDI v1 only.
    pub fn chip_erase(&mut self) -> Result<()> {
        if self.pdi_v2 {
            return Err(Error::Unsupported("PDI v2 chip erase".into()));
        }

        self.wait_flash_ready()?;
        self.execute_nvm_command(nvm_cmd::CHIP_ERASE)?;
        self.wait_flash_ready()
    }

    /// Program one flash page through the page buffer. PDI v1 only.
    ///
    /// `page_data` must be exactly one page; the caller supplies the mapped
    /// flash address.
    pub fn write_nvm_page(&mut self, start_addr: u32, page_data: &[u8]) -> Result<()> {
        if self.pdi_v2 {
            return Err(Error::Unsupported("PDI v2 page write".into()));
        }

        self.wait_flash_ready()?;

        debug!("clearing page buffer");
        self.execute_nvm_command(nvm_cmd::PAGE_BUFFER_CLR)?;
        self.wait_flash_ready()?;

        self.write_data_words(start_addr, page_data)?;

        self.execute_nvm_command(nvm_cmd::WRITE_PAGE)?;
        self.wait_flash_ready()
    }

    /// Write up to 256 bytes with 8-bit stores.
    pub fn write_data(&mut self, address: u32, data: &[u8]) -> Result<()> {
        // One or two bytes go out as direct stores, skipping pointer setup.
        if data.len() == 1 {
            return self.phy.st(address, data[0]);
        }
        if data.len() == 2 {
            self.phy.st(address, data[0])?;
            return self.phy.st(address + 1, data[1]);
        }

        if data.len() > c::MAX_REPEAT_SIZE {
            return Err(Error::Protocol(format!(
                "write_data: {} bytes exceeds the repeat limit",
                data.len()
            )));
        }

        self.phy.st_ptr(address)?;
        self.phy.repeat(data.len())?;
        self.phy.st_ptr_inc(data)
    }

    /// Write up to 256 words with the unacknowledged 16-bit burst path.
    pub fn write_data_words(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if data.len() == 2 {
            let value = u16::from_le_bytes([data[0], data[1]]);
            return self.phy.st16(address, value);
        }

        if data.len() % 2 != 0 {
            return Err(Error::Protocol(
                "write_data_words: data must align on word width".into(),
            ));
        }
        if data.len() > c::MAX_REPEAT_SIZE * 2 {
            return Err(Error::Protocol(format!(
                "write_data_words: {} bytes exceeds the repeat limit",
                data.len()
            )));
        }

        self.phy.st_ptr(address)?;
        self.phy.repeat(data.len() / 2)?;
        self.phy.st_ptr_inc16(data)
    }

    /// Read up to 256 bytes with 8-bit loads.
    pub fn read_data(&mut self, address: u32, byte_size: usize) -> Result<Vec<u8>> {
        if byte_size > c::MAX_REPEAT_SIZE {
            return Err(Error::Protocol(format!(
                "read_data: {byte_size} bytes exceeds the repeat limit"
            )));
        }

        if byte_size == 1 {
            return Ok(vec![self.phy.ld(address)?]);
        }

        self.phy.st_ptr(address)?;
        self.phy.repeat(byte_size)?;
        self.phy.ld_ptr_inc(byte_size)
    }

    /// Read up to 256 words as a little-endian byte stream.
    pub fn read_data_words(&mut self, address: u32, word_size: usize) -> Result<Vec<u8>> {
        if word_size > c::MAX_REPEAT_SIZE {
            return Err(Error::Protocol(format!(
                "read_data_words: {word_size} words exceeds the repeat limit"
            )));
        }

        if word_size == 1 {
            return self.phy.ld16(address);
        }

        self.phy.st_ptr(address)?;
        self.phy.repeat(word_size)?;
        self.phy.ld_ptr_inc16(word_size)
    }

    /// Write one fuse byte through NVMCTRL ADDR/DATA. PDI v1 only, requires
    /// programming mode.
    pub fn write_fuse_data(&mut self, fuse_number: u32, value: u8) -> Result<()> {
        if self.pdi_v2 {
            return Err(Error::Unsupported("PDI v2 fuse write".into()));
        }
        if !self.in_prog_mode()? {
            return Err(Error::NotInProgMode);
        }

        let fuse_addr = self.profile.fuses_base + fuse_number;
        let nvmctrl_base = self.profile.nvmctrl_base;

        self.write_data(
            nvmctrl_base + u32::from(nvmctrl::ADDRL),
            &[(fuse_addr & 0xFF) as u8],
        )?;
        self.write_data(
            nvmctrl_base + u32::from(nvmctrl::ADDRH),
            &[((fuse_addr >> 8) & 0xFF) as u8],
        )?;
        self.write_data(nvmctrl_base + u32::from(nvmctrl::DATAL), &[value])?;

        self.execute_nvm_command(nvm_cmd::WRITE_FUSE)
    }

    /// Read one fuse byte.
    pub fn read_fuse_data(&mut self, fuse_number: u32) -> Result<u8> {
        let data = self.read_data(self.profile.fuses_base + fuse_number, 1)?;
        Ok(data[0])
    }

    /// Poll LOCKSTATUS until the device reports unlocked.
    fn wait_unlocked(&mut self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            let status = self.phy.ldcs(cs::ASI_SYS_STATUS)?;
            if status & (1 << c::SYS_STATUS_LOCKSTATUS_BIT) == 0 {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(Error::Timeout("device still locked".into()));
            }
            thread::sleep(UNLOCK_POLL_INTERVAL);
        }
    }

    /// Send the NVMProg key and verify it was accepted. A no-op when the
    /// device is already in programming mode.
    fn write_progmode_key(&mut self) -> Result<()> {
        if self.in_prog_mode()? {
            debug!("already in NVM programming mode, skipping key");
            return Ok(());
        }

        self.phy.key(c::KEY_NVMPROG)?;
        let key_status = self.phy.ldcs(cs::ASI_KEY_STATUS)?;
        if key_status & (1 << c::KEY_STATUS_NVMPROG_BIT) == 0 {
            return Err(Error::KeyRejected("NVMPROG".into()));
        }
        Ok(())
    }

    /// Gate before every NVM command: wait for the controller to go idle.
    /// A latched WRITE_ERROR fails immediately instead of timing out.
    fn wait_flash_ready(&mut self) -> Result<()> {
        debug!("waiting for NVM controller");

        let start = Instant::now();
        loop {
            let status = self
                .phy
                .ld(self.profile.nvmctrl_base + u32::from(nvmctrl::STATUS))?;

            if status & (1 << c::NVM_STATUS_WRITE_ERROR_BIT) != 0 {
                return Err(Error::NvmWriteError);
            }

            let busy = (1 << c::NVM_STATUS_FLASH_BUSY_BIT) | (1 << c::NVM_STATUS_EEPROM_BUSY_BIT);
            if status & busy == 0 {
                return Ok(());
            }

            if start.elapsed() > FLASH_READY_TIMEOUT {
                return Err(Error::Timeout("NVM controller stayed busy".into()));
            }
            thread::sleep(FLASH_READY_POLL_INTERVAL);
        }
    }

    fn execute_nvm_command(&mut self, command: u8) -> Result<()> {
        debug!("executing NVM command {command:#04x}");
        self.phy
            .st(self.profile.nvmctrl_base + u32::from(nvmctrl::CTRLA), command)
    }
}
