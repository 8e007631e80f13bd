//! UPDI instruction codec.
//!
//! Builds instruction frames on top of [`UpdiLink`] and enforces the
//! per-instruction response contracts: LDS/LD/LDCS/KEY elicit data bytes,
//! every phase of a store elicits a single ACK byte, and a REPEAT prefix
//! turns the next memory instruction into a burst.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::link::UpdiLink;
use crate::port::Port;
use crate::protocol::constants::{self as c, cs, opcode};

/// UPDI instruction codec over an echo-cancelled link.
pub struct UpdiPhy<P: Port> {
    link: UpdiLink<P>,
    use_24bit_addr: bool,
}

impl<P: Port> UpdiPhy<P> {
    /// Take ownership of the link and bring the PHY to a known state.
    ///
    /// Sends a double break, initialises CTRLA/CTRLB, and if the interface
    /// does not report ready retries the recovery once.
    pub fn new(link: UpdiLink<P>) -> Result<Self> {
        let mut phy = Self {
            link,
            use_24bit_addr: false,
        };

        phy.link.double_break()?;
        phy.init()?;

        if !phy.is_ready()? {
            log::warn!("UPDI not ready, retrying double-break recovery");
            phy.link.double_break()?;
            phy.init()?;
        }

        Ok(phy)
    }

    /// Switch LDS/STS/ST-ptr addressing between 16-bit and 24-bit mode.
    /// 24-bit addresses are required by PDI v2 parts.
    pub fn set_24bit_addr(&mut self, enable: bool) {
        self.use_24bit_addr = enable;
    }

    /// Whether 24-bit addressing is in effect.
    pub fn use_24bit_addr(&self) -> bool {
        self.use_24bit_addr
    }

    /// Disable collision detection and enable the inter-byte delay. Called
    /// on construction and again after a double-break recovery.
    pub fn init(&mut self) -> Result<()> {
        self.stcs(cs::CTRLB, 1 << c::CTRLB_CCDETDIS_BIT)?;
        self.stcs(cs::CTRLA, 1 << c::CTRLA_IBDLY_BIT)?;
        Ok(())
    }

    /// True iff STATUSA reads non-zero. A silent interface counts as not
    /// ready rather than as a hard failure, so the caller can retry.
    pub fn is_ready(&mut self) -> Result<bool> {
        match self.ldcs(cs::STATUSA) {
            Ok(status) => Ok(status != 0),
            Err(Error::Protocol(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Load a control/status register.
    pub fn ldcs(&mut self, reg: u8) -> Result<u8> {
        self.link
            .send(&[c::SYNC, opcode::LDCS | (reg & 0x0F)])?;

        let response = self.link.receive(1)?;
        if response.len() != 1 {
            return Err(Error::Protocol(format!("ldcs {reg:#04x}: no response")));
        }
        Ok(response[0])
    }

    /// Store a control/status register. No response is defined.
    pub fn stcs(&mut self, reg: u8, value: u8) -> Result<()> {
        self.link
            .send(&[c::SYNC, opcode::STCS | (reg & 0x0F), value])
    }

    /// Load one byte from a direct address.
    pub fn ld(&mut self, address: u32) -> Result<u8> {
        let frame = self.direct_frame(opcode::LDS, c::DATA_8, address);
        self.link.send(&frame)?;

        let response = self.link.receive(1)?;
        if response.len() != 1 {
            return Err(Error::Protocol(format!("ld {address:#08x}: no response")));
        }
        Ok(response[0])
    }

    /// Load one little-endian word from a direct address.
    pub fn ld16(&mut self, address: u32) -> Result<Vec<u8>> {
        let frame = self.direct_frame(opcode::LDS, c::DATA_16, address);
        self.link.send(&frame)?;

        let response = self.link.receive(2)?;
        if response.len() != 2 {
            return Err(Error::Protocol(format!(
                "ld16 {address:#08x}: expected 2 bytes, got {}",
                response.len()
            )));
        }
        Ok(response)
    }

    /// Store one byte to a direct address. Both the address phase and the
    /// data phase must be ACKed.
    pub fn st(&mut self, address: u32, value: u8) -> Result<()> {
        let frame = self.direct_frame(opcode::STS, c::DATA_8, address);
        self.link.send(&frame)?;
        self.expect_ack("st address")?;

        self.link.send(&[value])?;
        self.expect_ack("st data")
    }

    /// Store one little-endian word to a direct address, both phases ACKed.
    pub fn st16(&mut self, address: u32, value: u16) -> Result<()> {
        let frame = self.direct_frame(opcode::STS, c::DATA_16, address);
        self.link.send(&frame)?;
        self.expect_ack("st16 address")?;

        self.link.send(&value.to_le_bytes())?;
        self.expect_ack("st16 data")
    }

    /// Set the UPDI pointer. The address width follows the addressing mode.
    pub fn st_ptr(&mut self, address: u32) -> Result<()> {
        let width = if self.use_24bit_addr {
            c::DATA_24
        } else {
            c::DATA_16
        };
        let mut frame = vec![c::SYNC, opcode::ST | c::PTR_ADDRESS | width];
        self.push_address(&mut frame, address);

        self.link.send(&frame)?;
        self.expect_ack("st_ptr")
    }

    /// Load `size` bytes from the pointer with post-increment. A preceding
    /// [`repeat`](Self::repeat) determines the burst length.
    pub fn ld_ptr_inc(&mut self, size: usize) -> Result<Vec<u8>> {
        self.link
            .send(&[c::SYNC, opcode::LD | c::PTR_INC | c::DATA_8])?;

        let response = self.link.receive(size)?;
        if response.len() != size {
            return Err(Error::Protocol(format!(
                "ld_ptr_inc: expected {size} bytes, got {}",
                response.len()
            )));
        }
        Ok(response)
    }

    /// Load `words` little-endian words from the pointer with
    /// post-increment.
    pub fn ld_ptr_inc16(&mut self, words: usize) -> Result<Vec<u8>> {
        self.link
            .send(&[c::SYNC, opcode::LD | c::PTR_INC | c::DATA_16])?;

        let response = self.link.receive(words * 2)?;
        if response.len() != words * 2 {
            return Err(Error::Protocol(format!(
                "ld_ptr_inc16: expected {} bytes, got {}",
                words * 2,
                response.len()
            )));
        }
        Ok(response)
    }

    /// Store bytes through the pointer with post-increment, one ACK per
    /// byte. The first byte rides in the instruction frame itself.
    pub fn st_ptr_inc(&mut self, data: &[u8]) -> Result<()> {
        let first = *data
            .first()
            .ok_or_else(|| Error::Protocol("st_ptr_inc: empty data".into()))?;

        self.link
            .send(&[c::SYNC, opcode::ST | c::PTR_INC | c::DATA_8, first])?;
        self.expect_ack("st_ptr_inc first byte")?;

        for &byte in &data[1..] {
            self.link.send(&[byte])?;
            self.expect_ack("st_ptr_inc")?;
        }
        Ok(())
    }

    /// Store words through the pointer with post-increment and response
    /// signatures disabled for throughput.
    ///
    /// CS.CTRLA is a globally visible PHY setting: RSD is raised together
    /// with IBDLY for the burst and restored to IBDLY-only on every exit
    /// path. Leaving RSD set would deadlock the next ACK-expecting
    /// instruction.
    pub fn st_ptr_inc16(&mut self, data: &[u8]) -> Result<()> {
        let ctrla_ack_on = 1 << c::CTRLA_IBDLY_BIT;
        let ctrla_ack_off = ctrla_ack_on | (1 << c::CTRLA_RSD_BIT);

        self.stcs(cs::CTRLA, ctrla_ack_off)?;

        let burst = self.st_ptr_inc16_burst(data);
        let restore = self.stcs(cs::CTRLA, ctrla_ack_on);

        burst.and(restore)
    }

    fn st_ptr_inc16_burst(&mut self, data: &[u8]) -> Result<()> {
        self.link
            .send(&[c::SYNC, opcode::ST | c::PTR_INC | c::DATA_16])?;
        // No ACKs while RSD is set; the payload goes out in one stream.
        self.link.send(data)
    }

    /// Arm the repeat counter: the next memory instruction runs `count`
    /// times. The wire carries `count - 1`; 256 is the ceiling.
    pub fn repeat(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > c::MAX_REPEAT_SIZE {
            return Err(Error::Protocol(format!(
                "repeat count {count} out of range"
            )));
        }
        let encoded = (count - 1) as u8;
        self.link
            .send(&[c::SYNC, opcode::REPEAT | c::REPEAT_BYTE, encoded])
    }

    /// Read the 16-byte System Information Block as ASCII.
    pub fn read_sib(&mut self) -> Result<String> {
        self.link
            .send(&[c::SYNC, opcode::KEY | c::KEY_SIB | c::SIB_128])?;

        let response = self.link.receive(16)?;
        if response.len() != 16 {
            return Err(Error::Protocol(format!(
                "read_sib: expected 16 bytes, got {}",
                response.len()
            )));
        }
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    /// Send an 8-character activation key. The target expects the key
    /// characters LSB first, so they go out in reverse order.
    pub fn key(&mut self, key: &str) -> Result<()> {
        if key.len() != 8 {
            return Err(Error::Protocol(format!(
                "key must be 8 characters, got {}",
                key.len()
            )));
        }

        self.link.send(&[c::SYNC, opcode::KEY | c::KEY_64])?;

        let reversed: Vec<u8> = key.bytes().rev().collect();
        self.link.send(&reversed)
    }

    /// Access to the underlying link, used by tests to inspect traffic.
    pub fn link_mut(&mut self) -> &mut UpdiLink<P> {
        &mut self.link
    }

    /// Build `SYNC + opcode|addr-width|data-width + address` for LDS/STS.
    fn direct_frame(&self, op: u8, data_width: u8, address: u32) -> Vec<u8> {
        let addr_width = if self.use_24bit_addr {
            c::ADDRESS_24
        } else {
            c::ADDRESS_16
        };
        let mut frame = vec![c::SYNC, op | addr_width | data_width];
        self.push_address(&mut frame, address);
        frame
    }

    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    fn push_address(&self, frame: &mut Vec<u8>, address: u32) {
        if self.use_24bit_addr {
            frame.write_u24::<LittleEndian>(address & 0xFF_FFFF).unwrap();
        } else {
            frame.write_u16::<LittleEndian>(address as u16).unwrap();
        }
    }

    fn expect_ack(&mut self, context: &str) -> Result<()> {
        let response = self.link.receive(1)?;
        match response.as_slice() {
            [c::ACK] => Ok(()),
            [] => Err(Error::Protocol(format!("{context}: no ACK received"))),
            [byte, ..] => Err(Error::Protocol(format!(
                "{context}: expected ACK, got {byte:#04x}"
            ))),
        }
    }
}
