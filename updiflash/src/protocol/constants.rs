//! UPDI instruction set and register map constants.
//!
//! Every instruction frame the host transmits starts with [`SYNC`]. The
//! opcode occupies the top three bits of the instruction byte; the low bits
//! select addressing width, data width, pointer mode or a CS register.

/// Frame-leading synchronisation byte, required on every instruction.
pub const SYNC: u8 = 0x55;

/// Single byte returned by the target after each phase of a successful store.
pub const ACK: u8 = 0x40;

/// A BREAK on the wire is a plain zero byte held low by the UART framing.
pub const BREAK: u8 = 0x00;

/// Opcodes (top bits of the instruction byte).
pub mod opcode {
    /// Load direct from a 16/24-bit address.
    pub const LDS: u8 = 0x00;
    /// Store direct to a 16/24-bit address.
    pub const STS: u8 = 0x40;
    /// Load via the UPDI pointer.
    pub const LD: u8 = 0x20;
    /// Store via the UPDI pointer.
    pub const ST: u8 = 0x60;
    /// Load a control/status register (low 4 bits select it).
    pub const LDCS: u8 = 0x80;
    /// Store a control/status register.
    pub const STCS: u8 = 0xC0;
    /// Set the repeat counter (next byte = count - 1).
    pub const REPEAT: u8 = 0xA0;
    /// Key/SIB instruction.
    pub const KEY: u8 = 0xE0;
}

/// Address width modifier for LDS/STS.
pub const ADDRESS_16: u8 = 0x04;
/// Address width modifier for LDS/STS (Dx parts, PDI v2).
pub const ADDRESS_24: u8 = 0x08;

/// Data width modifiers. 16-bit data travels little-endian on the wire.
pub const DATA_8: u8 = 0x00;
/// 16-bit data width modifier.
pub const DATA_16: u8 = 0x01;
/// 24-bit pointer-address width modifier for ST ptr setup on Dx parts.
pub const DATA_24: u8 = 0x02;

/// Pointer mode: access with post-increment.
pub const PTR_INC: u8 = 0x04;
/// Pointer mode: set the pointer address.
pub const PTR_ADDRESS: u8 = 0x08;

/// KEY modifier selecting the SIB instead of a key write.
pub const KEY_SIB: u8 = 0x04;
/// KEY operand size: 64 bits (8 key characters).
pub const KEY_64: u8 = 0x00;
/// KEY/SIB operand size: 128 bits (16 SIB characters).
pub const SIB_128: u8 = 0x01;

/// Repeat counter operates on bytes.
pub const REPEAT_BYTE: u8 = 0x00;

/// Largest transfer a one-byte repeat counter can express (off-by-one count).
pub const MAX_REPEAT_SIZE: usize = 0xFF + 1;

/// Key string activating NVM programming.
pub const KEY_NVMPROG: &str = "NVMProg ";
/// Key string activating chip erase (lock recovery).
pub const KEY_CHIPERASE: &str = "NVMErase";

/// UPDI control/status and ASI register addresses (LDCS/STCS space).
pub mod cs {
    /// PHY status; non-zero once the interface is alive.
    pub const STATUSA: u8 = 0x00;
    /// PHY control A (IBDLY, RSD).
    pub const CTRLA: u8 = 0x02;
    /// PHY control B (UPDIDIS, CCDETDIS).
    pub const CTRLB: u8 = 0x03;
    /// Key acceptance status.
    pub const ASI_KEY_STATUS: u8 = 0x07;
    /// Reset request register.
    pub const ASI_RESET_REQ: u8 = 0x08;
    /// System status (reset, lock, prog mode).
    pub const ASI_SYS_STATUS: u8 = 0x0B;
}

/// CS.CTRLA: inter-byte delay enable.
pub const CTRLA_IBDLY_BIT: u8 = 7;
/// CS.CTRLA: response signature disable. Must never be left set across an
/// ACK-expecting instruction.
pub const CTRLA_RSD_BIT: u8 = 3;
/// CS.CTRLB: collision detection disable.
pub const CTRLB_CCDETDIS_BIT: u8 = 3;
/// CS.CTRLB: UPDI interface disable.
pub const CTRLB_UPDIDIS_BIT: u8 = 2;

/// ASI_KEY_STATUS: CHIPERASE key accepted.
pub const KEY_STATUS_CHIPERASE_BIT: u8 = 3;
/// ASI_KEY_STATUS: NVMPROG key accepted.
pub const KEY_STATUS_NVMPROG_BIT: u8 = 4;

/// ASI_SYS_STATUS: system held in reset.
pub const SYS_STATUS_RSTSYS_BIT: u8 = 5;
/// ASI_SYS_STATUS: NVM programming mode active.
pub const SYS_STATUS_NVMPROG_BIT: u8 = 3;
/// ASI_SYS_STATUS: device locked.
pub const SYS_STATUS_LOCKSTATUS_BIT: u8 = 0;

/// Magic written to ASI_RESET_REQ to assert reset.
pub const RESET_REQ_VALUE: u8 = 0x59;

/// NVMCTRL register offsets from the part's NVMCTRL base.
pub mod nvmctrl {
    /// Command register.
    pub const CTRLA: u16 = 0x00;
    /// Busy/error status.
    pub const STATUS: u16 = 0x02;
    /// Fuse data low byte.
    pub const DATAL: u16 = 0x06;
    /// Fuse address low byte.
    pub const ADDRL: u16 = 0x08;
    /// Fuse address high byte.
    pub const ADDRH: u16 = 0x09;
}

/// NVMCTRL.STATUS: flash controller busy.
pub const NVM_STATUS_FLASH_BUSY_BIT: u8 = 0;
/// NVMCTRL.STATUS: EEPROM controller busy.
pub const NVM_STATUS_EEPROM_BUSY_BIT: u8 = 1;
/// NVMCTRL.STATUS: write error latched.
pub const NVM_STATUS_WRITE_ERROR_BIT: u8 = 2;

/// NVMCTRL v0 CTRLA command codes (tiny/mega-0 parts, PDI v1).
pub mod nvm_cmd {
    /// Commit the page buffer to flash.
    pub const WRITE_PAGE: u8 = 0x01;
    /// Clear the page buffer.
    pub const PAGE_BUFFER_CLR: u8 = 0x04;
    /// Erase the entire flash and EEPROM.
    pub const CHIP_ERASE: u8 = 0x05;
    /// Write a fuse byte from ADDR/DATA registers.
    pub const WRITE_FUSE: u8 = 0x07;
}
