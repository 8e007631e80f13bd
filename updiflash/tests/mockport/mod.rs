//! In-memory port with a small UPDI target simulator behind it.
//!
//! `MockPort` mimics the single-wire adapter: every byte written comes back
//! as an echo, followed by whatever the simulated target answers. The
//! simulator decodes real instruction frames (SYNC, opcodes, operands,
//! repeat counts) against a register file and a byte-addressed memory, so
//! the tests exercise the exact wire traffic the production stack emits.

// Not every test binary touches every helper here.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};

use updiflash::error::Result;
use updiflash::port::Port;

const SYNC: u8 = 0x55;
const ACK: u8 = 0x40;

const CS_CTRLA: u8 = 0x02;
const CS_ASI_KEY_STATUS: u8 = 0x07;
const CS_ASI_RESET_REQ: u8 = 0x08;
const CS_ASI_SYS_STATUS: u8 = 0x0B;

const CTRLA_RSD: u8 = 1 << 3;
const KEY_STATUS_CHIPERASE: u8 = 1 << 3;
const KEY_STATUS_NVMPROG: u8 = 1 << 4;
const SYS_STATUS_RSTSYS: u8 = 1 << 5;
const SYS_STATUS_NVMPROG: u8 = 1 << 3;
const SYS_STATUS_LOCKSTATUS: u8 = 1 << 0;

const RESET_REQ_VALUE: u8 = 0x59;

/// Default SIB: a PDI v1 part ("P:0" at bytes 8..11).
pub const SIB_V1: [u8; 16] = *b"tinyAVR P:0D:0-3";

/// SIB advertising a PDI v2 NVM controller.
pub const SIB_V2: [u8; 16] = *b"AVR     P:2D:1-3";

#[derive(Debug)]
enum Phase {
    Sync,
    Opcode,
    /// Collecting fixed-size operands following the instruction byte.
    Collect { op: u8, need: usize, got: Vec<u8> },
    /// Data phase of an STS store.
    StsData { addr: u32, need: usize, got: Vec<u8> },
    /// Data phase of an ST ptr-inc store.
    StPtrData { width: usize, remaining_units: usize, got: Vec<u8> },
    /// Collecting the 8 key characters.
    KeyData { got: Vec<u8> },
}

/// Simulated UPDI target.
pub struct SimTarget {
    /// CS/ASI register file, indexed by LDCS/STCS register number.
    pub cs: [u8; 16],
    /// Byte-addressed memory (flash window, NVMCTRL, fuses, ...).
    pub memory: HashMap<u32, u8>,
    /// Every memory store the target observed, in order.
    pub store_log: Vec<(u32, u8)>,
    /// Keys received, already reversed back into reading order.
    pub keys_received: Vec<String>,
    /// SIB returned for KEY+SIB requests.
    pub sib: [u8; 16],
    /// Byte sent instead of a real ACK; tests set this to break stores.
    pub ack_byte: u8,
    /// Whether the NVMProg key latches KEY_STATUS.
    pub accept_nvmprog_key: bool,
    /// Whether the NVMErase key latches KEY_STATUS.
    pub accept_erase_key: bool,
    /// Whether a reset release with a latched NVMProg key enters prog mode.
    pub enter_prog_on_reset_release: bool,

    phase: Phase,
    ptr: u32,
    repeat: u32,
    nvmprog_key_latched: bool,
    erase_key_latched: bool,
}

impl Default for SimTarget {
    fn default() -> Self {
        let mut cs = [0u8; 16];
        // STATUSA non-zero: the PHY is alive.
        cs[0] = 0x10;
        Self {
            cs,
            memory: HashMap::new(),
            store_log: Vec::new(),
            keys_received: Vec::new(),
            sib: SIB_V1,
            ack_byte: ACK,
            accept_nvmprog_key: true,
            accept_erase_key: true,
            enter_prog_on_reset_release: true,
            phase: Phase::Sync,
            ptr: 0,
            repeat: 0,
            nvmprog_key_latched: false,
            erase_key_latched: false,
        }
    }
}

impl SimTarget {
    /// A target that starts out locked.
    pub fn locked() -> Self {
        let mut sim = Self::default();
        sim.cs[CS_ASI_SYS_STATUS as usize] |= SYS_STATUS_LOCKSTATUS;
        sim
    }

    fn mem(&self, addr: u32) -> u8 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    fn store(&mut self, addr: u32, value: u8) {
        self.memory.insert(addr, value);
        self.store_log.push((addr, value));
    }

    fn rsd_active(&self) -> bool {
        self.cs[CS_CTRLA as usize] & CTRLA_RSD != 0
    }

    /// Pending repeat as a transfer count, consumed on use.
    fn take_units(&mut self) -> usize {
        let units = self.repeat as usize + 1;
        self.repeat = 0;
        units
    }

    fn write_cs(&mut self, reg: u8, value: u8) {
        self.cs[reg as usize] = value;

        if reg == CS_ASI_RESET_REQ {
            let sys = &mut self.cs[CS_ASI_SYS_STATUS as usize];
            if value == RESET_REQ_VALUE {
                *sys |= SYS_STATUS_RSTSYS;
            } else if value == 0 {
                *sys &= !SYS_STATUS_RSTSYS;
                if self.nvmprog_key_latched && self.enter_prog_on_reset_release {
                    *sys |= SYS_STATUS_NVMPROG;
                }
                if self.erase_key_latched {
                    *sys &= !SYS_STATUS_LOCKSTATUS;
                }
            }
        }
    }

    fn handle_key(&mut self, reversed: &[u8]) {
        let key: String = reversed.iter().rev().map(|&b| b as char).collect();

        if key == "NVMProg " {
            self.nvmprog_key_latched = true;
            if self.accept_nvmprog_key {
                self.cs[CS_ASI_KEY_STATUS as usize] |= KEY_STATUS_NVMPROG;
            }
        } else if key == "NVMErase" {
            self.erase_key_latched = true;
            if self.accept_erase_key {
                self.cs[CS_ASI_KEY_STATUS as usize] |= KEY_STATUS_CHIPERASE;
            }
        }

        self.keys_received.push(key);
    }

    fn addr_width(op: u8) -> usize {
        match op & 0x0C {
            0x08 => 3,
            0x04 => 2,
            _ => 1,
        }
    }

    fn le_value(bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
    }

    /// Decode one incoming byte, appending any response to `out`.
    fn feed(&mut self, byte: u8, out: &mut VecDeque<u8>) {
        let phase = std::mem::replace(&mut self.phase, Phase::Sync);
        match phase {
            Phase::Sync => {
                if byte == SYNC {
                    self.phase = Phase::Opcode;
                }
                // Anything else on an idle line (e.g. a BREAK) is ignored.
            }

            Phase::Opcode => self.start_instruction(byte, out),

            Phase::Collect { op, need, mut got } => {
                got.push(byte);
                if got.len() == need {
                    self.finish_operands(op, &got, out);
                } else {
                    self.phase = Phase::Collect { op, need, got };
                }
            }

            Phase::StsData { addr, need, mut got } => {
                got.push(byte);
                if got.len() == need {
                    for (k, &value) in got.iter().enumerate() {
                        self.store(addr + k as u32, value);
                    }
                    out.push_back(self.ack_byte);
                } else {
                    self.phase = Phase::StsData { addr, need, got };
                }
            }

            Phase::StPtrData {
                width,
                remaining_units,
                mut got,
            } => {
                got.push(byte);
                if got.len() == width {
                    for (k, &value) in got.iter().enumerate() {
                        self.store(self.ptr + k as u32, value);
                    }
                    self.ptr += width as u32;
                    if !self.rsd_active() {
                        out.push_back(self.ack_byte);
                    }
                    if remaining_units > 1 {
                        self.phase = Phase::StPtrData {
                            width,
                            remaining_units: remaining_units - 1,
                            got: Vec::new(),
                        };
                    }
                } else {
                    self.phase = Phase::StPtrData {
                        width,
                        remaining_units,
                        got,
                    };
                }
            }

            Phase::KeyData { mut got } => {
                got.push(byte);
                if got.len() == 8 {
                    self.handle_key(&got);
                } else {
                    self.phase = Phase::KeyData { got };
                }
            }
        }
    }

    fn start_instruction(&mut self, op: u8, out: &mut VecDeque<u8>) {
        match op & 0xE0 {
            // LDCS
            0x80 => out.push_back(self.cs[(op & 0x0F) as usize]),

            // STCS
            0xC0 => self.phase = Phase::Collect { op, need: 1, got: Vec::new() },

            // REPEAT
            0xA0 => self.phase = Phase::Collect { op, need: 1, got: Vec::new() },

            // LDS
            0x00 => {
                self.phase = Phase::Collect {
                    op,
                    need: Self::addr_width(op),
                    got: Vec::new(),
                }
            }

            // STS
            0x40 => {
                self.phase = Phase::Collect {
                    op,
                    need: Self::addr_width(op),
                    got: Vec::new(),
                }
            }

            // LD via pointer
            0x20 => {
                let width = (op & 0x03) as usize + 1;
                let units = self.take_units();
                for _ in 0..units {
                    for k in 0..width {
                        out.push_back(self.mem(self.ptr + k as u32));
                    }
                    self.ptr += width as u32;
                }
            }

            // ST via pointer
            0x60 => {
                if op & 0x08 != 0 {
                    // Set pointer; the address width rides in the data bits.
                    let need = (op & 0x03) as usize + 1;
                    self.phase = Phase::Collect { op, need, got: Vec::new() };
                } else {
                    let width = (op & 0x03) as usize + 1;
                    let units = self.take_units();
                    self.phase = Phase::StPtrData {
                        width,
                        remaining_units: units,
                        got: Vec::new(),
                    };
                }
            }

            // KEY / SIB
            0xE0 => {
                if op & 0x04 != 0 {
                    for b in self.sib {
                        out.push_back(b);
                    }
                } else {
                    self.phase = Phase::KeyData { got: Vec::new() };
                }
            }

            _ => unreachable!(),
        }
    }

    fn finish_operands(&mut self, op: u8, got: &[u8], out: &mut VecDeque<u8>) {
        match op & 0xE0 {
            0xC0 => self.write_cs(op & 0x0F, got[0]),

            0xA0 => self.repeat = u32::from(got[0]),

            0x00 => {
                let addr = Self::le_value(got);
                let width = (op & 0x03) as usize + 1;
                for k in 0..width {
                    out.push_back(self.mem(addr + k as u32));
                }
            }

            0x40 => {
                let addr = Self::le_value(got);
                let width = (op & 0x03) as usize + 1;
                out.push_back(self.ack_byte);
                self.phase = Phase::StsData {
                    addr,
                    need: width,
                    got: Vec::new(),
                };
            }

            0x60 => {
                self.ptr = Self::le_value(got);
                out.push_back(self.ack_byte);
            }

            _ => unreachable!(),
        }
    }
}

/// Port implementation backed by [`SimTarget`].
pub struct MockPort {
    /// Everything the host wrote, in order, echoes included.
    pub written: Vec<u8>,
    /// Baud rates passed to `reopen`, in order.
    pub reopens: Vec<u32>,
    /// The simulated target.
    pub sim: SimTarget,
    read_queue: VecDeque<u8>,
    baud_rate: u32,
}

impl MockPort {
    pub fn new(sim: SimTarget) -> Self {
        Self {
            written: Vec::new(),
            reopens: Vec::new(),
            sim,
            read_queue: VecDeque::new(),
            baud_rate: 115_200,
        }
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.read_queue.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no data from target",
            ));
        }
        let n = buf.len().min(self.read_queue.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.read_queue.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for &byte in buf {
            self.written.push(byte);
            // The single-wire echo precedes any target response.
            self.read_queue.push_back(byte);
            self.sim.feed(byte, &mut self.read_queue);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn reopen(&mut self, baud_rate: u32) -> Result<()> {
        self.reopens.push(baud_rate);
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.read_queue.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
