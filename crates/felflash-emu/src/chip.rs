//! SPI NOR chip model
//!
//! Behaves like a plain 3-byte-address serial NOR flash: the write enable
//! latch must be set before every program/erase, the chip is busy for a few
//! status polls afterwards, programming can only clear bits and wraps within
//! the 256-byte page. Commands the chip would ignore on real hardware are
//! ignored here too and counted as protocol violations.

/// Opcodes understood by the model
pub mod opcodes {
    /// Write Enable
    pub const WREN: u8 = 0x06;
    /// Write Disable
    pub const WRDI: u8 = 0x04;
    /// Read Status Register 1
    pub const RDSR: u8 = 0x05;
    /// Read JEDEC ID
    pub const RDID: u8 = 0x9F;
    /// Read Data
    pub const READ: u8 = 0x03;
    /// Page Program
    pub const PP: u8 = 0x02;
    /// Sector Erase 4 KiB
    pub const SE_20: u8 = 0x20;
    /// Block Erase 32 KiB
    pub const BE_52: u8 = 0x52;
    /// Block Erase 64 KiB
    pub const BE_D8: u8 = 0xD8;
}

/// Status register: write in progress
pub const STATUS_BUSY: u8 = 1 << 0;
/// Status register: write enable latch
pub const STATUS_WEL: u8 = 1 << 1;

const PAGE_SIZE: usize = 256;
/// Status polls a page program stays busy for
const PROGRAM_BUSY_POLLS: u32 = 1;
/// Status polls an erase stays busy for
const ERASE_BUSY_POLLS: u32 = 3;

/// Identity and size of the emulated chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// JEDEC manufacturer ID
    pub manufacturer: u8,
    /// JEDEC memory type
    pub model: u8,
    /// Capacity as a power of two
    pub size_exp: u8,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            manufacturer: 0xEF, // Winbond
            model: 0x40,        // W25Q
            size_exp: 0x18,     // 16 MiB
        }
    }
}

impl FlashConfig {
    /// Capacity in bytes
    pub fn size(&self) -> usize {
        1 << self.size_exp
    }
}

/// In-memory SPI NOR flash
pub struct SpiNorChip {
    config: FlashConfig,
    data: Vec<u8>,
    write_enabled: bool,
    busy_polls: u32,
    violations: usize,
}

impl SpiNorChip {
    /// Create an erased chip
    pub fn new(config: FlashConfig) -> Self {
        Self {
            config,
            data: vec![0xFF; config.size()],
            write_enabled: false,
            busy_polls: 0,
            violations: 0,
        }
    }

    /// Create a chip with pre-filled contents
    pub fn with_data(config: FlashConfig, initial_data: &[u8]) -> Self {
        let mut chip = Self::new(config);
        let len = initial_data.len().min(chip.data.len());
        chip.data[..len].copy_from_slice(&initial_data[..len]);
        chip
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Chip identity
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Commands ignored because of busy state, missing WEL or bad framing
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Whether an erase/program cycle is in progress
    pub fn is_busy(&self) -> bool {
        self.busy_polls > 0
    }

    /// Current status register value
    pub fn status(&self) -> u8 {
        let mut status = 0;
        if self.is_busy() {
            status |= STATUS_BUSY;
        }
        if self.write_enabled {
            status |= STATUS_WEL;
        }
        status
    }

    /// Run one chip-select cycle
    ///
    /// `buf` holds the bytes shifted out on MOSI and is overwritten with the
    /// bytes shifted in on MISO.
    pub fn transfer(&mut self, buf: &mut [u8]) {
        let Some(&opcode) = buf.first() else {
            return;
        };

        if self.is_busy() && opcode != opcodes::RDSR {
            self.violation(opcode, "chip busy");
            buf.fill(0xFF);
            return;
        }

        match opcode {
            opcodes::WREN => self.write_enabled = true,
            opcodes::WRDI => self.write_enabled = false,
            opcodes::RDSR => {
                let status = self.status();
                buf[1..].fill(status);
                self.busy_polls = self.busy_polls.saturating_sub(1);
            }
            opcodes::RDID => {
                let id = [self.config.manufacturer, self.config.model, self.config.size_exp];
                for (i, b) in buf[1..].iter_mut().enumerate() {
                    *b = id.get(i).copied().unwrap_or(0xFF);
                }
            }
            opcodes::READ => {
                if let Some(addr) = address(buf) {
                    let size = self.data.len();
                    for (i, b) in buf[4..].iter_mut().enumerate() {
                        *b = self.data[(addr + i) % size];
                    }
                    buf[..4].fill(0xFF);
                } else {
                    self.violation(opcode, "truncated address");
                }
                return;
            }
            opcodes::PP => self.page_program(buf),
            opcodes::SE_20 => self.erase(buf, 4 * 1024),
            opcodes::BE_52 => self.erase(buf, 32 * 1024),
            opcodes::BE_D8 => self.erase(buf, 64 * 1024),
            _ => self.violation(opcode, "unsupported opcode"),
        }

        if opcode != opcodes::RDSR && opcode != opcodes::RDID {
            buf.fill(0xFF);
        } else {
            buf[0] = 0xFF;
        }
    }

    fn violation(&mut self, opcode: u8, reason: &str) {
        log::warn!("SPI NOR: ignoring command 0x{:02X}: {}", opcode, reason);
        self.violations += 1;
    }

    /// Check and consume the write enable latch
    fn take_write_enable(&mut self, opcode: u8) -> bool {
        if !self.write_enabled {
            self.violation(opcode, "write enable latch not set");
            return false;
        }
        self.write_enabled = false;
        true
    }

    fn page_program(&mut self, buf: &[u8]) {
        let Some(addr) = address(buf) else {
            self.violation(buf[0], "truncated address");
            return;
        };
        if !self.take_write_enable(buf[0]) {
            return;
        }

        let size = self.data.len();
        let page = addr & !(PAGE_SIZE - 1);
        for (i, &byte) in buf[4..].iter().enumerate() {
            let target = page + (addr + i) % PAGE_SIZE;
            // Programming can only change 1 -> 0
            self.data[target % size] &= byte;
        }
        self.busy_polls = PROGRAM_BUSY_POLLS;
    }

    fn erase(&mut self, buf: &[u8], erase_size: usize) {
        let Some(addr) = address(buf) else {
            self.violation(buf[0], "truncated address");
            return;
        };
        if !self.take_write_enable(buf[0]) {
            return;
        }

        let start = (addr & !(erase_size - 1)) % self.data.len();
        let end = (start + erase_size).min(self.data.len());
        self.data[start..end].fill(0xFF);
        self.busy_polls = ERASE_BUSY_POLLS;
    }
}

/// 24-bit address following the opcode
fn address(buf: &[u8]) -> Option<usize> {
    match buf {
        [_, a2, a1, a0, ..] => Some(u32::from_be_bytes([0, *a2, *a1, *a0]) as usize),
        _ => None,
    }
}
