//! felflash-emu - Emulated sunxi FEL target for testing
//!
//! This crate provides an in-memory FEL device: SRAM, the CCM/GPIO/SPI0
//! registers the SPI initializer touches, the remote SPI batch interpreter
//! and a SPI NOR chip on SPI0. It implements [`FelTransport`], so the real
//! flash pipelines can run against it without hardware.

pub mod chip;

use std::collections::HashMap;

use felflash_core::batch::{next_frame, Frame};
use felflash_core::regs::{
    Sun4iCtl, Sun6iGcr, PIO_BASE, PIO_PORT_STRIDE, SUN4I_SPI0_CTL, SUN6I_SPI0_GCR,
};
use felflash_core::soc::{EnableSequence, SocVariant};
use felflash_core::{BatchTransferParams, FelError, FelTransport, Result, SocInfo};

pub use chip::{FlashConfig, SpiNorChip};

/// Status polls the interpreter issues before giving up on a busy flash
///
/// The real interpreter spins forever; on the host that shows up as a USB
/// timeout, which is what the emulator reports.
pub const WAIT_POLL_LIMIT: u32 = 10_000;

/// Pattern written to the scratch area when the interpreter is uploaded
const INTERPRETER_STUB: [u8; 4] = [0x1E, 0xFF, 0x2F, 0xE1];

/// Number of GPIO ports with CFG registers
const PIO_PORTS: u32 = 9;
/// Reset value of the GPIO CFG registers (all pins disabled)
const PIO_CFG_RESET: u32 = 0x7777_7777;

/// Static SRAM layout of a SoC
struct SramLayout {
    soc_id: u32,
    spl_addr: u32,
    scratch_addr: u32,
    sram_size: u32,
}

const fn layout(soc_id: u32, spl_addr: u32, scratch_addr: u32, sram_size: u32) -> SramLayout {
    SramLayout {
        soc_id,
        spl_addr,
        scratch_addr,
        sram_size,
    }
}

const SRAM_LAYOUTS: &[SramLayout] = &[
    layout(0x1623, 0x0, 0x1000, 0xC000),
    layout(0x1625, 0x0, 0x1000, 0xC000),
    layout(0x1651, 0x0, 0x1000, 0xC000),
    layout(0x1680, 0x0, 0x1000, 0x10000),
    layout(0x1689, 0x10000, 0x11000, 0x50000),
    layout(0x1718, 0x10000, 0x11000, 0x50000),
];

/// Configuration of the emulated target
#[derive(Debug, Clone)]
pub struct EmuConfig {
    /// SoC ID reported to the host
    pub soc_id: u32,
    /// SPL load address (start of the staging area)
    pub spl_addr: u32,
    /// Scratch code address (end of the staging area)
    pub scratch_addr: u32,
    /// SRAM size, mapped at address 0
    pub sram_size: u32,
    /// SPI NOR chip on SPI0, `None` for an empty bus
    pub flash: Option<FlashConfig>,
    /// GCR reads until the sun6i soft reset completes, `None` to hang
    pub reset_polls: Option<u32>,
    /// Number of remote executions that succeed before every further one
    /// fails, `None` to never fail
    pub fail_after_executes: Option<usize>,
}

impl Default for EmuConfig {
    fn default() -> Self {
        // H3
        Self::from_layout(&SRAM_LAYOUTS[3])
    }
}

impl EmuConfig {
    /// Configuration with the SRAM layout of a supported SoC
    pub fn for_soc(soc_id: u32) -> Option<Self> {
        SRAM_LAYOUTS
            .iter()
            .find(|l| l.soc_id == soc_id)
            .map(Self::from_layout)
    }

    fn from_layout(layout: &SramLayout) -> Self {
        Self {
            soc_id: layout.soc_id,
            spl_addr: layout.spl_addr,
            scratch_addr: layout.scratch_addr,
            sram_size: layout.sram_size,
            flash: Some(FlashConfig::default()),
            reset_polls: Some(2),
            fail_after_executes: None,
        }
    }
}

/// One bus event seen by the interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// SPI transaction, with the bytes sent on MOSI
    Transfer(Vec<u8>),
    /// Wait for the flash to become idle
    Wait,
}

/// In-memory FEL device
pub struct EmulatedTarget {
    config: EmuConfig,
    sram: Vec<u8>,
    regs: HashMap<u32, u32>,
    chip: Option<SpiNorChip>,
    params: Option<BatchTransferParams>,
    reset_reads: u32,
    accesses: usize,
    executes: usize,
    bus_log: Vec<BusEvent>,
}

impl EmulatedTarget {
    /// Create a target with an erased flash
    pub fn new(config: EmuConfig) -> Self {
        let chip = config.flash.map(SpiNorChip::new);
        Self::with_chip(config, chip)
    }

    /// Create a target whose flash starts with `image`
    pub fn with_flash_data(config: EmuConfig, image: &[u8]) -> Self {
        let chip = config.flash.map(|f| SpiNorChip::with_data(f, image));
        Self::with_chip(config, chip)
    }

    fn with_chip(config: EmuConfig, chip: Option<SpiNorChip>) -> Self {
        // Boot ROM leftovers, so a missing restore is visible
        let sram = (0..config.sram_size as usize)
            .map(|i| (i as u8).wrapping_mul(13))
            .collect();
        Self {
            config,
            sram,
            regs: HashMap::new(),
            chip,
            params: None,
            reset_reads: 0,
            accesses: 0,
            executes: 0,
            bus_log: Vec::new(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// SRAM contents
    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    /// Flash contents, if a chip is present
    pub fn flash_data(&self) -> Option<&[u8]> {
        self.chip.as_ref().map(|c| c.data())
    }

    /// Flash chip, if present
    pub fn chip(&self) -> Option<&SpiNorChip> {
        self.chip.as_ref()
    }

    /// Current value of a register
    pub fn register(&self, addr: u32) -> u32 {
        self.regs
            .get(&addr)
            .copied()
            .unwrap_or_else(|| register_reset_value(addr))
    }

    /// Memory reads and writes issued by the host
    pub fn accesses(&self) -> usize {
        self.accesses
    }

    /// Remote executions requested by the host
    pub fn executes(&self) -> usize {
        self.executes
    }

    /// Commands the flash ignored
    pub fn violations(&self) -> usize {
        self.chip.as_ref().map_or(0, |c| c.violations())
    }

    /// Every SPI transaction and wait executed so far
    pub fn bus_log(&self) -> &[BusEvent] {
        &self.bus_log
    }

    /// Forget the recorded bus events
    pub fn clear_bus_log(&mut self) {
        self.bus_log.clear();
    }

    fn sram_range(&self, addr: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len)?;
        (end <= self.sram.len()).then_some(start..end)
    }

    fn read_reg(&mut self, addr: u32) -> u32 {
        let mut value = self.register(addr);
        if addr == SUN6I_SPI0_GCR && value & Sun6iGcr::SRST.bits() != 0 {
            if let Some(polls) = self.config.reset_polls {
                self.reset_reads += 1;
                if self.reset_reads > polls {
                    value &= !Sun6iGcr::SRST.bits();
                    self.regs.insert(addr, value);
                }
            }
        }
        value
    }

    fn write_reg(&mut self, addr: u32, mut value: u32) {
        match addr {
            SUN6I_SPI0_GCR if value & Sun6iGcr::SRST.bits() != 0 => self.reset_reads = 0,
            SUN4I_SPI0_CTL => {
                // FIFO resets complete immediately
                value &= !(Sun4iCtl::TF_RST | Sun4iCtl::RF_RST).bits();
            }
            _ => {}
        }
        log::trace!("emu: REG[0x{:08X}] = 0x{:08X}", addr, value);
        self.regs.insert(addr, value);
    }

    /// Check that SPI0 was brought up the way the interpreter expects
    fn check_controller(&self, params: &BatchTransferParams) -> Result<()> {
        let soc = SocVariant::lookup(self.config.soc_id)
            .map_err(|_| FelError::TransportFailure("SoC has no SPI0 controller".into()))?;
        let regs = soc.regs();

        let fail = |what: &str| Err(FelError::TransportFailure(format!("SPI0 {}", what)));

        if params.xfer_ctl != regs.xfer_ctl || params.xch_bit != regs.xch_bit {
            return fail("interpreter configured for the wrong controller");
        }
        for pin in soc.pins {
            let shift = (pin.pin as u32 % 8) * 4;
            if (self.register(pin.cfg_reg()) >> shift) & 0xF != soc.pinmux {
                return fail("pins not muxed");
            }
        }
        if self.register(regs.ahb_gating) & regs.ahb_gate_bit == 0 {
            return fail("AHB clock gated");
        }
        if self.register(regs.module_clk) & (1 << 31) == 0 {
            return fail("module clock disabled");
        }
        match regs.enable {
            EnableSequence::SoftReset {
                bus_reset,
                bus_reset_bit,
                global_ctl,
                enable_bits,
                reset_bit,
            } => {
                let gcr = self.register(global_ctl);
                if self.register(bus_reset) & bus_reset_bit == 0
                    || gcr & (enable_bits & !reset_bit) != enable_bits & !reset_bit
                    || gcr & reset_bit != 0
                {
                    return fail("controller not enabled");
                }
            }
            EnableSequence::ControlBits { ctl, .. } => {
                let want = (Sun4iCtl::ENABLE | Sun4iCtl::MASTER).bits();
                if self.register(ctl) & want != want {
                    return fail("controller not enabled");
                }
            }
        }
        Ok(())
    }

    /// Interpret the batch in the staging buffer
    fn run_batch(&mut self, params: &BatchTransferParams) -> Result<()> {
        let base = params.buf as usize;
        let end = self.config.scratch_addr as usize;
        if base >= end || end > self.sram.len() {
            return Err(FelError::TransportFailure(
                "batch buffer outside the staging area".into(),
            ));
        }

        let mut pos = 0;
        loop {
            let (frame, next) = next_frame(&self.sram[base..end], pos).map_err(|e| {
                FelError::TransportFailure(format!("interpreter crashed: {}", e))
            })?;

            match frame {
                Frame::End => break,
                Frame::Wait => {
                    self.bus_log.push(BusEvent::Wait);
                    self.wait_idle()?;
                }
                Frame::Transfer(range) => {
                    let bytes = &mut self.sram[base + range.start..base + range.end];
                    self.bus_log.push(BusEvent::Transfer(bytes.to_vec()));
                    match self.chip.as_mut() {
                        Some(chip) => chip.transfer(bytes),
                        None => bytes.fill(0xFF),
                    }
                }
            }
            pos = next;
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        if let Some(chip) = self.chip.as_mut() {
            for _ in 0..WAIT_POLL_LIMIT {
                let mut status = [chip::opcodes::RDSR, 0];
                chip.transfer(&mut status);
                if status[1] & chip::STATUS_BUSY == 0 {
                    return Ok(());
                }
            }
        }
        Err(FelError::TransportFailure(
            "timeout waiting for remote function".into(),
        ))
    }
}

/// Value of a register nobody has written yet
fn register_reset_value(addr: u32) -> u32 {
    let pio_end = PIO_BASE + PIO_PORTS * PIO_PORT_STRIDE;
    if (PIO_BASE..pio_end).contains(&addr) && (addr - PIO_BASE) % PIO_PORT_STRIDE < 0x10 {
        PIO_CFG_RESET
    } else {
        0
    }
}

impl FelTransport for EmulatedTarget {
    fn soc_info(&self) -> SocInfo {
        SocInfo {
            soc_id: self.config.soc_id,
            spl_addr: self.config.spl_addr,
            scratch_addr: self.config.scratch_addr,
        }
    }

    fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.accesses += 1;
        if let Some(range) = self.sram_range(addr, buf.len()) {
            buf.copy_from_slice(&self.sram[range]);
            return Ok(());
        }
        if buf.len() == 4 && addr % 4 == 0 {
            let value = self.read_reg(addr);
            buf.copy_from_slice(&value.to_le_bytes());
            return Ok(());
        }
        Err(FelError::TransportFailure(format!(
            "read of {} bytes at unmapped address 0x{:08X}",
            buf.len(),
            addr
        )))
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.accesses += 1;
        if let Some(range) = self.sram_range(addr, data.len()) {
            self.sram[range].copy_from_slice(data);
            return Ok(());
        }
        if let (Ok(word), 0) = (<[u8; 4]>::try_from(data), addr % 4) {
            self.write_reg(addr, u32::from_le_bytes(word));
            return Ok(());
        }
        Err(FelError::TransportFailure(format!(
            "write of {} bytes at unmapped address 0x{:08X}",
            data.len(),
            addr
        )))
    }

    fn prepare_batch_transfer(&mut self, params: &BatchTransferParams) -> Result<u32> {
        let entry = self.config.scratch_addr;
        let range = self
            .sram_range(entry, INTERPRETER_STUB.len())
            .ok_or_else(|| FelError::TransportFailure("scratch area outside SRAM".into()))?;
        self.sram[range].copy_from_slice(&INTERPRETER_STUB);
        self.params = Some(*params);
        log::debug!("emu: interpreter uploaded to 0x{:08X}", entry);
        Ok(entry)
    }

    fn execute_remote(&mut self, entry: u32) -> Result<()> {
        if let Some(limit) = self.config.fail_after_executes {
            if self.executes >= limit {
                return Err(FelError::TransportFailure("USB transfer failed".into()));
            }
        }
        self.executes += 1;

        let params = match self.params {
            Some(p) if entry == self.config.scratch_addr => p,
            _ => {
                return Err(FelError::TransportFailure(format!(
                    "no code uploaded at 0x{:08X}",
                    entry
                )))
            }
        };
        self.check_controller(&params)?;
        self.run_batch(&params)
    }
}
