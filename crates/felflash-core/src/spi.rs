//! SPI0 controller bring-up
//!
//! Routes SPI0 to its pins, gates on the module clock at 24 MHz / 4 and runs
//! the enable/reset sequence of the controller generation. All accesses go
//! through FEL register reads and writes.

use crate::error::{FelError, Result};
use crate::regs::pio_cfg_value;
use crate::soc::{ControllerRegs, EnableSequence, GpioPin, SocVariant};
use crate::transport::{BatchTransferParams, FelTransport};

/// Maximum number of GCR reads while waiting for the soft reset to finish
///
/// Each read is a USB round trip, so this bounds the wait to roughly a
/// second on real hardware.
pub const RESET_POLL_LIMIT: u32 = 1000;

/// Read-modify-write: set `bits` in the register at `addr`
fn set_bits<T: FelTransport + ?Sized>(fel: &mut T, addr: u32, bits: u32) -> Result<()> {
    let value = fel.read_register(addr)?;
    fel.write_register(addr, value | bits)
}

/// Configure the function of a GPIO pin, preserving the other pins
pub fn gpio_set_cfgpin<T: FelTransport + ?Sized>(
    fel: &mut T,
    pin: GpioPin,
    function: u32,
) -> Result<()> {
    let reg = pin.cfg_reg();
    let value = fel.read_register(reg)?;
    let value = pio_cfg_value(value, pin.pin as u32, function);
    log::trace!("{}: CFG[0x{:08X}] = 0x{:08X}", pin, reg, value);
    fel.write_register(reg, value)
}

/// Poll `addr` until `bit` reads back as zero
fn wait_bit_clear<T: FelTransport + ?Sized>(
    fel: &mut T,
    addr: u32,
    bit: u32,
    what: &'static str,
) -> Result<()> {
    for _ in 0..RESET_POLL_LIMIT {
        if fel.read_register(addr)? & bit == 0 {
            return Ok(());
        }
    }
    Err(FelError::Timeout(what))
}

/// Initialize the SPI0 controller and its pin muxing
pub fn init_spi0<T: FelTransport + ?Sized>(fel: &mut T, soc: &SocVariant) -> Result<()> {
    log::debug!(
        "Initializing SPI0 on {} (0x{:04X}, {})",
        soc.name,
        soc.soc_id,
        soc.generation
    );

    for pin in soc.pins {
        gpio_set_cfgpin(fel, *pin, soc.pinmux)?;
    }

    let regs = soc.regs();
    set_bits(fel, regs.ahb_gating, regs.ahb_gate_bit)?;

    // 24MHz from OSC24M, divided by 4
    fel.write_register(regs.module_clk, regs.module_clk_value)?;
    fel.write_register(regs.clock_ctl, regs.clock_div)?;

    match regs.enable {
        EnableSequence::SoftReset {
            bus_reset,
            bus_reset_bit,
            global_ctl,
            enable_bits,
            reset_bit,
        } => {
            set_bits(fel, bus_reset, bus_reset_bit)?;
            set_bits(fel, global_ctl, enable_bits)?;
            wait_bit_clear(fel, global_ctl, reset_bit, "SPI0 soft reset")?;
        }
        EnableSequence::ControlBits { ctl, bits } => {
            set_bits(fel, ctl, bits)?;
        }
    }

    Ok(())
}

/// Interpreter parameters for a command stream at `buf`
pub fn batch_params(regs: &ControllerRegs, buf: u32) -> BatchTransferParams {
    BatchTransferParams {
        buf,
        xfer_ctl: regs.xfer_ctl,
        xch_bit: regs.xch_bit,
        fifo_status: regs.fifo_status,
        txd: regs.txd,
        rxd: regs.rxd,
        burst_count: regs.burst_count,
        xfer_count: regs.xfer_count,
        burst_ctl: regs.burst_ctl.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::*;
    use crate::transport::SocInfo;
    use std::collections::HashMap;

    /// Register file recording every access
    struct MockRegs {
        values: HashMap<u32, u32>,
        writes: Vec<(u32, u32)>,
        /// GCR reads left before the soft reset bit clears (None = never)
        reset_reads: Option<u32>,
    }

    impl MockRegs {
        fn new() -> Self {
            Self {
                values: HashMap::new(),
                writes: Vec::new(),
                reset_reads: Some(3),
            }
        }

        fn get(&self, addr: u32) -> u32 {
            self.values.get(&addr).copied().unwrap_or(0)
        }
    }

    impl FelTransport for MockRegs {
        fn soc_info(&self) -> SocInfo {
            SocInfo {
                soc_id: 0x1680,
                spl_addr: 0,
                scratch_addr: 0x1000,
            }
        }

        fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
            let mut value = self.get(addr);
            if addr == SUN6I_SPI0_GCR && value & Sun6iGcr::SRST.bits() != 0 {
                if let Some(left) = self.reset_reads.as_mut() {
                    if *left == 0 {
                        value &= !Sun6iGcr::SRST.bits();
                        self.values.insert(addr, value);
                    } else {
                        *left -= 1;
                    }
                }
            }
            buf.copy_from_slice(&value.to_le_bytes());
            Ok(())
        }

        fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
            let value = u32::from_le_bytes(data.try_into().unwrap());
            self.values.insert(addr, value);
            self.writes.push((addr, value));
            Ok(())
        }

        fn prepare_batch_transfer(&mut self, _params: &BatchTransferParams) -> Result<u32> {
            Ok(0x1000)
        }

        fn execute_remote(&mut self, _entry: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_init_sun6i() {
        let mut regs = MockRegs::new();
        regs.values.insert(pio_cfg_reg(2, 0), 0x7777_7777);
        regs.values.insert(CCM_AHB_GATING0, 0x0000_0040);

        let h3 = SocVariant::lookup(0x1680).unwrap();
        init_spi0(&mut regs, h3).unwrap();

        assert_eq!(regs.get(pio_cfg_reg(2, 0)), 0x7777_3333);
        assert_eq!(regs.get(CCM_AHB_GATING0), 0x0010_0040);
        assert_eq!(regs.get(CCM_SPI0_CLK), 0x8000_0000);
        assert_eq!(regs.get(SUN6I_SPI0_CCTL), 0x1001);
        assert_eq!(regs.get(SUN6I_BUS_SOFT_RST_REG0), SUN6I_SPI0_RST);
        // Soft reset finished, enable + master remain
        assert_eq!(regs.get(SUN6I_SPI0_GCR), 0x3);
        // The sun4i control register is never touched
        assert!(regs.writes.iter().all(|(a, _)| *a != SUN4I_SPI0_CTL));
    }

    #[test]
    fn test_init_a64_uses_sun50i_function() {
        let mut regs = MockRegs::new();
        let a64 = SocVariant::lookup(0x1689).unwrap();
        init_spi0(&mut regs, a64).unwrap();
        assert_eq!(regs.get(pio_cfg_reg(2, 0)), 0x0000_4444);
    }

    #[test]
    fn test_init_sun4i() {
        let mut regs = MockRegs::new();
        regs.values.insert(pio_cfg_reg(2, 0), 0x7777_7777);
        regs.values.insert(pio_cfg_reg(2, 23), 0x1111_1111);

        let a20 = SocVariant::lookup(0x1651).unwrap();
        init_spi0(&mut regs, a20).unwrap();

        assert_eq!(regs.get(pio_cfg_reg(2, 0)), 0x7777_7333);
        assert_eq!(regs.get(pio_cfg_reg(2, 23)), 0x3111_1111);
        assert_eq!(regs.get(SUN4I_SPI0_CCTL), 0x1001);
        assert_eq!(regs.get(SUN4I_SPI0_CTL), 0x303);
        assert!(regs.writes.iter().all(|(a, _)| *a != SUN6I_SPI0_GCR));
        assert!(regs
            .writes
            .iter()
            .all(|(a, _)| *a != SUN6I_BUS_SOFT_RST_REG0));
    }

    #[test]
    fn test_soft_reset_timeout() {
        let mut regs = MockRegs::new();
        regs.reset_reads = None;

        let h3 = SocVariant::lookup(0x1680).unwrap();
        match init_spi0(&mut regs, h3) {
            Err(FelError::Timeout(_)) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_params() {
        let sun4i = batch_params(SocVariant::lookup(0x1623).unwrap().regs(), 0);
        assert_eq!(sun4i.xfer_ctl, SUN4I_SPI0_CTL);
        assert_eq!(sun4i.xch_bit, Sun4iCtl::XCH.bits());
        assert_eq!(sun4i.burst_ctl, 0);

        let sun6i = batch_params(SocVariant::lookup(0x1718).unwrap().regs(), 0x10000);
        assert_eq!(sun6i.buf, 0x10000);
        assert_eq!(sun6i.txd, SUN6I_SPI0_TXD);
        assert_eq!(sun6i.rxd, SUN6I_SPI0_RXD);
        assert_eq!(sun6i.burst_ctl, SUN6I_SPI0_BCC);
    }
}
