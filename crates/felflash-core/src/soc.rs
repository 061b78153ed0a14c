//! SoC variants and SPI0 controller register profiles
//!
//! Each supported SoC maps to a controller generation, the pin function that
//! routes SPI0 to its pins, and the list of pins to configure. The register
//! map is resolved once per generation so the initializer and the batch
//! interpreter parameters never branch on the SoC again.

use std::fmt;

use crate::error::{FelError, Result};
use crate::regs::*;

/// SPI controller generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// A10/A13/A20 style controller (single control register)
    Sun4i,
    /// H3/H5/A64 style controller (GCR/TCR split, bus soft reset)
    Sun6i,
}

impl Generation {
    /// Register map of this generation
    pub fn regs(self) -> &'static ControllerRegs {
        match self {
            Generation::Sun4i => &SUN4I_REGS,
            Generation::Sun6i => &SUN6I_REGS,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Sun4i => write!(f, "sun4i"),
            Generation::Sun6i => write!(f, "sun6i"),
        }
    }
}

/// How a controller generation is brought out of reset and enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableSequence {
    /// Deassert the bus reset, then request a soft reset in the global
    /// control register and poll until the hardware clears it
    SoftReset {
        /// Bus soft reset register
        bus_reset: u32,
        /// SPI0 bit in `bus_reset`
        bus_reset_bit: u32,
        /// Global control register
        global_ctl: u32,
        /// Bits to set in `global_ctl` (enable, master, soft reset)
        enable_bits: u32,
        /// Self-clearing soft reset bit
        reset_bit: u32,
    },
    /// Set enable, master and FIFO reset bits in the control register
    ControlBits {
        /// Control register
        ctl: u32,
        /// Bits to set
        bits: u32,
    },
}

/// SPI0 register map of one controller generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerRegs {
    /// AHB clock gating register
    pub ahb_gating: u32,
    /// SPI0 bit in `ahb_gating`
    pub ahb_gate_bit: u32,
    /// SPI0 module clock register
    pub module_clk: u32,
    /// Value selecting OSC24M and enabling the module clock
    pub module_clk_value: u32,
    /// SPI clock control (divider) register
    pub clock_ctl: u32,
    /// Divider value (24 MHz / 4)
    pub clock_div: u32,
    /// Register holding the XCH bit
    pub xfer_ctl: u32,
    /// Start-exchange bit in `xfer_ctl`
    pub xch_bit: u32,
    /// FIFO status register
    pub fifo_status: u32,
    /// Burst counter register
    pub burst_count: u32,
    /// Transfer counter register
    pub xfer_count: u32,
    /// Burst control register, if the generation has one
    pub burst_ctl: Option<u32>,
    /// TX data register
    pub txd: u32,
    /// RX data register
    pub rxd: u32,
    /// Enable/reset sequence
    pub enable: EnableSequence,
}

/// sun4i SPI0 registers
pub static SUN4I_REGS: ControllerRegs = ControllerRegs {
    ahb_gating: CCM_AHB_GATING0,
    ahb_gate_bit: CCM_AHB_GATE_SPI0,
    module_clk: CCM_SPI0_CLK,
    module_clk_value: CCM_SPI0_CLK_OSC24M,
    clock_ctl: SUN4I_SPI0_CCTL,
    clock_div: SPI_CLK_DIV_BY_4,
    xfer_ctl: SUN4I_SPI0_CTL,
    xch_bit: Sun4iCtl::XCH.bits(),
    fifo_status: SUN4I_SPI0_FIFO_STA,
    burst_count: SUN4I_SPI0_BC,
    xfer_count: SUN4I_SPI0_TC,
    burst_ctl: None,
    txd: SUN4I_SPI0_TX,
    rxd: SUN4I_SPI0_RX,
    enable: EnableSequence::ControlBits {
        ctl: SUN4I_SPI0_CTL,
        bits: Sun4iCtl::MASTER
            .union(Sun4iCtl::ENABLE)
            .union(Sun4iCtl::TF_RST)
            .union(Sun4iCtl::RF_RST)
            .bits(),
    },
};

/// sun6i SPI0 registers
pub static SUN6I_REGS: ControllerRegs = ControllerRegs {
    ahb_gating: CCM_AHB_GATING0,
    ahb_gate_bit: CCM_AHB_GATE_SPI0,
    module_clk: CCM_SPI0_CLK,
    module_clk_value: CCM_SPI0_CLK_OSC24M,
    clock_ctl: SUN6I_SPI0_CCTL,
    clock_div: SPI_CLK_DIV_BY_4,
    xfer_ctl: SUN6I_SPI0_TCR,
    xch_bit: Sun6iTcr::XCH.bits(),
    fifo_status: SUN6I_SPI0_FIFO_STA,
    burst_count: SUN6I_SPI0_MBC,
    xfer_count: SUN6I_SPI0_MTC,
    burst_ctl: Some(SUN6I_SPI0_BCC),
    txd: SUN6I_SPI0_TXD,
    rxd: SUN6I_SPI0_RXD,
    enable: EnableSequence::SoftReset {
        bus_reset: SUN6I_BUS_SOFT_RST_REG0,
        bus_reset_bit: SUN6I_SPI0_RST,
        global_ctl: SUN6I_SPI0_GCR,
        enable_bits: Sun6iGcr::SRST
            .union(Sun6iGcr::MASTER)
            .union(Sun6iGcr::ENABLE)
            .bits(),
        reset_bit: Sun6iGcr::SRST.bits(),
    },
};

/// GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Port A
    PA = 0,
    /// Port B
    PB = 1,
    /// Port C
    PC = 2,
}

/// A GPIO pin coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin {
    /// Port
    pub port: Port,
    /// Pin index within the port
    pub pin: u8,
}

impl GpioPin {
    const fn pc(pin: u8) -> Self {
        Self { port: Port::PC, pin }
    }

    /// Address of the CFG register holding this pin's function
    pub fn cfg_reg(&self) -> u32 {
        pio_cfg_reg(self.port as u32, self.pin as u32)
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.port, self.pin)
    }
}

/// sunxi SPI0 function on port C
pub const SUNXI_GPC_SPI0: u32 = 3;
/// sun50i SPI0 function on port C
pub const SUN50I_GPC_SPI0: u32 = 4;

const PINS_PC0_2_23: &[GpioPin] = &[
    GpioPin::pc(0),
    GpioPin::pc(1),
    GpioPin::pc(2),
    GpioPin::pc(23),
];
const PINS_PC0_3: &[GpioPin] = &[
    GpioPin::pc(0),
    GpioPin::pc(1),
    GpioPin::pc(2),
    GpioPin::pc(3),
];

/// A SoC with a known SPI0 setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocVariant {
    /// SoC identifier reported by the boot ROM
    pub soc_id: u32,
    /// Marketing name
    pub name: &'static str,
    /// SPI controller generation
    pub generation: Generation,
    /// Pin function routing SPI0 to the pins
    pub pinmux: u32,
    /// Pins carrying CLK, MOSI, MISO and CS0
    pub pins: &'static [GpioPin],
}

/// All SoCs with SPI flash support
pub static SOC_VARIANTS: &[SocVariant] = &[
    SocVariant {
        soc_id: 0x1623,
        name: "A10",
        generation: Generation::Sun4i,
        pinmux: SUNXI_GPC_SPI0,
        pins: PINS_PC0_2_23,
    },
    SocVariant {
        soc_id: 0x1625,
        name: "A13",
        generation: Generation::Sun4i,
        pinmux: SUNXI_GPC_SPI0,
        pins: PINS_PC0_3,
    },
    SocVariant {
        soc_id: 0x1651,
        name: "A20",
        generation: Generation::Sun4i,
        pinmux: SUNXI_GPC_SPI0,
        pins: PINS_PC0_2_23,
    },
    SocVariant {
        soc_id: 0x1680,
        name: "H3",
        generation: Generation::Sun6i,
        pinmux: SUNXI_GPC_SPI0,
        pins: PINS_PC0_3,
    },
    SocVariant {
        soc_id: 0x1689,
        name: "A64",
        generation: Generation::Sun6i,
        pinmux: SUN50I_GPC_SPI0,
        pins: PINS_PC0_3,
    },
    SocVariant {
        soc_id: 0x1718,
        name: "H5",
        generation: Generation::Sun6i,
        pinmux: SUNXI_GPC_SPI0,
        pins: PINS_PC0_3,
    },
];

impl SocVariant {
    /// Look up the SPI0 profile of a SoC
    pub fn lookup(soc_id: u32) -> Result<&'static SocVariant> {
        SOC_VARIANTS
            .iter()
            .find(|v| v.soc_id == soc_id)
            .ok_or(FelError::UnsupportedDevice(soc_id))
    }

    /// SPI0 register map of this SoC
    pub fn regs(&self) -> &'static ControllerRegs {
        self.generation.regs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_all_variants() {
        let expected = [
            (0x1623, Generation::Sun4i, 3, 23),
            (0x1625, Generation::Sun4i, 3, 3),
            (0x1651, Generation::Sun4i, 3, 23),
            (0x1680, Generation::Sun6i, 3, 3),
            (0x1689, Generation::Sun6i, 4, 3),
            (0x1718, Generation::Sun6i, 3, 3),
        ];

        for (id, generation, mux, last_pin) in expected {
            let v = SocVariant::lookup(id).unwrap();
            assert_eq!(v.generation, generation, "SoC 0x{:04X}", id);
            assert_eq!(v.pinmux, mux, "SoC 0x{:04X}", id);
            assert_eq!(v.pins.len(), 4);
            assert_eq!(v.pins[3].pin, last_pin);
            assert!(v.pins.iter().all(|p| p.port == Port::PC));
        }
    }

    #[test]
    fn test_lookup_unsupported() {
        // A31 and A33 are FEL capable but have no SPI flash profile
        for id in [0x1633, 0x1667, 0x0000, 0xFFFF] {
            match SocVariant::lookup(id) {
                Err(FelError::UnsupportedDevice(got)) => assert_eq!(got, id),
                other => panic!("expected UnsupportedDevice, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_pin_cfg_registers() {
        let a20 = SocVariant::lookup(0x1651).unwrap();
        let regs: Vec<u32> = a20.pins.iter().map(|p| p.cfg_reg()).collect();
        assert_eq!(regs, [0x01C2_0848, 0x01C2_0848, 0x01C2_0848, 0x01C2_0850]);
    }

    #[test]
    fn test_generation_regs() {
        let sun4i = Generation::Sun4i.regs();
        assert_eq!(sun4i.xfer_ctl, 0x01C0_5008);
        assert_eq!(sun4i.xch_bit, 1 << 10);
        assert_eq!(sun4i.burst_ctl, None);
        assert_eq!(
            sun4i.enable,
            EnableSequence::ControlBits {
                ctl: 0x01C0_5008,
                bits: 0x303,
            }
        );

        let sun6i = Generation::Sun6i.regs();
        assert_eq!(sun6i.xfer_ctl, 0x01C6_8008);
        assert_eq!(sun6i.xch_bit, 1 << 31);
        assert_eq!(sun6i.burst_ctl, Some(0x01C6_8038));
        assert_eq!(sun6i.clock_ctl, 0x01C6_8024);
        match sun6i.enable {
            EnableSequence::SoftReset {
                enable_bits,
                reset_bit,
                ..
            } => {
                assert_eq!(enable_bits, 0x8000_0003);
                assert_eq!(reset_bit, 0x8000_0000);
            }
            other => panic!("unexpected sequence {:?}", other),
        }
    }
}
