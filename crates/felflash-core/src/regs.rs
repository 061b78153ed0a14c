//! sunxi CCM, GPIO and SPI0 register definitions
//!
//! Addresses and bit definitions for the two SPI controller generations
//! found on FEL-capable Allwinner SoCs.
//!
//! # Register Layout by Generation
//!
//! - sun4i (A10/A13/A20): SPI0 at 0x01C05000, a single control register
//!   carries enable, master mode, FIFO resets and the XCH bit.
//! - sun6i (H3/H5/A64): SPI0 at 0x01C68000, separate global control and
//!   transfer control registers, bus soft reset in the CCM.

use bitflags::bitflags;

// ============================================================================
// GPIO
// ============================================================================

/// Base of the PIO controller
pub const PIO_BASE: u32 = 0x01C2_0800;
/// Distance between two port register banks
pub const PIO_PORT_STRIDE: u32 = 0x24;
/// Width of a pin function field in the CFG registers
pub const PIO_CFG_FIELD_BITS: u32 = 4;
/// Pins per CFG register
pub const PIO_PINS_PER_CFG: u32 = 8;

// ============================================================================
// CCM (clock control module)
// ============================================================================

/// Base of the clock control module
pub const CCM_BASE: u32 = 0x01C2_0000;
/// AHB clock gating register 0
pub const CCM_AHB_GATING0: u32 = CCM_BASE + 0x60;
/// SPI0 gate bit in AHB gating register 0
pub const CCM_AHB_GATE_SPI0: u32 = 1 << 20;
/// SPI0 module clock register
pub const CCM_SPI0_CLK: u32 = CCM_BASE + 0xA0;
/// SPI0 module clock: gate on, OSC24M source
pub const CCM_SPI0_CLK_OSC24M: u32 = 1 << 31;
/// sun6i bus soft reset register 0
pub const SUN6I_BUS_SOFT_RST_REG0: u32 = CCM_BASE + 0x2C0;
/// SPI0 reset bit in bus soft reset register 0 (1 = deasserted)
pub const SUN6I_SPI0_RST: u32 = 1 << 20;

/// SPI clock control value for 24 MHz / 4
///
/// DRS selects CDR2, CDR2 = 1 gives a divider of 2 * (1 + 1). Both
/// generations use the same encoding.
pub const SPI_CLK_DIV_BY_4: u32 = 0x1001;

// ============================================================================
// sun4i SPI0
// ============================================================================

/// sun4i SPI0 base
pub const SUN4I_SPI0_BASE: u32 = 0x01C0_5000;
/// RX data register
pub const SUN4I_SPI0_RX: u32 = SUN4I_SPI0_BASE + 0x00;
/// TX data register
pub const SUN4I_SPI0_TX: u32 = SUN4I_SPI0_BASE + 0x04;
/// Control register
pub const SUN4I_SPI0_CTL: u32 = SUN4I_SPI0_BASE + 0x08;
/// Clock control register
pub const SUN4I_SPI0_CCTL: u32 = SUN4I_SPI0_BASE + 0x1C;
/// Burst counter
pub const SUN4I_SPI0_BC: u32 = SUN4I_SPI0_BASE + 0x20;
/// Transmit counter
pub const SUN4I_SPI0_TC: u32 = SUN4I_SPI0_BASE + 0x24;
/// FIFO status register
pub const SUN4I_SPI0_FIFO_STA: u32 = SUN4I_SPI0_BASE + 0x28;

bitflags! {
    /// sun4i SPI control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sun4iCtl: u32 {
        /// Controller enable
        const ENABLE = 1 << 0;
        /// Master mode
        const MASTER = 1 << 1;
        /// TX FIFO reset (self-clearing)
        const TF_RST = 1 << 8;
        /// RX FIFO reset (self-clearing)
        const RF_RST = 1 << 9;
        /// Start burst exchange
        const XCH = 1 << 10;
    }
}

// ============================================================================
// sun6i SPI0
// ============================================================================

/// sun6i SPI0 base
pub const SUN6I_SPI0_BASE: u32 = 0x01C6_8000;
/// Global control register
pub const SUN6I_SPI0_GCR: u32 = SUN6I_SPI0_BASE + 0x04;
/// Transfer control register
pub const SUN6I_SPI0_TCR: u32 = SUN6I_SPI0_BASE + 0x08;
/// FIFO status register
pub const SUN6I_SPI0_FIFO_STA: u32 = SUN6I_SPI0_BASE + 0x1C;
/// Clock control register
pub const SUN6I_SPI0_CCTL: u32 = SUN6I_SPI0_BASE + 0x24;
/// Master burst counter
pub const SUN6I_SPI0_MBC: u32 = SUN6I_SPI0_BASE + 0x30;
/// Master transmit counter
pub const SUN6I_SPI0_MTC: u32 = SUN6I_SPI0_BASE + 0x34;
/// Master burst control counter
pub const SUN6I_SPI0_BCC: u32 = SUN6I_SPI0_BASE + 0x38;
/// TX data register
pub const SUN6I_SPI0_TXD: u32 = SUN6I_SPI0_BASE + 0x200;
/// RX data register
pub const SUN6I_SPI0_RXD: u32 = SUN6I_SPI0_BASE + 0x300;

bitflags! {
    /// sun6i SPI global control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sun6iGcr: u32 {
        /// Controller enable
        const ENABLE = 1 << 0;
        /// Master mode
        const MASTER = 1 << 1;
        /// Soft reset, cleared by hardware when done
        const SRST = 1 << 31;
    }
}

bitflags! {
    /// sun6i SPI transfer control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sun6iTcr: u32 {
        /// Start burst exchange
        const XCH = 1 << 31;
    }
}

/// Address of the CFG register holding the function of `pin` on `port`
pub fn pio_cfg_reg(port: u32, pin: u32) -> u32 {
    PIO_BASE + port * PIO_PORT_STRIDE + 4 * (pin / PIO_PINS_PER_CFG)
}

/// Replace the function field of `pin` in a CFG register value
pub fn pio_cfg_value(current: u32, pin: u32, function: u32) -> u32 {
    let shift = (pin % PIO_PINS_PER_CFG) * PIO_CFG_FIELD_BITS;
    let mask = ((1 << PIO_CFG_FIELD_BITS) - 1) << shift;
    (current & !mask) | ((function << shift) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pio_cfg_reg() {
        // PC0..PC7 live in PC_CFG0, PC23 in PC_CFG2
        assert_eq!(pio_cfg_reg(2, 0), 0x01C2_0848);
        assert_eq!(pio_cfg_reg(2, 3), 0x01C2_0848);
        assert_eq!(pio_cfg_reg(2, 23), 0x01C2_0850);
        assert_eq!(pio_cfg_reg(0, 8), 0x01C2_0804);
    }

    #[test]
    fn test_pio_cfg_value_preserves_other_pins() {
        assert_eq!(pio_cfg_value(0x7777_7777, 0, 3), 0x7777_7773);
        assert_eq!(pio_cfg_value(0x7777_7777, 3, 4), 0x7777_4777);
        assert_eq!(pio_cfg_value(0x7777_7777, 23, 3), 0x3777_7777);
        assert_eq!(pio_cfg_value(0xFFFF_FFFF, 1, 0), 0xFFFF_FF0F);
    }
}
