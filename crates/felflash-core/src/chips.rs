//! Flash device profiles
//!
//! A profile carries the opcodes and unit sizes the write pipeline needs.
//! Profiles are keyed by the first two JEDEC ID bytes. The built-in table
//! can be extended with RON definitions of the form:
//!
//! ```ron
//! [
//!     (
//!         vendor: "Macronix",
//!         manufacturer_id: 0xC2,
//!         chips: [
//!             (
//!                 name: "MX25L",
//!                 model: 0x20,
//!                 large_erase: (opcode: 0xD8, size: KiB(64)),
//!                 small_erase: (opcode: 0x20, size: KiB(4)),
//!             ),
//!         ],
//!     ),
//! ]
//! ```
//!
//! `write_enable`, `program_opcode` and `program_size` default to `0x06`,
//! `0x02` and 256.

use std::fmt;

use serde::Deserialize;

use crate::batch::opcodes;
use crate::error::{FelError, Result};

/// JEDEC manufacturer ID of Winbond
pub const WINBOND: u8 = 0xEF;

/// An erase command and the size of the unit it erases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseOp {
    /// Erase opcode
    pub opcode: u8,
    /// Erase unit size in bytes
    pub size: u32,
}

/// Command set and geometry of a flash device family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashProfile {
    /// `(manufacturer << 8) | model`
    pub id: u16,
    /// Vendor name
    pub vendor: String,
    /// Family or part name
    pub name: String,
    /// Write Enable opcode
    pub write_enable: u8,
    /// Largest erase unit
    pub large_erase: EraseOp,
    /// Smallest erase unit (write alignment)
    pub small_erase: EraseOp,
    /// Page Program opcode
    pub program_opcode: u8,
    /// Page size in bytes
    pub program_size: u32,
}

impl FlashProfile {
    /// Profile used when the device is not in the table
    pub fn unknown() -> Self {
        Self {
            id: 0,
            vendor: "Unknown".into(),
            name: "Unknown".into(),
            write_enable: opcodes::WREN,
            large_erase: EraseOp {
                opcode: 0xD8,
                size: 64 * 1024,
            },
            small_erase: EraseOp {
                opcode: 0x20,
                size: 4 * 1024,
            },
            program_opcode: 0x02,
            program_size: 256,
        }
    }

    /// JEDEC manufacturer ID
    pub fn manufacturer(&self) -> u8 {
        (self.id >> 8) as u8
    }

    /// JEDEC memory type byte
    pub fn model(&self) -> u8 {
        self.id as u8
    }

    /// Check unit sizes for consistency
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(FelError::ProfileTable(format!("{}: {}", self.name, msg)));

        if self.large_erase.size == 0 || self.small_erase.size == 0 || self.program_size == 0 {
            return fail("erase and program sizes must be non-zero");
        }
        if self.large_erase.size % self.small_erase.size != 0 {
            return fail("large erase size must be a multiple of the small erase size");
        }
        if self.small_erase.size % self.program_size != 0 {
            return fail("small erase size must be a multiple of the program size");
        }
        Ok(())
    }
}

impl fmt::Display for FlashProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.vendor, self.name)
    }
}

/// JEDEC identification returned by the Read ID command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlashId {
    /// Manufacturer ID
    pub manufacturer: u8,
    /// Memory type
    pub model: u8,
    /// Capacity as a power of two
    pub size_exp: u8,
}

impl FlashId {
    /// Interpret the three Read ID response bytes
    ///
    /// Returns `None` if the capacity byte is `0x00` or `0xFF`, which is
    /// what a floating or pulled MISO line reads as.
    pub fn from_response(bytes: [u8; 3]) -> Option<Self> {
        let [manufacturer, model, size_exp] = bytes;
        match size_exp {
            0x00 | 0xFF => None,
            _ => Some(Self {
                manufacturer,
                model,
                size_exp,
            }),
        }
    }

    /// Profile table key
    pub fn jedec_id(&self) -> u16 {
        u16::from_be_bytes([self.manufacturer, self.model])
    }

    /// Capacity in bytes, if it fits in 64 bits
    pub fn size(&self) -> Option<u64> {
        1u64.checked_shl(self.size_exp as u32)
    }
}

impl fmt::Display for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X}",
            self.manufacturer, self.model, self.size_exp
        )
    }
}

// ============================================================================
// RON definitions
// ============================================================================

/// Size with human-readable units
#[derive(Debug, Clone, Copy, Deserialize)]
enum Size {
    B(u32),
    KiB(u32),
    MiB(u32),
}

impl Size {
    fn to_bytes(self) -> Result<u32> {
        let bytes = match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
            Size::MiB(n) => n.checked_mul(1024 * 1024),
        };
        bytes.ok_or_else(|| FelError::ProfileTable(format!("size {:?} overflows", self)))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct EraseDef {
    opcode: u8,
    size: Size,
}

impl TryFrom<EraseDef> for EraseOp {
    type Error = FelError;

    fn try_from(def: EraseDef) -> Result<Self> {
        Ok(EraseOp {
            opcode: def.opcode,
            size: def.size.to_bytes()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChipDef {
    name: String,
    model: u8,
    #[serde(default = "default_write_enable")]
    write_enable: u8,
    large_erase: EraseDef,
    small_erase: EraseDef,
    #[serde(default = "default_program_opcode")]
    program_opcode: u8,
    #[serde(default = "default_program_size")]
    program_size: Size,
}

fn default_write_enable() -> u8 {
    opcodes::WREN
}

fn default_program_opcode() -> u8 {
    0x02
}

fn default_program_size() -> Size {
    Size::B(256)
}

#[derive(Debug, Clone, Deserialize)]
struct VendorDef {
    vendor: String,
    manufacturer_id: u8,
    chips: Vec<ChipDef>,
}

// ============================================================================
// Profile table
// ============================================================================

/// Lookup table of flash profiles
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: Vec<FlashProfile>,
    default: FlashProfile,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileTable {
    /// Table with the built-in profiles
    pub fn builtin() -> Self {
        Self {
            profiles: vec![FlashProfile {
                id: u16::from_be_bytes([WINBOND, 0x40]),
                vendor: "Winbond".into(),
                name: "W25Qxx".into(),
                ..FlashProfile::unknown()
            }],
            default: FlashProfile::unknown(),
        }
    }

    /// Add the profiles defined in a RON document
    ///
    /// Nothing is added if any definition is invalid.
    pub fn with_ron(mut self, source: &str) -> Result<Self> {
        let vendors: Vec<VendorDef> = ron::from_str(source)?;

        let mut added = Vec::new();
        for vendor in vendors {
            for chip in vendor.chips {
                let profile = FlashProfile {
                    id: u16::from_be_bytes([vendor.manufacturer_id, chip.model]),
                    vendor: vendor.vendor.clone(),
                    name: chip.name,
                    write_enable: chip.write_enable,
                    large_erase: chip.large_erase.try_into()?,
                    small_erase: chip.small_erase.try_into()?,
                    program_opcode: chip.program_opcode,
                    program_size: chip.program_size.to_bytes()?,
                };
                profile.validate()?;
                log::debug!("Loaded profile {} (0x{:04X})", profile, profile.id);
                added.push(profile);
            }
        }

        // Loaded definitions shadow built-in ones
        self.profiles.splice(0..0, added);
        Ok(self)
    }

    /// Select the profile for an identified device
    ///
    /// Exact ID match first, then any profile of the same manufacturer,
    /// then the default profile.
    pub fn lookup(&self, id: &FlashId) -> &FlashProfile {
        let key = id.jedec_id();
        if let Some(p) = self.profiles.iter().find(|p| p.id == key) {
            return p;
        }
        if let Some(p) = self
            .profiles
            .iter()
            .find(|p| p.manufacturer() == id.manufacturer)
        {
            log::debug!(
                "No exact profile for {}, using {} family profile",
                id,
                p.vendor
            );
            return p;
        }
        &self.default
    }

    /// Vendor name for a manufacturer ID
    pub fn vendor(&self, manufacturer: u8) -> &str {
        self.profiles
            .iter()
            .find(|p| p.manufacturer() == manufacturer)
            .map(|p| p.vendor.as_str())
            .unwrap_or("Unknown")
    }

    /// Profile used for unidentified devices
    pub fn default_profile(&self) -> &FlashProfile {
        &self.default
    }

    /// All known profiles
    pub fn profiles(&self) -> &[FlashProfile] {
        &self.profiles
    }
}
