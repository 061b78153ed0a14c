//! Error types for FEL SPI flash operations

use thiserror::Error;

/// Errors that can occur while driving the SPI flash through FEL
#[derive(Debug, Error)]
pub enum FelError {
    /// The SoC has no SPI0 register profile
    #[error("Unsupported SoC 0x{0:04X}: no SPI0 controller profile")]
    UnsupportedDevice(u32),

    /// Write offset is not aligned to the smallest erase unit
    #[error("Write offset 0x{offset:06X} must be {align} bytes aligned")]
    AlignmentViolation {
        /// Requested flash offset
        offset: u32,
        /// Required alignment (small erase unit size)
        align: u32,
    },

    /// A transport primitive (memory access, remote execute) failed
    #[error("FEL transport failure: {0}")]
    TransportFailure(String),

    /// A bounded hardware poll did not complete
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// A record does not fit into the staging buffer
    #[error("Command record needs {needed} bytes but only {available} are left")]
    CapacityExceeded {
        /// Encoded size of the rejected record
        needed: usize,
        /// Free bytes left in the batch (end marker excluded)
        available: usize,
    },

    /// A command stream could not be decoded
    #[error("Malformed command stream at byte {0}")]
    MalformedStream(usize),

    /// Address beyond the 3-byte addressing range
    #[error("Flash address 0x{0:08X} is beyond the 24-bit address space")]
    AddressOutOfRange(u32),

    /// The SRAM staging area cannot hold a useful batch
    #[error("Staging buffer of {0} bytes is too small")]
    StagingTooSmall(usize),

    /// A flash profile table could not be loaded or is inconsistent
    #[error("Invalid flash profile table: {0}")]
    ProfileTable(String),
}

/// Result type for FEL SPI flash operations
pub type Result<T> = std::result::Result<T, FelError>;

impl From<ron::error::SpannedError> for FelError {
    fn from(e: ron::error::SpannedError) -> Self {
        FelError::ProfileTable(e.to_string())
    }
}
