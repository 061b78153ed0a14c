//! felflash-core - SPI NOR flash access through the sunxi FEL protocol
//!
//! Allwinner SoCs expose a USB recovery mode (FEL) in their boot ROM which
//! only offers "read memory", "write memory" and "execute code". This crate
//! builds SPI flash access on top of those primitives:
//!
//! 1. The SPI0 controller is configured by poking CCM, GPIO and SPI
//!    registers through FEL ([`spi`]).
//! 2. A small command interpreter is uploaded to SRAM by the transport and
//!    fed a batch of SPI transactions encoded in the staging buffer
//!    ([`batch`]).
//! 3. Reads, writes and JEDEC identification are chunked so that every batch
//!    fits the 4 KiB staging buffer at the start of SRAM ([`flash`]).
//!
//! The transport itself (USB, code upload) is supplied by the caller through
//! the [`FelTransport`] trait.
//!
//! # Example
//!
//! ```ignore
//! use felflash_core::{FelSpiFlash, Identification, NoProgress, ProfileTable};
//!
//! let mut flash = FelSpiFlash::new(transport)?;
//! if let Identification::Detected(id) = flash.identify()? {
//!     let table = ProfileTable::builtin();
//!     let profile = table.lookup(&id);
//!     flash.write(0, &image, profile, &mut NoProgress)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod batch;
pub mod chips;
pub mod error;
pub mod flash;
pub mod progress;
pub mod regs;
pub mod soc;
pub mod spi;
pub mod sram;
pub mod transport;

pub use chips::{FlashId, FlashProfile, ProfileTable};
pub use error::{FelError, Result};
pub use flash::{FelSpiFlash, Identification};
pub use progress::{NoProgress, Progress};
pub use soc::{Generation, SocVariant};
pub use transport::{BatchTransferParams, FelTransport, SocInfo};
