//! Target registration and opening
//!
//! A target is selected with a string of the form `name[:key=value,...]`.
//! Only the emulated target is built in; it keeps its flash contents in an
//! optional image file so that consecutive invocations see each other's
//! writes.

use std::fs;
use std::path::{Path, PathBuf};

use felflash_core::soc::SOC_VARIANTS;
use felflash_core::{FelError, FelSpiFlash, FelTransport};
use felflash_emu::{EmuConfig, EmulatedTarget, FlashConfig};
use thiserror::Error;

/// Errors raised while selecting or opening a target
#[derive(Debug, Error)]
pub enum TargetError {
    /// No target with this name
    #[error("Unknown target: {0} (see list-targets)")]
    UnknownTarget(String),

    /// A target option could not be parsed
    #[error("Invalid value for {key}: {value}")]
    InvalidOption { key: String, value: String },

    /// The SoC name or ID is not known
    #[error("Unknown SoC: {0} (see list-socs)")]
    UnknownSoc(String),

    /// Image file could not be read or written
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target was rejected by the flash driver
    #[error(transparent)]
    Fel(#[from] FelError),
}

/// Information about a target
pub struct TargetInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// All targets built into this binary
pub fn available_targets() -> &'static [TargetInfo] {
    &[TargetInfo {
        name: "emu",
        aliases: &["emulator"],
        description: "Emulated FEL device with SPI NOR flash \
                      (soc=<name|id>,image=<file>,size=<bytes>,nodev)",
    }]
}

/// Split `name:key=value,flag` into the name and its options
///
/// Options without `=` are returned with an empty value.
pub fn parse_target_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    match s.split_once(':') {
        Some((name, opts)) => {
            let options = opts
                .split(',')
                .filter(|opt| !opt.is_empty())
                .map(|opt| opt.split_once('=').unwrap_or((opt, "")))
                .collect();
            (name, options)
        }
        None => (s, Vec::new()),
    }
}

/// Emulated target settings
#[derive(Debug, Clone)]
pub struct EmuOptions {
    /// Emulator configuration
    pub config: EmuConfig,
    /// Flash image backing the emulated chip
    pub image: Option<PathBuf>,
}

/// Resolve a SoC given by name (`h3`) or ID (`0x1680`)
fn parse_soc(value: &str) -> Result<u32, TargetError> {
    let by_id = value
        .strip_prefix("0x")
        .and_then(|hex| u32::from_str_radix(hex, 16).ok());

    SOC_VARIANTS
        .iter()
        .find(|v| Some(v.soc_id) == by_id || v.name.eq_ignore_ascii_case(value))
        .map(|v| v.soc_id)
        .ok_or_else(|| TargetError::UnknownSoc(value.to_string()))
}

/// Parse a flash size in bytes, KiB (`K`) or MiB (`M`)
fn parse_size(value: &str) -> Option<usize> {
    let (digits, scale) = match value.as_bytes().last()? {
        b'K' | b'k' => (&value[..value.len() - 1], 1024),
        b'M' | b'm' => (&value[..value.len() - 1], 1024 * 1024),
        _ => (value, 1),
    };
    let n: usize = match digits.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    n.checked_mul(scale)
}

/// Parse the options of the emulated target
pub fn parse_options(options: &[(&str, &str)]) -> Result<EmuOptions, TargetError> {
    let invalid = |key: &str, value: &str| TargetError::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
    };

    let mut soc_id = EmuConfig::default().soc_id;
    let mut flash = Some(FlashConfig::default());
    let mut image = None;

    for (key, value) in options {
        match *key {
            "soc" => soc_id = parse_soc(value)?,
            "image" => image = Some(PathBuf::from(value)),
            "size" => {
                let size = parse_size(value)
                    .filter(|s| s.is_power_of_two() && (256..=1 << 24).contains(s))
                    .ok_or_else(|| invalid(*key, *value))?;
                if let Some(f) = flash.as_mut() {
                    f.size_exp = size.trailing_zeros() as u8;
                }
            }
            "nodev" => flash = None,
            _ => {
                log::warn!("emu: Unknown option: {}={}", key, value);
            }
        }
    }

    let mut config = EmuConfig::for_soc(soc_id)
        .ok_or_else(|| TargetError::UnknownSoc(format!("0x{:04X}", soc_id)))?;
    config.flash = flash;

    Ok(EmuOptions { config, image })
}

/// An opened target
pub struct TargetHandle {
    flash: FelSpiFlash<EmulatedTarget>,
    image: Option<PathBuf>,
}

impl TargetHandle {
    /// Flash driver bound to the target
    pub fn flash(&mut self) -> &mut FelSpiFlash<EmulatedTarget> {
        &mut self.flash
    }

    /// Store the emulated flash back into its image file
    pub fn save(&self) -> Result<(), TargetError> {
        let (Some(path), Some(data)) = (&self.image, self.flash.transport().flash_data()) else {
            return Ok(());
        };
        fs::write(path, data).map_err(|source| TargetError::Image {
            path: path.clone(),
            source,
        })?;
        log::debug!("Saved flash image to {}", path.display());
        Ok(())
    }
}

fn load_image(path: &Path) -> Result<Option<Vec<u8>>, TargetError> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TargetError::Image {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Open a target given as `name[:key=value,...]`
pub fn open_target(target: &str) -> Result<TargetHandle, TargetError> {
    let (name, options) = parse_target_string(target);

    let target = available_targets()
        .iter()
        .find(|t| t.name == name || t.aliases.contains(&name))
        .ok_or_else(|| TargetError::UnknownTarget(name.to_string()))?;
    log::debug!("Opening target {}", target.name);

    let opts = parse_options(&options)?;
    let emu = match opts.image.as_deref().map(load_image).transpose()?.flatten() {
        Some(data) => {
            log::info!("Loaded {} byte flash image", data.len());
            EmulatedTarget::with_flash_data(opts.config, &data)
        }
        None => EmulatedTarget::new(opts.config),
    };

    let info = emu.soc_info();
    let flash = FelSpiFlash::new(emu)?;
    log::info!(
        "Connected to {} (SoC 0x{:04X}), staging 0x{:X}..0x{:X}",
        flash.soc().name,
        info.soc_id,
        info.spl_addr,
        info.scratch_addr
    );

    Ok(TargetHandle {
        flash,
        image: opts.image,
    })
}
