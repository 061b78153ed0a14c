//! Write command implementation

use std::fs;
use std::path::Path;

use felflash_core::{FlashProfile, Identification, ProfileTable};

use crate::progress::IndicatifProgress;
use crate::targets::TargetHandle;

/// Run the write command
pub fn run_write(
    handle: &mut TargetHandle,
    profiles: &ProfileTable,
    address: u32,
    input: &Path,
    do_verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let profile = select_profile(handle, profiles)?;

    let data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    let mut progress = IndicatifProgress::new("Writing");
    handle.flash().write(address, &data, &profile, &mut progress)?;

    // Keep the image in sync even if verification fails
    handle.save()?;

    if do_verify {
        verify(handle, address, &data)?;
    }

    println!("Wrote {} bytes at 0x{:06X}", data.len(), address);
    Ok(())
}

/// Identify the chip and pick its profile
fn select_profile(
    handle: &mut TargetHandle,
    profiles: &ProfileTable,
) -> Result<FlashProfile, Box<dyn std::error::Error>> {
    match handle.flash().identify()? {
        Identification::Detected(id) => {
            let profile = profiles.lookup(&id);
            println!("Found: {} (JEDEC ID {})", profile, id);
            Ok(profile.clone())
        }
        Identification::NoDevice => {
            log::warn!("No SPI flash detected, using default profile");
            Ok(profiles.default_profile().clone())
        }
    }
}

/// Read the region back and compare it with `expected`
fn verify(
    handle: &mut TargetHandle,
    address: u32,
    expected: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Verifying");
    let actual = handle
        .flash()
        .read(address, expected.len(), &mut progress)?;

    if let Some(offset) = first_mismatch(expected, &actual) {
        return Err(format!(
            "Verification failed at offset 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
            address as usize + offset,
            expected[offset],
            actual[offset]
        )
        .into());
    }

    println!("Verification passed");
    Ok(())
}

fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected.iter().zip(actual).position(|(a, b)| a != b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 0, 3]), Some(1));
        assert_eq!(first_mismatch(&[], &[]), None);
    }
}
