//! Info command implementation

use felflash_core::{Identification, ProfileTable};

use crate::commands::format_size;
use crate::targets::TargetHandle;

/// Identify the flash chip and print what is known about it
pub fn run_info(
    handle: &mut TargetHandle,
    profiles: &ProfileTable,
) -> Result<(), Box<dyn std::error::Error>> {
    let flash = handle.flash();
    let soc = flash.soc();
    println!(
        "SoC: {} (0x{:04X}, {} SPI controller)",
        soc.name, soc.soc_id, soc.generation
    );

    match flash.identify()? {
        Identification::NoDevice => println!("No SPI flash detected."),
        Identification::Detected(id) => {
            let size = match id.size() {
                Some(bytes) => format!("{} bytes ({})", bytes, format_size(bytes)),
                None => format!("2^{} bytes", id.size_exp),
            };
            println!(
                "Manufacturer: {} ({:02X}h), model: {:02X}h, size: {}.",
                profiles.vendor(id.manufacturer),
                id.manufacturer,
                id.model,
                size
            );

            let profile = profiles.lookup(&id);
            println!(
                "Profile: {} (erase {:02X}h/{}, {:02X}h/{}; program {:02X}h/{} B)",
                profile,
                profile.large_erase.opcode,
                format_size(profile.large_erase.size as u64),
                profile.small_erase.opcode,
                format_size(profile.small_erase.size as u64),
                profile.program_opcode,
                profile.program_size
            );
        }
    }

    Ok(())
}
