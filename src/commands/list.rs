//! List commands implementation

use felflash_core::soc::SOC_VARIANTS;
use felflash_core::ProfileTable;

use crate::commands::format_size;
use crate::targets::available_targets;

/// List all targets
pub fn list_targets() {
    println!("Available targets:");
    println!();
    for t in available_targets() {
        println!("  {:10} - {}", t.name, t.description);
    }
}

/// List all SoCs with an SPI0 profile
pub fn list_socs() {
    println!("{:<6} {:>6} {:<6} {:>4}  Pins", "SoC", "ID", "Gen", "Mux");
    println!("{}", "-".repeat(48));

    for soc in SOC_VARIANTS {
        let pins: Vec<String> = soc.pins.iter().map(|p| p.to_string()).collect();
        println!(
            "{:<6} {:>6} {:<6} {:>4}  {}",
            soc.name,
            format!("0x{:04X}", soc.soc_id),
            soc.generation,
            soc.pinmux,
            pins.join(" ")
        );
    }
}

/// List all known flash profiles
pub fn list_chips(profiles: &ProfileTable, vendor_filter: Option<&str>) {
    println!(
        "{:<12} {:<12} {:>8} {:>10} {:>10} {:>6}",
        "Vendor", "Name", "JEDEC ID", "Large", "Small", "Page"
    );
    println!("{}", "-".repeat(64));

    let all = profiles
        .profiles()
        .iter()
        .chain(std::iter::once(profiles.default_profile()));
    for p in all {
        if let Some(vendor) = vendor_filter {
            if !p.vendor.to_lowercase().contains(&vendor.to_lowercase()) {
                continue;
            }
        }

        println!(
            "{:<12} {:<12} {:>8} {:>10} {:>10} {:>6}",
            p.vendor,
            p.name,
            format!("{:04X}", p.id),
            format_size(p.large_erase.size as u64),
            format_size(p.small_erase.size as u64),
            p.program_size
        );
    }
}
