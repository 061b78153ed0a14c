//! felflash - SPI flash access for Allwinner SoCs in FEL mode
//!
//! Reads, writes and identifies the SPI NOR flash wired to SPI0 of an
//! Allwinner SoC while its boot ROM sits in FEL recovery mode. All flash
//! traffic goes through batches of SPI transactions executed by a small
//! interpreter in SRAM.

mod cli;
mod commands;
mod progress;
mod targets;

use std::fs;
use std::path::Path;

use clap::Parser;
use cli::{Cli, Commands};
use felflash_core::ProfileTable;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let profiles = load_profiles(cli.profiles.as_deref())?;

    match cli.command {
        Commands::ListTargets => {
            commands::list_targets();
            Ok(())
        }
        Commands::ListSocs => {
            commands::list_socs();
            Ok(())
        }
        Commands::ListChips { vendor } => {
            commands::list_chips(&profiles, vendor.as_deref());
            Ok(())
        }
        Commands::Info { target } => {
            let mut handle = targets::open_target(&target)?;
            commands::run_info(&mut handle, &profiles)
        }
        Commands::Read {
            target,
            address,
            length,
            output,
        } => {
            let mut handle = targets::open_target(&target)?;
            commands::run_read(&mut handle, address, length, &output)
        }
        Commands::Hexdump {
            target,
            address,
            length,
        } => {
            let mut handle = targets::open_target(&target)?;
            commands::run_hexdump(&mut handle, address, length)
        }
        Commands::Write {
            target,
            address,
            input,
            verify,
        } => {
            let mut handle = targets::open_target(&target)?;
            commands::run_write(&mut handle, &profiles, address, &input, verify)
        }
    }
}

/// Built-in flash profiles, extended by a RON file if one was given
fn load_profiles(path: Option<&Path>) -> Result<ProfileTable, Box<dyn std::error::Error>> {
    let table = ProfileTable::builtin();
    let Some(path) = path else {
        return Ok(table);
    };

    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read profiles from {}: {}", path.display(), e))?;
    let table = table.with_ron(&source)?;
    log::debug!(
        "Loaded profiles from {} ({} total)",
        path.display(),
        table.profiles().len()
    );
    Ok(table)
}
