//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

const TARGET_HELP: &str = "FEL target, as name[:key=value,...] (see list-targets)";

#[derive(Parser)]
#[command(name = "felflash")]
#[command(author, version, about = "SPI flash access for Allwinner SoCs in FEL mode", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Additional flash profiles (RON file)
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the SPI flash chip
    Info {
        #[arg(short, long, default_value = "emu", help = TARGET_HELP)]
        target: String,
    },

    /// Read flash contents to a file
    Read {
        #[arg(short, long, default_value = "emu", help = TARGET_HELP)]
        target: String,

        /// Flash address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Dump flash contents to the terminal
    Hexdump {
        #[arg(short, long, default_value = "emu", help = TARGET_HELP)]
        target: String,

        /// Flash address (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to dump (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0x100")]
        length: u32,
    },

    /// Erase and program a file into flash
    Write {
        #[arg(short, long, default_value = "emu", help = TARGET_HELP)]
        target: String,

        /// Flash address, aligned to the smallest erase unit (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Read back and compare after writing
        #[arg(long)]
        verify: bool,
    },

    /// List available targets
    ListTargets,

    /// List SoCs with SPI flash support
    ListSocs,

    /// List known flash profiles
    ListChips {
        /// Filter by vendor
        #[arg(long)]
        vendor: Option<String>,
    },
}
