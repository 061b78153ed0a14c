//! CLI command implementations
//!
//! Every command works on an opened [`TargetHandle`](crate::targets::TargetHandle).
//! Commands that change the flash save the emulated image afterwards.

mod info;
mod list;
mod read;
mod write;

pub use info::run_info;
pub use list::{list_chips, list_socs, list_targets};
pub use read::{run_hexdump, run_read};
pub use write::run_write;

/// Format a byte count with binary units
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
