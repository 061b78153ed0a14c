//! Read and hexdump command implementations

use std::fs::File;
use std::io::Write;
use std::path::Path;

use felflash_core::NoProgress;

use crate::progress::IndicatifProgress;
use crate::targets::TargetHandle;

/// Bytes shown per hexdump line
const HEXDUMP_WIDTH: usize = 16;

/// Run the read command
pub fn run_read(
    handle: &mut TargetHandle,
    address: u32,
    length: u32,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new("Reading");
    let data = handle
        .flash()
        .read(address, length as usize, &mut progress)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!(
        "Wrote {} bytes from 0x{:06X} to {:?}",
        data.len(),
        address,
        output
    );

    Ok(())
}

/// Run the hexdump command
pub fn run_hexdump(
    handle: &mut TargetHandle,
    address: u32,
    length: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = handle
        .flash()
        .read(address, length as usize, &mut NoProgress)?;

    for line in hexdump_lines(address, &data) {
        println!("{}", line);
    }

    Ok(())
}

/// Format `data` as `address: hex |ascii|` lines
fn hexdump_lines(base: u32, data: &[u8]) -> Vec<String> {
    data.chunks(HEXDUMP_WIDTH)
        .enumerate()
        .map(|(i, chunk)| {
            let addr = base as usize + i * HEXDUMP_WIDTH;
            let mut hex = String::with_capacity(HEXDUMP_WIDTH * 3);
            for (j, b) in chunk.iter().enumerate() {
                if j == HEXDUMP_WIDTH / 2 {
                    hex.push(' ');
                }
                hex.push_str(&format!("{:02x} ", b));
            }
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:08x}: {:<49} |{}|", addr, hex, ascii)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump_full_line() {
        let data: Vec<u8> = (0x41..0x51).collect();
        let lines = hexdump_lines(0x1000, &data);
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "00001000: 41 42 43 44 45 46 47 48  49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|"
        );
    }

    #[test]
    fn test_hexdump_partial_line() {
        let lines = hexdump_lines(0, &[0x00, 0x7f, b'a']);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("00000000: 00 7f 61 "));
        assert!(lines[0].ends_with("|..a|"));
        // Columns line up with full lines
        assert_eq!(lines[0].find('|'), Some(10 + 49 + 1));
    }

    #[test]
    fn test_hexdump_empty() {
        assert!(hexdump_lines(0, &[]).is_empty());
    }
}
