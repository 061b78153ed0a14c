//! SRAM staging buffer
//!
//! The start of SRAM (from the SPL load address up to the scratch code area)
//! doubles as the data buffer for SPI batches. The boot ROM's FEL code keeps
//! state there as well, so every operation saves the area first and puts it
//! back before returning, whatever the outcome.

use crate::error::Result;
use crate::transport::{FelTransport, SocInfo};

/// Largest batch the interpreter protocol uses, even if SRAM is bigger
pub const MAX_STAGING_LEN: usize = 0x1000;

/// The SRAM area used as staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingArea {
    /// SRAM address of the area (SPL load address)
    pub base: u32,
    /// Bytes between the SPL load address and the scratch code
    pub len: usize,
}

impl StagingArea {
    /// Staging area of a SoC
    pub fn from_soc(info: &SocInfo) -> Self {
        Self {
            base: info.spl_addr,
            len: info.spl_area_len(),
        }
    }

    /// Usable batch size, capped at [`MAX_STAGING_LEN`]
    pub fn capacity(&self) -> usize {
        self.len.min(MAX_STAGING_LEN)
    }
}

/// Run `f` with the staging area backed up and restored around it
///
/// The backup is written back on every exit path. If `f` fails its error is
/// returned and a failing restore is only logged; if `f` succeeds a failing
/// restore is returned.
pub fn with_staging<T, R, F>(fel: &mut T, f: F) -> Result<R>
where
    T: FelTransport + ?Sized,
    F: FnOnce(&mut T, &StagingArea) -> Result<R>,
{
    let area = StagingArea::from_soc(&fel.soc_info());

    let mut backup = vec![0u8; area.len];
    fel.read_memory(area.base, &mut backup)?;
    log::trace!(
        "Backed up {} bytes of SRAM at 0x{:08X}",
        backup.len(),
        area.base
    );

    let result = f(fel, &area);
    let restored = fel.write_memory(area.base, &backup);

    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            log::error!("Failed to restore SRAM after error: {}", restore_err);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FelError;
    use crate::transport::BatchTransferParams;

    struct MockSram {
        info: SocInfo,
        sram: Vec<u8>,
        reads: usize,
        writes: usize,
        fail_writes: bool,
    }

    impl MockSram {
        fn new(spl_addr: u32, scratch_addr: u32) -> Self {
            let len = scratch_addr as usize;
            Self {
                info: SocInfo {
                    soc_id: 0x1651,
                    spl_addr,
                    scratch_addr,
                },
                sram: (0..len).map(|i| (i * 7) as u8).collect(),
                reads: 0,
                writes: 0,
                fail_writes: false,
            }
        }
    }

    impl FelTransport for MockSram {
        fn soc_info(&self) -> SocInfo {
            self.info
        }

        fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
            self.reads += 1;
            let start = addr as usize;
            buf.copy_from_slice(&self.sram[start..start + buf.len()]);
            Ok(())
        }

        fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
            self.writes += 1;
            if self.fail_writes {
                return Err(FelError::TransportFailure("stalled".into()));
            }
            let start = addr as usize;
            self.sram[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn prepare_batch_transfer(&mut self, _params: &BatchTransferParams) -> Result<u32> {
            Ok(self.info.scratch_addr)
        }

        fn execute_remote(&mut self, _entry: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capacity_is_capped() {
        let small = StagingArea::from_soc(&SocInfo {
            soc_id: 0,
            spl_addr: 0x0,
            scratch_addr: 0x800,
        });
        assert_eq!(small.capacity(), 0x800);

        let large = StagingArea::from_soc(&SocInfo {
            soc_id: 0,
            spl_addr: 0x10000,
            scratch_addr: 0x18000,
        });
        assert_eq!(large.len, 0x8000);
        assert_eq!(large.capacity(), MAX_STAGING_LEN);
    }

    #[test]
    fn test_restores_after_success() {
        let mut fel = MockSram::new(0x100, 0x1100);
        let original = fel.sram.clone();

        let value = with_staging(&mut fel, |fel, area| {
            assert_eq!(area.base, 0x100);
            assert_eq!(area.len, 0x1000);
            fel.write_memory(area.base, &[0u8; 64])?;
            Ok(42)
        })
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(fel.sram, original);
        assert_eq!(fel.reads, 1);
        assert_eq!(fel.writes, 2);
    }

    #[test]
    fn test_restores_after_error() {
        let mut fel = MockSram::new(0, 0x1000);
        let original = fel.sram.clone();

        let result: Result<()> = with_staging(&mut fel, |fel, area| {
            fel.write_memory(area.base, &[0xAAu8; 128])?;
            Err(FelError::TransportFailure("USB stall".into()))
        });

        match result {
            Err(FelError::TransportFailure(msg)) => assert_eq!(msg, "USB stall"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(fel.sram, original);
    }

    #[test]
    fn test_restore_failure_reported() {
        let mut fel = MockSram::new(0, 0x1000);
        let result = with_staging(&mut fel, |fel, _| {
            fel.fail_writes = true;
            Ok(())
        });
        assert!(matches!(result, Err(FelError::TransportFailure(_))));
    }
}
