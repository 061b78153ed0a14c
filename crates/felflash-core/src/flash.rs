//! SPI flash operations over FEL
//!
//! [`FelSpiFlash`] ties the pieces together: every public operation backs up
//! the staging area, brings up SPI0, uploads the batch interpreter and then
//! streams batches through the staging buffer.

use crate::batch::{
    opcodes, BatchWriter, Record, Transaction, END_LEN, MAX_ADDRESS, READ_DATA_OFFSET,
};
use crate::chips::{EraseOp, FlashId, FlashProfile};
use crate::error::{FelError, Result};
use crate::progress::Progress;
use crate::soc::SocVariant;
use crate::spi::{batch_params, init_spi0};
use crate::sram::{with_staging, StagingArea};
use crate::transport::FelTransport;

/// Staging bytes a read chunk cannot use (length field, header, end marker)
pub const READ_OVERHEAD: usize = 8;

/// Batch space kept free beyond one page before another program step is
/// appended (covers write enable, erase and wait records)
pub const WRITE_SLACK: usize = 64;

/// Result of the Read ID command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    /// A device answered
    Detected(FlashId),
    /// MISO read back as all zeros or all ones
    NoDevice,
}

/// SPI NOR flash attached to SPI0 of a SoC in FEL mode
pub struct FelSpiFlash<T: FelTransport> {
    fel: T,
    soc: &'static SocVariant,
}

impl<T: FelTransport> FelSpiFlash<T> {
    /// Bind to the SoC behind `fel`
    ///
    /// Fails with [`FelError::UnsupportedDevice`] if the SoC has no SPI0
    /// profile. No target memory is accessed.
    pub fn new(fel: T) -> Result<Self> {
        let soc = SocVariant::lookup(fel.soc_info().soc_id)?;
        log::debug!("Using SPI0 profile of {} ({})", soc.name, soc.generation);
        Ok(Self { fel, soc })
    }

    /// SoC variant in use
    pub fn soc(&self) -> &'static SocVariant {
        self.soc
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.fel
    }

    /// Underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.fel
    }

    /// Release the transport
    pub fn into_inner(self) -> T {
        self.fel
    }

    /// Send Read ID (9Fh) and decode the answer
    pub fn identify(&mut self) -> Result<Identification> {
        let soc = self.soc;
        with_staging(&mut self.fel, |fel, area| {
            let entry = start_session(fel, soc, area)?;

            let read_id = Transaction::read_id();
            let mut writer = BatchWriter::new(area.capacity())?;
            writer.push(&Record::Transaction(read_id))?;
            let stream = writer.finish();
            fel.write_memory(area.base, stream)?;
            fel.execute_remote(entry)?;

            let mut reply = vec![0u8; stream.len()];
            fel.read_memory(area.base, &mut reply)?;
            let at = read_id.response_offset();
            let response = [reply[at], reply[at + 1], reply[at + 2]];
            log::debug!("Read ID response: {:02X?}", response);

            Ok(match FlashId::from_response(response) {
                Some(id) => Identification::Detected(id),
                None => Identification::NoDevice,
            })
        })
    }

    /// Read `len` bytes starting at `offset`
    pub fn read(&mut self, offset: u32, len: usize, progress: &mut dyn Progress) -> Result<Vec<u8>> {
        check_range(offset, len)?;
        let mut data = vec![0u8; len];
        self.read_into(offset, &mut data, progress)?;
        Ok(data)
    }

    /// Fill `buf` with flash contents starting at `offset`
    pub fn read_into(
        &mut self,
        offset: u32,
        buf: &mut [u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        check_range(offset, buf.len())?;
        let soc = self.soc;

        with_staging(&mut self.fel, |fel, area| {
            let capacity = area.capacity();
            if capacity <= READ_OVERHEAD {
                return Err(FelError::StagingTooSmall(capacity));
            }

            let entry = start_session(fel, soc, area)?;
            fel.write_memory(area.base, &vec![0u8; capacity])?;

            let max_chunk = capacity - READ_OVERHEAD;
            let mut writer = BatchWriter::new(capacity)?;
            let mut addr = offset;

            progress.start(buf.len());
            for chunk in buf.chunks_mut(max_chunk) {
                writer.reset();
                writer.push(&Record::Transaction(Transaction::read(addr, chunk.len())))?;
                let stream = writer.finish();

                // A full chunk ends right at the end marker slot, which
                // still holds the zeros written above
                let upload = if chunk.len() == max_chunk {
                    &stream[..READ_DATA_OFFSET]
                } else {
                    stream
                };
                fel.write_memory(area.base, upload)?;
                fel.execute_remote(entry)?;
                fel.read_memory(area.base + READ_DATA_OFFSET as u32, chunk)?;

                addr += chunk.len() as u32;
                progress.update(chunk.len());
            }
            progress.finish();

            Ok(())
        })
    }

    /// Erase and program `data` at `offset`
    ///
    /// `offset` must be aligned to the small erase unit of `profile`. Every
    /// erase unit touched is erased completely, bytes past the end of `data`
    /// within the last unit are lost. A failure part way through leaves the
    /// flash partially written.
    pub fn write(
        &mut self,
        offset: u32,
        data: &[u8],
        profile: &FlashProfile,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        profile.validate()?;
        let align = profile.small_erase.size;
        if offset % align != 0 {
            return Err(FelError::AlignmentViolation { offset, align });
        }
        check_range(offset, data.len())?;

        let capacity = StagingArea::from_soc(&self.fel.soc_info()).capacity();
        if capacity < profile.program_size as usize + WRITE_SLACK + END_LEN {
            return Err(FelError::StagingTooSmall(capacity));
        }

        log::debug!(
            "Writing {} bytes at 0x{:06X} with {} profile",
            data.len(),
            offset,
            profile
        );

        let soc = self.soc;
        with_staging(&mut self.fel, |fel, area| {
            let entry = start_session(fel, soc, area)?;
            let mut writer = BatchWriter::new(capacity)?;

            progress.start(data.len());
            let mut offset = offset;
            let mut rest = data;
            while !rest.is_empty() {
                let unit = select_erase_unit(profile, offset, rest.len());
                let (region, tail) = rest.split_at((unit.size as usize).min(rest.len()));

                write_region(fel, entry, area.base, &mut writer, profile, unit, offset, region)?;

                offset += region.len() as u32;
                rest = tail;
                progress.update(region.len());
            }
            progress.finish();

            Ok(())
        })
    }
}

/// Erase unit used for the region starting at `offset`
///
/// The large unit is used when `offset` is aligned to it and at least a full
/// large unit remains to be written.
pub fn select_erase_unit(profile: &FlashProfile, offset: u32, remaining: usize) -> EraseOp {
    let large = profile.large_erase;
    if offset % large.size == 0 && remaining >= large.size as usize {
        large
    } else {
        profile.small_erase
    }
}

fn check_range(offset: u32, len: usize) -> Result<()> {
    let end = offset as u64 + len as u64;
    if len > 0 && end > MAX_ADDRESS as u64 + 1 {
        return Err(FelError::AddressOutOfRange(end.min(u32::MAX as u64) as u32));
    }
    Ok(())
}

/// Bring up SPI0 and upload the interpreter, returning its entry point
fn start_session<T: FelTransport + ?Sized>(
    fel: &mut T,
    soc: &SocVariant,
    area: &StagingArea,
) -> Result<u32> {
    init_spi0(fel, soc)?;
    fel.prepare_batch_transfer(&batch_params(soc.regs(), area.base))
}

fn write_enable(profile: &FlashProfile) -> Record<'static> {
    if profile.write_enable == opcodes::WREN {
        Record::WriteEnable
    } else {
        Record::Transaction(Transaction::command(profile.write_enable))
    }
}

/// Erase one unit and program `data` into it, flushing as the batch fills up
#[allow(clippy::too_many_arguments)]
fn write_region<T: FelTransport + ?Sized>(
    fel: &mut T,
    entry: u32,
    base: u32,
    writer: &mut BatchWriter,
    profile: &FlashProfile,
    unit: EraseOp,
    mut offset: u32,
    mut data: &[u8],
) -> Result<()> {
    let step = profile.program_size as usize;

    while !data.is_empty() {
        while !data.is_empty() && writer.remaining() >= step + WRITE_SLACK {
            if offset % unit.size == 0 {
                writer.push(&write_enable(profile))?;
                writer.push(&Record::Transaction(Transaction::erase(unit.opcode, offset)))?;
                writer.push(&Record::WaitForCompletion)?;
            }

            let (page, tail) = data.split_at(step.min(data.len()));
            writer.push(&write_enable(profile))?;
            writer.push(&Record::Transaction(Transaction::program(
                profile.program_opcode,
                offset,
                page,
            )))?;
            writer.push(&Record::WaitForCompletion)?;

            offset += page.len() as u32;
            data = tail;
        }

        let stream = writer.finish();
        log::trace!("Flushing {} byte batch", stream.len());
        fel.write_memory(base, stream)?;
        fel.execute_remote(entry)?;
        writer.reset();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::decode_records;
    use crate::transport::{BatchTransferParams, SocInfo};
    use std::collections::HashMap;

    const ENTRY: u32 = 0x1000;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Read(u32, usize),
        Write(u32, usize),
        Prepare(u32),
        Execute,
    }

    /// SRAM at 0..sram.len(), everything else is a register
    struct MockFel {
        info: SocInfo,
        sram: Vec<u8>,
        regs: HashMap<u32, u32>,
        ops: Vec<Op>,
        /// Staging contents at each execute
        batches: Vec<Vec<u8>>,
        /// Bytes placed at the response slot of each execute
        id_reply: Option<[u8; 3]>,
    }

    impl MockFel {
        fn new(soc_id: u32, staging_len: u32) -> Self {
            Self {
                info: SocInfo {
                    soc_id,
                    spl_addr: 0,
                    scratch_addr: staging_len,
                },
                sram: vec![0xCC; staging_len as usize],
                regs: HashMap::new(),
                ops: Vec::new(),
                batches: Vec::new(),
                id_reply: None,
            }
        }

        fn executes(&self) -> usize {
            self.ops.iter().filter(|op| **op == Op::Execute).count()
        }

        /// Staging uploads between the controller setup and the restore
        fn staging_writes(&self) -> Vec<usize> {
            let writes: Vec<usize> = self
                .ops
                .iter()
                .filter_map(|op| match op {
                    Op::Write(0, len) => Some(*len),
                    _ => None,
                })
                .collect();
            writes[..writes.len() - 1].to_vec()
        }
    }

    impl FelTransport for MockFel {
        fn soc_info(&self) -> SocInfo {
            self.info
        }

        fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
            self.ops.push(Op::Read(addr, buf.len()));
            let start = addr as usize;
            if start < self.sram.len() {
                buf.copy_from_slice(&self.sram[start..start + buf.len()]);
            } else {
                let value = self.regs.get(&addr).copied().unwrap_or(0);
                buf.copy_from_slice(&value.to_le_bytes()[..buf.len()]);
            }
            Ok(())
        }

        fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
            self.ops.push(Op::Write(addr, data.len()));
            let start = addr as usize;
            if start < self.sram.len() {
                self.sram[start..start + data.len()].copy_from_slice(data);
            } else {
                self.regs
                    .insert(addr, u32::from_le_bytes(data.try_into().unwrap()));
            }
            Ok(())
        }

        fn prepare_batch_transfer(&mut self, params: &BatchTransferParams) -> Result<u32> {
            self.ops.push(Op::Prepare(params.buf));
            Ok(ENTRY)
        }

        fn execute_remote(&mut self, entry: u32) -> Result<()> {
            assert_eq!(entry, ENTRY);
            self.ops.push(Op::Execute);
            self.batches.push(self.sram.clone());
            if let Some(reply) = self.id_reply {
                self.sram[3..6].copy_from_slice(&reply);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        total: Option<usize>,
        updates: Vec<usize>,
        finished: bool,
    }

    impl Progress for Recorder {
        fn start(&mut self, total: usize) {
            self.total = Some(total);
        }

        fn update(&mut self, delta: usize) {
            self.updates.push(delta);
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn a20(staging_len: u32) -> FelSpiFlash<MockFel> {
        FelSpiFlash::new(MockFel::new(0x1651, staging_len)).unwrap()
    }

    #[test]
    fn test_unsupported_soc() {
        match FelSpiFlash::new(MockFel::new(0x1633, 0x1000)) {
            Err(FelError::UnsupportedDevice(0x1633)) => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("A31 has no SPI0 profile"),
        }
    }

    #[test]
    fn test_alignment_checked_before_access() {
        let mut flash = a20(0x1000);
        let profile = FlashProfile::unknown();

        let result = flash.write(0x100, &[0u8; 16], &profile, &mut Recorder::default());
        match result {
            Err(FelError::AlignmentViolation { offset, align }) => {
                assert_eq!(offset, 0x100);
                assert_eq!(align, 0x1000);
            }
            other => panic!("expected AlignmentViolation, got {:?}", other),
        }
        assert!(flash.transport().ops.is_empty());
    }

    #[test]
    fn test_range_checked_before_access() {
        let mut flash = a20(0x1000);
        let result = flash.read(0xFF_FF00, 0x200, &mut Recorder::default());
        assert!(matches!(result, Err(FelError::AddressOutOfRange(0x0100_0100))));
        assert!(flash.transport().ops.is_empty());

        // Rejected before the buffer is allocated
        let result = flash.read(0, 0xFFFF_FFFF, &mut Recorder::default());
        assert!(matches!(result, Err(FelError::AddressOutOfRange(0xFFFF_FFFF))));
        assert!(flash.transport().ops.is_empty());

        // Up to the last byte is fine
        flash.read(0xFF_FF00, 0x100, &mut Recorder::default()).unwrap();
    }

    #[test]
    fn test_staging_too_small_for_write() {
        let mut flash = a20(0x100);
        let result = flash.write(0, &[0u8; 16], &FlashProfile::unknown(), &mut Recorder::default());
        assert!(matches!(result, Err(FelError::StagingTooSmall(0x100))));
        assert!(flash.transport().ops.is_empty());
    }

    #[test]
    fn test_identify() {
        let mut flash = a20(0x1000);
        flash.transport_mut().id_reply = Some([0xEF, 0x40, 0x18]);

        let ident = flash.identify().unwrap();
        assert_eq!(
            ident,
            Identification::Detected(FlashId {
                manufacturer: 0xEF,
                model: 0x40,
                size_exp: 0x18,
            })
        );

        let fel = flash.into_inner();
        assert_eq!(fel.executes(), 1);
        assert_eq!(&fel.batches[0][..8], &[0x00, 0x04, 0x9F, 0, 0, 0, 0, 0]);
        // Staging restored
        assert!(fel.sram.iter().all(|b| *b == 0xCC));
    }

    #[test]
    fn test_identify_no_device() {
        for reply in [[0xFF, 0xFF, 0xFF], [0x00, 0x00, 0x00], [0xEF, 0x40, 0xFF]] {
            let mut flash = a20(0x1000);
            flash.transport_mut().id_reply = Some(reply);
            assert_eq!(flash.identify().unwrap(), Identification::NoDevice);
        }
    }

    #[test]
    fn test_session_setup_order() {
        let mut flash = a20(0x1000);
        flash.read(0, 16, &mut Recorder::default()).unwrap();
        let ops = &flash.transport().ops;

        // Backup first, restore last
        assert_eq!(ops[0], Op::Read(0, 0x1000));
        assert_eq!(*ops.last().unwrap(), Op::Write(0, 0x1000));

        let prepare = ops.iter().position(|op| *op == Op::Prepare(0)).unwrap();
        let execute = ops.iter().position(|op| *op == Op::Execute).unwrap();
        assert!(prepare < execute);
        assert_eq!(ops.iter().filter(|op| matches!(op, Op::Prepare(_))).count(), 1);
    }

    #[test]
    fn test_read_chunking() {
        let mut flash = a20(0x1000);
        let mut progress = Recorder::default();
        let len = 10_000;

        let data = flash.read(0x2000, len, &mut progress).unwrap();
        assert_eq!(data.len(), len);

        // 4096 - 8 bytes per execute
        let fel = flash.transport();
        assert_eq!(fel.executes(), 3);
        assert_eq!(progress.total, Some(len));
        assert_eq!(progress.updates, vec![4088, 4088, 1824]);
        assert!(progress.finished);

        // Zero fill, two header-only uploads, then the full last record
        assert_eq!(fel.staging_writes(), vec![0x1000, 6, 6, 6 + 1824 + 2]);

        let first = &fel.batches[0];
        assert_eq!(&first[..6], &[0x0F, 0xFC, 0x03, 0x00, 0x20, 0x00]);
        assert_eq!(&first[0xFFE..0x1000], &[0x00, 0x00]);
        let second = &fel.batches[1];
        assert_eq!(&second[..6], &[0x0F, 0xFC, 0x03, 0x00, 0x2F, 0xF8]);
    }

    #[test]
    fn test_read_chunk_boundaries() {
        const CHUNK: usize = 0x1000 - READ_OVERHEAD;

        for (len, uploads) in [
            (CHUNK, vec![0x1000, 6]),
            (CHUNK + 1, vec![0x1000, 6, 6 + 1 + 2]),
            (2 * CHUNK, vec![0x1000, 6, 6]),
        ] {
            let mut flash = a20(0x1000);
            let mut progress = Recorder::default();
            let data = flash.read(0, len, &mut progress).unwrap();
            assert_eq!(data.len(), len);

            let fel = flash.transport();
            assert_eq!(fel.executes(), len.div_ceil(CHUNK), "len {}", len);
            assert_eq!(fel.staging_writes(), uploads, "len {}", len);
            assert_eq!(progress.updates.iter().sum::<usize>(), len);
        }
    }

    #[test]
    fn test_read_empty() {
        let mut flash = a20(0x1000);
        let mut progress = Recorder::default();
        let data = flash.read(0, 0, &mut progress).unwrap();
        assert!(data.is_empty());
        assert_eq!(flash.transport().executes(), 0);
        assert_eq!(progress.total, Some(0));
    }

    #[test]
    fn test_select_erase_unit() {
        let p = FlashProfile::unknown();
        let large = p.large_erase;
        let small = p.small_erase;

        assert_eq!(select_erase_unit(&p, 0, 0x10000), large);
        assert_eq!(select_erase_unit(&p, 0, 0xFFFF), small);
        assert_eq!(select_erase_unit(&p, 0x20000, 0x30000), large);
        assert_eq!(select_erase_unit(&p, 0x1000, 0x20000), small);
        assert_eq!(select_erase_unit(&p, 0x10000, 0x100), small);
    }

    /// Records of every executed batch
    fn transactions(batches: &[Vec<u8>]) -> Vec<Vec<Record<'_>>> {
        batches
            .iter()
            .map(|b| decode_records(b).unwrap())
            .collect()
    }

    #[test]
    fn test_write_batches() {
        let mut flash = a20(0x1000);
        let profile = FlashProfile::unknown();
        let data: Vec<u8> = (0..0x11000u32).map(|i| (i % 251) as u8).collect();
        let mut progress = Recorder::default();

        flash.write(0, &data, &profile, &mut progress).unwrap();

        // One 64K region, one 4K region
        assert_eq!(progress.updates, vec![0x10000, 0x1000]);
        assert!(progress.finished);

        let fel = flash.transport();
        let batches = transactions(&fel.batches);

        let mut erases = Vec::new();
        let mut programmed = Vec::new();
        for batch in &batches {
            assert!(batch.len() > 1);
            assert_eq!(batch.last(), Some(&Record::End));

            for (i, record) in batch.iter().enumerate() {
                if let Record::Transaction(t) = record {
                    // Every mutating command is preceded by WREN, followed by a wait
                    assert_eq!(batch[i - 1], Record::WriteEnable);
                    assert_eq!(batch[i + 1], Record::WaitForCompletion);
                    match t.opcode {
                        0x02 => {
                            assert!(t.payload.len() <= 256);
                            assert_eq!(t.address, Some(programmed.len() as u32));
                            programmed.extend_from_slice(t.payload);
                        }
                        op => erases.push((op, t.address.unwrap())),
                    }
                }
            }
        }

        assert_eq!(erases, vec![(0xD8, 0), (0x20, 0x10000)]);
        assert_eq!(programmed, data);

        // No batch overruns the staging buffer
        for batch in &batches {
            let len: usize = batch.iter().map(|r| r.encoded_len()).sum();
            assert!(len <= 0x1000);
        }
    }

    #[test]
    fn test_write_partial_unit() {
        let mut flash = a20(0x1000);
        let profile = FlashProfile::unknown();
        let data = vec![0x5A; 300];

        flash.write(0x3000, &data, &profile, &mut SingleRegion).unwrap();

        let batches = transactions(&flash.transport().batches);
        assert_eq!(batches.len(), 1);
        let ops: Vec<(u8, Option<u32>, usize)> = batches[0]
            .iter()
            .filter_map(|r| match r {
                Record::Transaction(t) => Some((t.opcode, t.address, t.payload.len())),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                (0x20, Some(0x3000), 0),
                (0x02, Some(0x3000), 256),
                (0x02, Some(0x3100), 44),
            ]
        );
    }

    struct SingleRegion;

    impl Progress for SingleRegion {
        fn start(&mut self, total: usize) {
            assert_eq!(total, 300);
        }

        fn update(&mut self, delta: usize) {
            assert_eq!(delta, 300);
        }
    }

    #[test]
    fn test_write_custom_write_enable() {
        let mut flash = a20(0x1000);
        let profile = FlashProfile {
            write_enable: 0x50,
            ..FlashProfile::unknown()
        };
        flash
            .write(0, &[0xAA; 16], &profile, &mut Recorder::default())
            .unwrap();

        let batches = transactions(&flash.transport().batches);
        let opcodes: Vec<u8> = batches[0]
            .iter()
            .filter_map(|r| match r {
                Record::Transaction(t) => Some(t.opcode),
                _ => None,
            })
            .collect();
        assert_eq!(opcodes, vec![0x50, 0x20, 0x50, 0x02]);
    }
}
