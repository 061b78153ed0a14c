//! SPI batch command stream
//!
//! The remote interpreter walks the staging buffer record by record. Each
//! record starts with a 2-byte big-endian length:
//!
//! | Length   | Meaning                                                   |
//! |----------|-----------------------------------------------------------|
//! | `0x0000` | end of batch                                              |
//! | `0xFFFF` | wait until the flash has finished its erase/program cycle |
//! | `N`      | clock out the next `N` bytes as one SPI transaction       |
//!
//! Transactions are full duplex: the bytes received from the flash overwrite
//! the transmitted bytes in place, so the response of a read lands right
//! behind its header.
//!
//! [`BatchWriter`] builds such a stream in a fixed-capacity buffer and never
//! lets it grow past the capacity, end marker included. [`Frames`] walks an
//! encoded stream the same way the interpreter does.

use std::ops::Range;

use crate::error::{FelError, Result};
use crate::sram::MAX_STAGING_LEN;

/// SPI flash opcodes used by the batch builders
pub mod opcodes {
    /// Write Enable
    pub const WREN: u8 = 0x06;
    /// Read Data (3-byte address)
    pub const READ: u8 = 0x03;
    /// Read JEDEC ID
    pub const RDID: u8 = 0x9F;
}

/// Length value terminating a batch
pub const END_MARKER: u16 = 0x0000;
/// Length value asking the interpreter to wait for the flash to be idle
pub const WAIT_MARKER: u16 = 0xFFFF;
/// Size of the length field
pub const LEN_FIELD: usize = 2;
/// Size of the encoded end marker
pub const END_LEN: usize = LEN_FIELD;
/// Opcode plus 3-byte address
pub const HEADER_LEN: usize = 4;
/// Offset of read data from the start of a read record
pub const READ_DATA_OFFSET: usize = LEN_FIELD + HEADER_LEN;
/// Highest flash address reachable with 3-byte addressing
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// A single SPI transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction<'a> {
    /// Command opcode
    pub opcode: u8,
    /// 24-bit address sent after the opcode, if any
    pub address: Option<u32>,
    /// Bytes sent after the header
    pub payload: &'a [u8],
    /// Bytes clocked in after the payload
    pub response_len: usize,
}

impl<'a> Transaction<'a> {
    /// Erase command (opcode + address)
    pub fn erase(opcode: u8, address: u32) -> Self {
        Self {
            opcode,
            address: Some(address),
            payload: &[],
            response_len: 0,
        }
    }

    /// Program command (opcode + address + data)
    pub fn program(opcode: u8, address: u32, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(address),
            payload: data,
            response_len: 0,
        }
    }

    /// Read Data command returning `len` bytes
    pub fn read(address: u32, len: usize) -> Self {
        Self {
            opcode: opcodes::READ,
            address: Some(address),
            payload: &[],
            response_len: len,
        }
    }

    /// Opcode-only command such as Write Enable
    pub fn command(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            payload: &[],
            response_len: 0,
        }
    }

    /// Read JEDEC ID command (manufacturer, memory type, capacity)
    pub fn read_id() -> Self {
        Self {
            opcode: opcodes::RDID,
            address: None,
            payload: &[],
            response_len: 3,
        }
    }

    fn header_len(&self) -> usize {
        if self.address.is_some() {
            HEADER_LEN
        } else {
            1
        }
    }

    /// Number of bytes clocked on the bus
    pub fn wire_len(&self) -> usize {
        self.header_len() + self.payload.len() + self.response_len
    }

    /// Offset of the response from the start of the encoded record
    pub fn response_offset(&self) -> usize {
        LEN_FIELD + self.header_len() + self.payload.len()
    }
}

/// One record of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Set the write enable latch
    WriteEnable,
    /// Any other SPI transaction
    Transaction(Transaction<'a>),
    /// Wait for the erase/program cycle to finish
    WaitForCompletion,
    /// End of batch
    End,
}

impl Record<'_> {
    /// Encoded size including the length field
    pub fn encoded_len(&self) -> usize {
        match self {
            Record::WriteEnable => LEN_FIELD + 1,
            Record::Transaction(t) => LEN_FIELD + t.wire_len(),
            Record::WaitForCompletion | Record::End => LEN_FIELD,
        }
    }
}

/// Append-only encoder for a batch of records
///
/// Space for the end marker is reserved from the start, so a batch accepted
/// record by record can always be terminated.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    buf: Vec<u8>,
    capacity: usize,
    sealed: bool,
}

impl BatchWriter {
    /// Create a writer for a staging buffer of `capacity` bytes
    ///
    /// The capacity is capped at [`MAX_STAGING_LEN`].
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = capacity.min(MAX_STAGING_LEN);
        if capacity < END_LEN {
            return Err(FelError::StagingTooSmall(capacity));
        }
        Ok(Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        })
    }

    /// Total size of the batch buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available for further records, end marker excluded
    pub fn remaining(&self) -> usize {
        if self.sealed {
            0
        } else {
            self.capacity - END_LEN - self.buf.len()
        }
    }

    /// Encoded bytes so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no record has been written since the last reset
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encoded bytes so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append a record
    ///
    /// Fails without modifying the batch if the record (plus the reserved
    /// end marker) does not fit.
    pub fn push(&mut self, record: &Record<'_>) -> Result<()> {
        if let Record::End = record {
            self.finish();
            return Ok(());
        }

        let needed = record.encoded_len();
        let available = self.remaining();
        if needed > available {
            return Err(FelError::CapacityExceeded { needed, available });
        }

        match record {
            Record::WriteEnable => {
                self.push_len(1);
                self.buf.push(opcodes::WREN);
            }
            Record::Transaction(t) => {
                if let Some(addr) = t.address {
                    if addr > MAX_ADDRESS {
                        return Err(FelError::AddressOutOfRange(addr));
                    }
                }
                // wire_len <= capacity < 0xFFFF, so it never aliases a marker
                self.push_len(t.wire_len() as u16);
                self.buf.push(t.opcode);
                if let Some(addr) = t.address {
                    self.buf
                        .extend_from_slice(&[(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]);
                }
                self.buf.extend_from_slice(t.payload);
                self.buf.resize(self.buf.len() + t.response_len, 0);
            }
            Record::WaitForCompletion => self.push_len(WAIT_MARKER),
            Record::End => unreachable!(),
        }
        Ok(())
    }

    /// Terminate the batch and return the encoded stream
    pub fn finish(&mut self) -> &[u8] {
        if !self.sealed {
            self.push_len(END_MARKER);
            self.sealed = true;
        }
        &self.buf
    }

    /// Discard the batch so the buffer can be reused
    pub fn reset(&mut self) {
        self.buf.clear();
        self.sealed = false;
    }

    fn push_len(&mut self, len: u16) {
        self.buf.extend_from_slice(&len.to_be_bytes());
    }
}

/// A decoded record boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Bytes of one SPI transaction within the buffer
    Transfer(Range<usize>),
    /// Wait marker
    Wait,
    /// End marker
    End,
}

/// Decode the record starting at `pos`
///
/// Returns the frame and the position of the following record.
pub fn next_frame(buf: &[u8], pos: usize) -> Result<(Frame, usize)> {
    let len_bytes = buf
        .get(pos..pos + LEN_FIELD)
        .ok_or(FelError::MalformedStream(pos))?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]);
    let start = pos + LEN_FIELD;

    match len {
        END_MARKER => Ok((Frame::End, start)),
        WAIT_MARKER => Ok((Frame::Wait, start)),
        n => {
            let end = start + n as usize;
            if end > buf.len() {
                return Err(FelError::MalformedStream(pos));
            }
            Ok((Frame::Transfer(start..end), end))
        }
    }
}

/// Iterator over the frames of an encoded batch, up to the end marker
pub struct Frames<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Frames<'a> {
    /// Walk `buf` from its first byte
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            done: false,
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match next_frame(self.buf, self.pos) {
            Ok((frame, next)) => {
                self.pos = next;
                if frame == Frame::End {
                    self.done = true;
                }
                Some(Ok(frame))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a batch back into records
///
/// A single `0x06` byte is a write enable; transactions of four bytes or
/// more are split into opcode, 24-bit address and payload.
pub fn decode_records(buf: &[u8]) -> Result<Vec<Record<'_>>> {
    let mut records = Vec::new();
    for frame in Frames::new(buf) {
        let record = match frame? {
            Frame::End => Record::End,
            Frame::Wait => Record::WaitForCompletion,
            Frame::Transfer(range) => {
                let bytes = &buf[range];
                match bytes {
                    [opcodes::WREN] => Record::WriteEnable,
                    [opcode, a2, a1, a0, payload @ ..] => Record::Transaction(Transaction {
                        opcode: *opcode,
                        address: Some(u32::from_be_bytes([0, *a2, *a1, *a0])),
                        payload,
                        response_len: 0,
                    }),
                    [opcode, payload @ ..] => Record::Transaction(Transaction {
                        opcode: *opcode,
                        address: None,
                        payload,
                        response_len: 0,
                    }),
                    [] => unreachable!("zero length is the end marker"),
                }
            }
        };
        records.push(record);
    }
    Ok(records)
}
