//! VGLite command record layouts.
//!
//! Every producer of command bytes (the driver's fixed-capacity command buffers as well as
//! [`crate::VgCmdWriter`]) goes through the `write_*` encoders in this module, so two producers fed
//! the same calls emit identical bytes.

use thiserror::Error;

/// Every record starts and ends on an 8-byte boundary.
pub const VG_CMD_RECORD_ALIGN: usize = 8;

/// Size of the `END` record that terminates every submission.
pub const VG_CMD_END_BYTES: usize = 8;

/// Completion event signalled by a plain `END` record.
pub const EVENT_END: u32 = 0;
/// Completion event signalled by the `END` record of a frame delimiter.
pub const EVENT_FRAME_END: u32 = 1;

/// Semaphore/stall module id used to wait for the pixel engine to drain.
pub const STALL_MODULE_PIXEL_ENGINE: u32 = 7;
/// Semaphore/stall module id used before each tessellation window.
pub const STALL_MODULE_TESSELLATOR: u32 = 15;
/// Semaphore/stall module id used after a `CALL` record on front-ends that need it.
pub const STALL_MODULE_FRONT_END: u32 = 0x10;

pub const STATE_BYTES: usize = 8;
pub const STALL_BYTES: usize = 16;
pub const RECTANGLE_BYTES: usize = 16;
pub const CALL_BYTES: usize = 8;
pub const RETURN_BYTES: usize = 8;

/// Largest element count a `STATES` record can carry.
pub const MAX_STATES_COUNT: usize = 0x0FFF;

const LOW_BITS: u32 = 0x0FFF_FFFF;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VgCmdOpcode {
    End = 0x0,
    Semaphore = 0x1,
    Stall = 0x2,
    State = 0x3,
    Data = 0x4,
    Call = 0x6,
    Return = 0x7,
    Nop = 0x8,
}

impl VgCmdOpcode {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x0 => Some(Self::End),
            0x1 => Some(Self::Semaphore),
            0x2 => Some(Self::Stall),
            0x3 => Some(Self::State),
            0x4 => Some(Self::Data),
            0x6 => Some(Self::Call),
            0x7 => Some(Self::Return),
            0x8 => Some(Self::Nop),
            _ => None,
        }
    }

    /// Decodes the opcode nibble of a record's first word.
    pub const fn from_word(word: u32) -> Option<Self> {
        Self::from_u32(word >> 28)
    }

    pub const fn tag(self) -> u32 {
        (self as u32) << 28
    }
}

pub const fn end_word(event: u32) -> u32 {
    VgCmdOpcode::End.tag() | (event & LOW_BITS)
}

pub const fn semaphore_word(module: u32) -> u32 {
    VgCmdOpcode::Semaphore.tag() | (module & LOW_BITS)
}

pub const fn stall_word(module: u32) -> u32 {
    VgCmdOpcode::Stall.tag() | (module & LOW_BITS)
}

pub const fn states_word(count: u32, address: u32) -> u32 {
    VgCmdOpcode::State.tag() | ((count & 0x0FFF) << 16) | (address & 0xFFFF)
}

pub const fn state_word(address: u32) -> u32 {
    states_word(1, address)
}

pub const fn data_word(words: u32) -> u32 {
    VgCmdOpcode::Data.tag() | (words & LOW_BITS)
}

pub const fn call_word(words: u32) -> u32 {
    VgCmdOpcode::Call.tag() | (words & LOW_BITS)
}

pub const RETURN_WORD: u32 = VgCmdOpcode::Return.tag();
pub const NOP_WORD: u32 = VgCmdOpcode::Nop.tag();

pub const fn align8(v: usize) -> usize {
    (v + (VG_CMD_RECORD_ALIGN - 1)) & !(VG_CMD_RECORD_ALIGN - 1)
}

/// Encoded size of a `STATES` record carrying `count` values (padded to an even word count).
pub const fn states_bytes(count: usize) -> usize {
    ((count + 2) & !1) * 4
}

/// Encoded size of a `DATA` record carrying `payload_len` bytes.
pub const fn data_bytes(payload_len: usize) -> usize {
    8 + align8(payload_len)
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_state(out: &mut Vec<u8>, address: u32, value: u32) {
    push_u32(out, state_word(address));
    push_u32(out, value);
}

/// Writes a register whose value is an IEEE-754 single. The register receives the raw bit
/// pattern of `value`.
pub fn write_state_f32(out: &mut Vec<u8>, address: u32, value: f32) {
    write_state(out, address, value.to_bits());
}

/// Writes `values` to consecutive registers starting at `address`.
///
/// The caller must keep `values.len()` at or below [`MAX_STATES_COUNT`].
pub fn write_states(out: &mut Vec<u8>, address: u32, values: &[u32]) {
    debug_assert!(values.len() <= MAX_STATES_COUNT);
    push_u32(out, states_word(values.len() as u32, address));
    for &v in values {
        push_u32(out, v);
    }
    if values.len() % 2 == 0 {
        push_u32(out, NOP_WORD);
    }
}

pub fn write_data(out: &mut Vec<u8>, payload: &[u8]) {
    let padded = align8(payload.len());
    push_u32(out, data_word((padded / 8) as u32));
    push_u32(out, 0);
    out.extend_from_slice(payload);
    out.resize(out.len() + (padded - payload.len()), 0);
}

/// Writes the one-word `DATA` record that kicks a rectangle through the pixel pipe.
///
/// Coordinates are truncated to 16 bits each.
pub fn write_rectangle(out: &mut Vec<u8>, x: i32, y: i32, width: i32, height: i32) {
    push_u32(out, data_word(1));
    push_u32(out, 0);
    out.extend_from_slice(&(x as u16).to_le_bytes());
    out.extend_from_slice(&(y as u16).to_le_bytes());
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
}

pub fn write_call(out: &mut Vec<u8>, address: u32, bytes: u32) {
    push_u32(out, call_word(bytes.div_ceil(8)));
    push_u32(out, address);
}

/// Writes a semaphore/stall pair on `module`.
pub fn write_stall(out: &mut Vec<u8>, module: u32) {
    push_u32(out, semaphore_word(module));
    push_u32(out, 0);
    push_u32(out, stall_word(module));
    push_u32(out, 0);
}

pub fn write_end(out: &mut Vec<u8>, event: u32) {
    push_u32(out, end_word(event));
    push_u32(out, 0);
}

pub fn write_return(out: &mut Vec<u8>) {
    push_u32(out, RETURN_WORD);
    push_u32(out, 0);
}

pub fn write_nop(out: &mut Vec<u8>) {
    push_u32(out, NOP_WORD);
    push_u32(out, 0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum VgCmdDecodeError {
    #[error("command stream length {len} is not a multiple of 8")]
    MisalignedStream { len: usize },
    #[error("unknown record word {word:#010x} at offset {offset}")]
    UnknownOpcode { offset: usize, word: u32 },
    #[error("record at offset {offset} ({record_bytes} bytes) overruns the {stream_bytes}-byte stream")]
    RecordOverrunsStream {
        offset: usize,
        record_bytes: usize,
        stream_bytes: usize,
    },
    #[error("record size overflows usize")]
    CountOverflow,
}

/// One decoded record. Borrowed slices point into the decoded stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VgCmdRecord<'a> {
    End { event: u32 },
    Semaphore { module: u32 },
    Stall { module: u32 },
    /// `STATE`/`STATES`: `values` holds `count` little-endian words (padding excluded).
    States { address: u32, values: &'a [u8] },
    /// `DATA`: the padded payload.
    Data { payload: &'a [u8] },
    Call { words: u32, address: u32 },
    Return,
    Nop,
}

impl<'a> VgCmdRecord<'a> {
    /// Register writes carried by a `STATES` record as `(address, value)` pairs.
    pub fn register_writes(&self) -> impl Iterator<Item = (u32, u32)> + 'a {
        let (address, values): (u32, &'a [u8]) = match *self {
            VgCmdRecord::States { address, values } => (address, values),
            _ => (0, &[]),
        };
        values
            .chunks_exact(4)
            .enumerate()
            .map(move |(i, w)| (address + i as u32, u32::from_le_bytes([w[0], w[1], w[2], w[3]])))
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Iterates the records of a command stream without copying it.
pub struct VgCmdStreamIter<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> VgCmdStreamIter<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, VgCmdDecodeError> {
        if buf.len() % VG_CMD_RECORD_ALIGN != 0 {
            return Err(VgCmdDecodeError::MisalignedStream { len: buf.len() });
        }
        Ok(Self {
            buf,
            offset: 0,
            done: false,
        })
    }

    /// Byte offset of the next record.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, err: VgCmdDecodeError) -> Option<Result<VgCmdRecord<'a>, VgCmdDecodeError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for VgCmdStreamIter<'a> {
    type Item = Result<VgCmdRecord<'a>, VgCmdDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }

        // The stream length is a multiple of 8, so the two header words are always present.
        let offset = self.offset;
        let word0 = read_u32(self.buf, offset);
        let word1 = read_u32(self.buf, offset + 4);

        let Some(opcode) = VgCmdOpcode::from_word(word0) else {
            return self.fail(VgCmdDecodeError::UnknownOpcode { offset, word: word0 });
        };

        let record_bytes = match opcode {
            VgCmdOpcode::State => states_bytes(((word0 >> 16) & 0x0FFF) as usize),
            VgCmdOpcode::Data => match ((word0 & LOW_BITS) as usize)
                .checked_mul(8)
                .and_then(|n| n.checked_add(8))
            {
                Some(n) => n,
                None => return self.fail(VgCmdDecodeError::CountOverflow),
            },
            _ => 8,
        };
        let end = match offset.checked_add(record_bytes) {
            Some(end) => end,
            None => return self.fail(VgCmdDecodeError::CountOverflow),
        };
        if end > self.buf.len() {
            return self.fail(VgCmdDecodeError::RecordOverrunsStream {
                offset,
                record_bytes,
                stream_bytes: self.buf.len(),
            });
        }

        let record = match opcode {
            VgCmdOpcode::End => VgCmdRecord::End {
                event: word0 & LOW_BITS,
            },
            VgCmdOpcode::Semaphore => VgCmdRecord::Semaphore {
                module: word0 & LOW_BITS,
            },
            VgCmdOpcode::Stall => VgCmdRecord::Stall {
                module: word0 & LOW_BITS,
            },
            VgCmdOpcode::State => {
                let count = ((word0 >> 16) & 0x0FFF) as usize;
                VgCmdRecord::States {
                    address: word0 & 0xFFFF,
                    values: &self.buf[offset + 4..offset + 4 + count * 4],
                }
            }
            VgCmdOpcode::Data => VgCmdRecord::Data {
                payload: &self.buf[offset + 8..end],
            },
            VgCmdOpcode::Call => VgCmdRecord::Call {
                words: word0 & LOW_BITS,
                address: word1,
            },
            VgCmdOpcode::Return => VgCmdRecord::Return,
            VgCmdOpcode::Nop => VgCmdRecord::Nop,
        };

        self.offset = end;
        Some(Ok(record))
    }
}

/// Decodes a whole stream, failing on the first malformed record.
pub fn decode_stream(buf: &[u8]) -> Result<Vec<VgCmdRecord<'_>>, VgCmdDecodeError> {
    VgCmdStreamIter::new(buf)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_words_match_hardware_encoding() {
        assert_eq!(end_word(EVENT_FRAME_END), 0x0000_0001);
        assert_eq!(semaphore_word(7), 0x1000_0007);
        assert_eq!(stall_word(7), 0x2000_0007);
        assert_eq!(state_word(0x0A00), 0x3001_0A00);
        assert_eq!(states_word(4, 0x0B00), 0x3004_0B00);
        assert_eq!(data_word(3), 0x4000_0003);
        assert_eq!(call_word(2), 0x6000_0002);
        assert_eq!(RETURN_WORD, 0x7000_0000);
        assert_eq!(NOP_WORD, 0x8000_0000);
    }

    #[test]
    fn states_pads_even_counts_with_nop() {
        let mut out = Vec::new();
        write_states(&mut out, 0x0B00, &[1, 2]);
        assert_eq!(out.len(), states_bytes(2));
        assert_eq!(out.len(), 16);
        assert_eq!(read_u32(&out, 12), NOP_WORD);

        out.clear();
        write_states(&mut out, 0x0B00, &[1, 2, 3]);
        assert_eq!(out.len(), states_bytes(3));
        assert_eq!(out.len(), 16);
        assert_eq!(read_u32(&out, 12), 3);
    }

    #[test]
    fn data_payload_is_zero_padded() {
        let mut out = Vec::new();
        write_data(&mut out, &[0xAA; 5]);
        assert_eq!(out.len(), data_bytes(5));
        assert_eq!(read_u32(&out, 0), data_word(1));
        assert_eq!(&out[8..13], &[0xAA; 5]);
        assert_eq!(&out[13..16], &[0; 3]);
    }

    #[test]
    fn call_rounds_byte_count_up_to_words() {
        let mut out = Vec::new();
        write_call(&mut out, 0x8000_0040, 17);
        assert_eq!(read_u32(&out, 0), call_word(3));
        assert_eq!(read_u32(&out, 4), 0x8000_0040);
    }

    #[test]
    fn f32_state_is_a_bit_cast() {
        let mut out = Vec::new();
        write_state_f32(&mut out, 0x0A3B, 1.0);
        assert_eq!(read_u32(&out, 4), 0x3F80_0000);
    }
}
