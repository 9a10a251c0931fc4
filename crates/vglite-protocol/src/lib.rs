//! Wire format of the VGLite command buffer.
//!
//! A command buffer is a sequence of 8-byte aligned little-endian records. The top nibble of the
//! first word of each record selects its kind:
//! - [`cmd`] holds the opcodes, the record encoders shared by every producer, and a bounds-checked
//!   record decoder.
//! - [`cmd_writer`] is an unbounded stream builder for fixtures and host-side tooling.
//! - [`regs`] names the register addresses targeted by `STATE` records.
#![forbid(unsafe_code)]

pub mod cmd;
pub mod cmd_writer;
pub mod regs;

pub use cmd::{
    decode_stream, VgCmdDecodeError, VgCmdOpcode, VgCmdRecord, VgCmdStreamIter, EVENT_END,
    EVENT_FRAME_END, STALL_MODULE_TESSELLATOR, VG_CMD_END_BYTES, VG_CMD_RECORD_ALIGN,
};
pub use cmd_writer::VgCmdWriter;
