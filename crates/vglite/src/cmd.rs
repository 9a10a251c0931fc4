//! Command buffers owned by a [`crate::RenderContext`].

use vglite_protocol::VG_CMD_END_BYTES;

/// One kernel-allocated command buffer and the records encoded into it since the last submit.
///
/// The driver encodes into host memory and hands the bytes to the kernel on submit, which copies
/// them to `address`. The encoded length never exceeds `capacity - VG_CMD_END_BYTES`, so the
/// `END` record always fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    address: u32,
    capacity: usize,
    bytes: Vec<u8>,
}

impl CommandBuffer {
    pub fn new(address: u32, capacity: usize) -> Self {
        Self {
            address,
            capacity,
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write cursor.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether a record of `len` bytes can be appended without displacing the `END` record.
    pub fn fits(&self, len: usize) -> bool {
        self.bytes.len() + len + VG_CMD_END_BYTES <= self.capacity
    }

    /// Whether a record of `len` bytes fits even in an empty buffer.
    pub fn can_ever_fit(&self, len: usize) -> bool {
        len + VG_CMD_END_BYTES <= self.capacity
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    /// Takes the encoded records and rewinds the cursor to zero.
    pub(crate) fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.bytes, Vec::with_capacity(self.capacity))
    }
}
