use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

/// Abstraction for GPU physical memory access.
///
/// The driver uploads pixels and reads back render targets through this trait; the simulated
/// kernel's executor uses it to fetch `CALL` targets and to read/write pixels. Reads take
/// `&mut self` so implementations backed by MMIO can have side effects.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u8(&mut self, paddr: u64) -> u8 {
        let mut buf = [0u8; 1];
        self.read_physical(paddr, &mut buf);
        buf[0]
    }

    fn read_u16(&mut self, paddr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u8(&mut self, paddr: u64, val: u8) {
        self.write_physical(paddr, &[val]);
    }

    fn write_u16(&mut self, paddr: u64, val: u16) {
        self.write_physical(paddr, &val.to_le_bytes());
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

/// Opaque kernel-side identifier of an allocation or mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryHandle(pub u32);

/// Alignment of every address handed out by [`VideoMemory::allocate`].
pub const VIDEO_MEMORY_ALIGN: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoMemoryError {
    #[error("zero-sized video memory request")]
    ZeroSize,
    #[error("out of video memory: requested {requested} bytes, {free} bytes free")]
    OutOfMemory { requested: u32, free: u32 },
    #[error("unknown video memory handle {0:?}")]
    UnknownHandle(MemoryHandle),
    #[error("physical range {address:#x}+{bytes} is outside video memory")]
    OutOfRange { address: u32, bytes: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Region {
    offset: u32,
    bytes: u32,
}

fn align_up(v: u32, a: u32) -> Option<u32> {
    debug_assert!(a.is_power_of_two());
    v.checked_add(a - 1).map(|v| v & !(a - 1))
}

/// A contiguous video-memory pool with a first-fit allocator.
///
/// Physical addresses are `base + offset` and always fit in 32 bits.
#[derive(Debug)]
pub struct VideoMemory {
    base: u32,
    bytes: Vec<u8>,
    /// Live allocations keyed by offset.
    allocated: BTreeMap<u32, MemoryHandle>,
    regions: HashMap<MemoryHandle, Region>,
    /// Caller-provided ranges wrapped in a handle; they own no pool space.
    mapped: HashMap<MemoryHandle, Region>,
    next_handle: u32,
}

impl VideoMemory {
    pub fn new(base: u32, size: u32) -> Self {
        debug_assert_eq!(base % VIDEO_MEMORY_ALIGN, 0);
        Self {
            base,
            bytes: vec![0; size as usize],
            allocated: BTreeMap::new(),
            regions: HashMap::new(),
            mapped: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn bytes_free(&self) -> u32 {
        let used: u32 = self.regions.values().map(|r| r.bytes).sum();
        self.size().saturating_sub(used)
    }

    fn next_handle(&mut self) -> MemoryHandle {
        let handle = MemoryHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        handle
    }

    /// Allocates `bytes` (rounded up to [`VIDEO_MEMORY_ALIGN`]) and returns the handle and the
    /// physical address. Fresh allocations are zero-filled.
    pub fn allocate(&mut self, bytes: u32) -> Result<(MemoryHandle, u32), VideoMemoryError> {
        if bytes == 0 {
            return Err(VideoMemoryError::ZeroSize);
        }
        let out_of_memory = VideoMemoryError::OutOfMemory {
            requested: bytes,
            free: self.bytes_free(),
        };
        let len = align_up(bytes, VIDEO_MEMORY_ALIGN).ok_or(out_of_memory.clone())?;

        let mut cursor = 0u32;
        let mut found = None;
        for (&offset, handle) in &self.allocated {
            if offset.checked_sub(cursor).is_some_and(|gap| gap >= len) {
                found = Some(cursor);
                break;
            }
            let region = self.regions[handle];
            cursor = align_up(region.offset + region.bytes, VIDEO_MEMORY_ALIGN)
                .ok_or(out_of_memory.clone())?;
        }
        let offset = match found {
            Some(offset) => offset,
            None if cursor.checked_add(len).is_some_and(|end| end <= self.size()) => cursor,
            None => return Err(out_of_memory),
        };

        let handle = self.next_handle();
        self.allocated.insert(offset, handle);
        self.regions.insert(handle, Region { offset, bytes: len });
        self.bytes[offset as usize..(offset + len) as usize].fill(0);

        let address = self.base + offset;
        debug!(handle = handle.0, address, bytes = len, "video memory allocated");
        Ok((handle, address))
    }

    pub fn free(&mut self, handle: MemoryHandle) -> Result<(), VideoMemoryError> {
        if self.mapped.remove(&handle).is_some() {
            return Ok(());
        }
        let region = self
            .regions
            .remove(&handle)
            .ok_or(VideoMemoryError::UnknownHandle(handle))?;
        self.allocated.remove(&region.offset);
        debug!(handle = handle.0, "video memory freed");
        Ok(())
    }

    /// Wraps an existing physical range in a handle without allocating.
    pub fn map(&mut self, address: u32, bytes: u32) -> Result<MemoryHandle, VideoMemoryError> {
        self.range(address, bytes)
            .ok_or(VideoMemoryError::OutOfRange { address, bytes })?;
        let handle = self.next_handle();
        self.mapped.insert(
            handle,
            Region {
                offset: address - self.base,
                bytes,
            },
        );
        Ok(handle)
    }

    /// Physical address and length of a live allocation or mapping.
    pub fn region(&self, handle: MemoryHandle) -> Option<(u32, u32)> {
        self.regions
            .get(&handle)
            .or_else(|| self.mapped.get(&handle))
            .map(|r| (self.base + r.offset, r.bytes))
    }

    fn range(&self, address: u32, bytes: u32) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(self.base)? as usize;
        let end = start.checked_add(bytes as usize)?;
        (end <= self.bytes.len()).then_some(start..end)
    }
}

impl MemoryBus for VideoMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        let range = u32::try_from(paddr)
            .ok()
            .and_then(|a| self.range(a, buf.len() as u32));
        match range {
            Some(range) => buf.copy_from_slice(&self.bytes[range]),
            None => {
                warn!(paddr, len = buf.len(), "video memory read out of range");
                buf.fill(0);
            }
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let range = u32::try_from(paddr)
            .ok()
            .and_then(|a| self.range(a, buf.len() as u32));
        match range {
            Some(range) => self.bytes[range].copy_from_slice(buf),
            None => warn!(paddr, len = buf.len(), "video memory write out of range"),
        }
    }
}
