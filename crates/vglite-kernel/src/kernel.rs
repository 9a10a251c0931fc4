use thiserror::Error;

use crate::memory::{MemoryBus, MemoryHandle, VideoMemoryError};

/// `Wait` timeout meaning "no deadline".
pub const VG_LITE_INFINITE: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of video memory: requested {requested} bytes, {free} bytes free")]
    OutOfMemory { requested: u32, free: u32 },
    #[error("wait timed out after {0} ms")]
    Timeout(u32),
    #[error("operation not supported by the kernel: {0}")]
    NotSupported(&'static str),
    #[error("kernel I/O failure: {0}")]
    GenericIo(String),
}

impl From<VideoMemoryError> for KernelError {
    fn from(err: VideoMemoryError) -> Self {
        match err {
            VideoMemoryError::OutOfMemory { requested, free } => {
                KernelError::OutOfMemory { requested, free }
            }
            other => KernelError::InvalidArgument(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Clean,
    Invalidate,
    Flush,
}

/// Geometry of the tessellation buffer and its two cache levels.
///
/// Sizes follow the GC355 layout: the window is padded to 128x16, each row holds 8 bytes per
/// pixel, every L1 bit covers 64 bytes of tessellation data and every L2 bit covers 32 bytes of
/// L1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TessellationBuffer {
    pub address: u32,
    pub width: u32,
    pub height: u32,
    /// 3 when the window is a whole number of 128x16 tiles, else 2.
    pub tiled: u32,
    pub stride: u32,
    pub buffer_bytes: u32,
    pub l1_bytes: u32,
    pub l2_bytes: u32,
}

const fn align(v: u32, a: u32) -> u32 {
    (v + a - 1) & !(a - 1)
}

impl TessellationBuffer {
    pub const fn geometry(tess_width: u32, tess_height: u32) -> Self {
        let width = align(tess_width, 128);
        let height = align(tess_height, 16);
        let tiled = if width % 128 == 0 && height % 16 == 0 { 3 } else { 2 };
        let stride = align(width * 8, 64);
        let buffer_bytes = align(stride * height, 64);
        let l1_bytes = align(align(buffer_bytes / 64, 64) / 8, 64);
        let l2_bytes = align(align(l1_bytes / 32, 64) / 8, 64);
        Self {
            address: 0,
            width,
            height,
            tiled,
            stride,
            buffer_bytes,
            l1_bytes,
            l2_bytes,
        }
    }

    pub const fn total_bytes(&self) -> u32 {
        self.buffer_bytes + self.l1_bytes + self.l2_bytes
    }

    pub const fn l1_address(&self) -> u32 {
        self.address + self.buffer_bytes
    }

    pub const fn l2_address(&self) -> u32 {
        self.l1_address() + self.l1_bytes
    }

    /// Size of the deepest cache level, programmed as `TESS_SIZE / 64`.
    pub const fn tess_size(&self) -> u32 {
        if self.l2_bytes != 0 {
            self.l2_bytes
        } else {
            self.l1_bytes
        }
    }

    /// `width | height << 16`.
    pub const fn window(&self) -> u32 {
        self.width | (self.height << 16)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInit {
    /// Physical address of each command buffer.
    pub command_buffers: Vec<u32>,
    pub tessellation: TessellationBuffer,
}

/// One kernel call. Each variant carries its parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelRequest {
    Initialize {
        command_buffer_size: u32,
        command_buffer_count: u32,
        tess_width: u32,
        tess_height: u32,
    },
    Terminate,
    Allocate {
        bytes: u32,
        contiguous: bool,
    },
    Free {
        handle: MemoryHandle,
    },
    Map {
        bytes: u32,
        physical: u32,
    },
    Unmap {
        handle: MemoryHandle,
    },
    /// Bytes of one filled command buffer, including its `END` record.
    Submit {
        command_id: u32,
        commands: Vec<u8>,
    },
    Wait {
        timeout_ms: u32,
        event_mask: u32,
    },
    Check {
        address: u32,
    },
    FlexaEnable,
    FlexaDisable,
    FlexaSetBackgroundAddress {
        address: u32,
    },
    FlexaStopFrame,
    Reset,
    QueryMem,
    CacheOp {
        handle: MemoryHandle,
        op: CacheOp,
    },
}

impl KernelRequest {
    pub fn name(&self) -> &'static str {
        match self {
            KernelRequest::Initialize { .. } => "initialize",
            KernelRequest::Terminate => "terminate",
            KernelRequest::Allocate { .. } => "allocate",
            KernelRequest::Free { .. } => "free",
            KernelRequest::Map { .. } => "map",
            KernelRequest::Unmap { .. } => "unmap",
            KernelRequest::Submit { .. } => "submit",
            KernelRequest::Wait { .. } => "wait",
            KernelRequest::Check { .. } => "check",
            KernelRequest::FlexaEnable => "flexa_enable",
            KernelRequest::FlexaDisable => "flexa_disable",
            KernelRequest::FlexaSetBackgroundAddress { .. } => "flexa_set_background_address",
            KernelRequest::FlexaStopFrame => "flexa_stop_frame",
            KernelRequest::Reset => "reset",
            KernelRequest::QueryMem => "query_mem",
            KernelRequest::CacheOp { .. } => "cache_op",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelReply {
    Done,
    Initialized(KernelInit),
    Allocated { handle: MemoryHandle, address: u32 },
    Mapped { handle: MemoryHandle },
    Value(u32),
    MemFree { bytes_free: u32 },
}

/// Boundary between the user-space driver and the privileged GPU driver.
///
/// Every call goes through [`VgKernel::dispatch`]. Implementations also expose the GPU-visible
/// memory through [`MemoryBus`] so the driver can upload pixels and path data and read back
/// render targets.
pub trait VgKernel {
    fn dispatch(&mut self, request: KernelRequest) -> Result<KernelReply, KernelError>;

    fn memory(&mut self) -> &mut dyn MemoryBus;
}

fn unexpected(request: &'static str, reply: &KernelReply) -> KernelError {
    KernelError::GenericIo(format!("unexpected reply to {request}: {reply:?}"))
}

/// Typed helpers over [`VgKernel::dispatch`].
pub trait VgKernelExt: VgKernel {
    fn allocate(&mut self, bytes: u32, contiguous: bool) -> Result<(MemoryHandle, u32), KernelError> {
        match self.dispatch(KernelRequest::Allocate { bytes, contiguous })? {
            KernelReply::Allocated { handle, address } => Ok((handle, address)),
            other => Err(unexpected("allocate", &other)),
        }
    }

    fn free(&mut self, handle: MemoryHandle) -> Result<(), KernelError> {
        self.dispatch(KernelRequest::Free { handle }).map(|_| ())
    }

    fn map(&mut self, bytes: u32, physical: u32) -> Result<MemoryHandle, KernelError> {
        match self.dispatch(KernelRequest::Map { bytes, physical })? {
            KernelReply::Mapped { handle } => Ok(handle),
            other => Err(unexpected("map", &other)),
        }
    }

    fn check(&mut self, address: u32) -> Result<u32, KernelError> {
        match self.dispatch(KernelRequest::Check { address })? {
            KernelReply::Value(value) => Ok(value),
            other => Err(unexpected("check", &other)),
        }
    }

    fn query_mem(&mut self) -> Result<u32, KernelError> {
        match self.dispatch(KernelRequest::QueryMem)? {
            KernelReply::MemFree { bytes_free } => Ok(bytes_free),
            other => Err(unexpected("query_mem", &other)),
        }
    }
}

impl<K: VgKernel + ?Sized> VgKernelExt for K {}
