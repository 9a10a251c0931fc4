//! Kernel side of the VGLite driver.
//!
//! The user-space driver talks to the GPU through a single dispatch entry point,
//! [`VgKernel::dispatch`], and reaches GPU-visible memory through [`MemoryBus`].
//!
//! [`SimulatedKernel`] implements that boundary in-process: it owns a [`VideoMemory`] pool and
//! runs every submitted command buffer through [`CommandExecutor`], which rasterizes rectangle
//! clears and image blits so tests can read rendered pixels back.
#![forbid(unsafe_code)]

pub mod exec;
pub mod kernel;
pub mod memory;
pub mod pixel;
pub mod sim;

pub use exec::{blend_pixel, CommandExecutor, ExecError, ExecStats, RegisterFile};
pub use kernel::{
    CacheOp, KernelError, KernelInit, KernelReply, KernelRequest, TessellationBuffer, VgKernel,
    VgKernelExt, VG_LITE_INFINITE,
};
pub use memory::{MemoryBus, MemoryHandle, VideoMemory, VideoMemoryError, VIDEO_MEMORY_ALIGN};
pub use pixel::{PixelLayout, Rgba8};
pub use sim::{FlexaState, SimulatedKernel, Submission, SIM_DEFAULT_MEMORY_BYTES, SIM_MEMORY_BASE};
