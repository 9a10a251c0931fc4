//! User-space driver for VGLite vector GPUs.
//!
//! The driver never touches hardware directly. It encodes draws into command buffers (see
//! [`cmd`] and the wire format in [`vglite_protocol`]) and hands them to a [`VgKernel`], which
//! owns video memory and submission.
//!
//! Currently this crate provides:
//! - Pixel buffers, format validation and stride rules (see [`buffer`] and [`format`]).
//! - Rectangle clears, image blits, two-source blits and pattern fills (see [`draw`]).
//! - Path encoding and fills with solid colors (see [`path`]).
//! - Dashed strokes, flattened into fill outlines on the CPU (see [`stroke`]).
//! - Linear, radial and legacy gradients baked into ramp images (see [`gradient`]).
//! - Scissor rectangles and mask layers (see [`mask`]).
//!
//! Everything hangs off a [`RenderContext`].
#![forbid(unsafe_code)]

pub mod buffer;
pub mod cmd;
pub mod config;
pub mod context;
pub mod draw;
pub mod error;
pub mod format;
pub mod gradient;
pub mod mask;
pub mod matrix;
pub mod path;
pub mod steps;
pub mod stroke;
pub mod target;

pub use buffer::{PixelBuffer, PlaneData, Tiling};
pub use config::{Capabilities, DriverConfig, Feature};
pub use context::{FrameFlag, RenderContext};
pub use draw::{PatternMode, Rect};
pub use error::{VgError, VgResult};
pub use format::{BlendMode, BufferFormat, Filter, ImageMode, Transparency};
pub use gradient::{
    ColorStop, LegacyGradient, LinearGradient, LinearParams, RadialGradient, RadialParams,
    SpreadMode,
};
pub use mask::MaskOperation;
pub use matrix::{Matrix3x3, Point};
pub use path::{FillRule, PathFormat, PathOp, Quality, VgPath};
pub use stroke::{CapStyle, JoinStyle, PathType, StrokeStyle};
pub use target::{ColorKey, GammaConversion, GlobalAlpha, Orientation, PixelChannels};

pub use vglite_kernel::VgKernel;

#[cfg(test)]
pub(crate) mod testutil {
    use vglite_kernel::SimulatedKernel;
    use vglite_protocol::VgCmdStreamIter;

    use crate::config::DriverConfig;
    use crate::context::RenderContext;

    pub fn context(config: DriverConfig) -> RenderContext<SimulatedKernel> {
        RenderContext::init(SimulatedKernel::default(), config).expect("driver init")
    }

    /// Every `(address, value)` register write in `stream`, in order.
    pub fn register_writes(stream: &[u8]) -> Vec<(u32, u32)> {
        VgCmdStreamIter::new(stream)
            .expect("aligned stream")
            .map(|record| record.expect("well-formed record"))
            .flat_map(|record| record.register_writes())
            .collect()
    }
}
