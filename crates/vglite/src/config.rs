use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{VgError, VgResult};

pub const DEFAULT_COMMAND_BUFFER_SIZE: u32 = 32 << 10;
pub const DEFAULT_SINGLE_COMMAND_BUFFER_SIZE: u32 = 64 << 10;
pub const DEFAULT_TESS_WIDTH: u32 = 128;
pub const DEFAULT_TESS_HEIGHT: u32 = 128;
pub const MIN_TESS_SIZE: u32 = 16;
/// GC355, the part whose tessellation layout the kernel programs.
pub const DEFAULT_CHIP_ID: u32 = 0x355;

bitflags! {
    /// Hardware features the driver may use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const YUV_OUTPUT = 1 << 0;
        const RGB888_TARGET = 1 << 1;
        const PIXELS_16_ALIGNED = 1 << 2;
        const IM_FASTCLEAR = 1 << 3;
        const DEC_COMPRESS = 1 << 4;
        /// The front end does not need a stall after `CALL`.
        const CALL_FIX = 1 << 5;
        const GAMMA = 1 << 6;
        const GLOBAL_ALPHA = 1 << 7;
        const COLOR_KEY = 1 << 8;
        const PIXEL_MATRIX = 1 << 9;
        const GAUSSIAN_BLUR = 1 << 10;
        const INDEX_FORMAT = 1 << 11;
        const YUV_INPUT = 1 << 12;
        const MASK = 1 << 13;
        const MIRROR = 1 << 14;
        const RADIAL_GRADIENT = 1 << 15;
        const LINEAR_GRADIENT = 1 << 16;
        const SCISSOR_LAYER = 1 << 17;
        const STRIPE_MODE = 1 << 18;
        const FLEXA = 1 << 19;
        const TILED = 1 << 20;
        const PREMULTIPLY = 1 << 21;
        const DITHER = 1 << 22;
        /// Two-source composition in one rectangle pass.
        const DOUBLE_IMAGE = 1 << 23;
        const STROKE_PATH = 1 << 24;
    }
}

impl Default for Capabilities {
    /// Feature set of a GC355-class part.
    fn default() -> Self {
        Capabilities::GAMMA
            | Capabilities::GLOBAL_ALPHA
            | Capabilities::COLOR_KEY
            | Capabilities::PIXEL_MATRIX
            | Capabilities::GAUSSIAN_BLUR
            | Capabilities::INDEX_FORMAT
            | Capabilities::YUV_INPUT
            | Capabilities::MASK
            | Capabilities::MIRROR
            | Capabilities::RADIAL_GRADIENT
            | Capabilities::LINEAR_GRADIENT
            | Capabilities::SCISSOR_LAYER
            | Capabilities::TILED
            | Capabilities::PREMULTIPLY
            | Capabilities::RGB888_TARGET
            | Capabilities::DOUBLE_IMAGE
            | Capabilities::STROKE_PATH
    }
}

/// Feature ids accepted by [`crate::RenderContext::query_feature`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    YuvOutput = 0,
    Rgb888Target = 1,
    Pixels16Aligned = 2,
    ImFastClear = 3,
    DecCompress = 4,
    CallFix = 5,
    Gamma = 6,
    GlobalAlpha = 7,
    ColorKey = 8,
    PixelMatrix = 9,
    GaussianBlur = 10,
    IndexFormat = 11,
    YuvInput = 12,
    Mask = 13,
    Mirror = 14,
    RadialGradient = 15,
    LinearGradient = 16,
    ScissorLayer = 17,
    StripeMode = 18,
    Flexa = 19,
    Tiled = 20,
    Premultiply = 21,
    Dither = 22,
    DoubleImage = 23,
    StrokePath = 24,
}

impl Feature {
    pub const fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Feature::YuvOutput,
            1 => Feature::Rgb888Target,
            2 => Feature::Pixels16Aligned,
            3 => Feature::ImFastClear,
            4 => Feature::DecCompress,
            5 => Feature::CallFix,
            6 => Feature::Gamma,
            7 => Feature::GlobalAlpha,
            8 => Feature::ColorKey,
            9 => Feature::PixelMatrix,
            10 => Feature::GaussianBlur,
            11 => Feature::IndexFormat,
            12 => Feature::YuvInput,
            13 => Feature::Mask,
            14 => Feature::Mirror,
            15 => Feature::RadialGradient,
            16 => Feature::LinearGradient,
            17 => Feature::ScissorLayer,
            18 => Feature::StripeMode,
            19 => Feature::Flexa,
            20 => Feature::Tiled,
            21 => Feature::Premultiply,
            22 => Feature::Dither,
            23 => Feature::DoubleImage,
            24 => Feature::StrokePath,
            _ => return None,
        })
    }

    /// The capability bit this feature id reports.
    pub const fn capability(self) -> Capabilities {
        Capabilities::from_bits_retain(1 << self as u32)
    }
}

mod capability_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Capabilities;

    pub fn serialize<S: Serializer>(caps: &Capabilities, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(caps.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Capabilities, D::Error> {
        let bits = u32::deserialize(d)?;
        Capabilities::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown capability bits {bits:#x}")))
    }
}

/// Driver start-up parameters.
///
/// Every field has a default, so embedders may load a partial JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Bytes per command buffer. `None` picks the default for the buffering mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_buffer_size: Option<u32>,
    /// Encode into one command buffer and stall on every submission.
    pub single_command_buffer: bool,
    pub tess_width: u32,
    pub tess_height: u32,
    /// Product id of the GPU. A few format restrictions and the mirror polarity depend on it.
    pub chip_id: u32,
    #[serde(with = "capability_bits")]
    pub capabilities: Capabilities,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: None,
            single_command_buffer: false,
            tess_width: DEFAULT_TESS_WIDTH,
            tess_height: DEFAULT_TESS_HEIGHT,
            chip_id: DEFAULT_CHIP_ID,
            capabilities: Capabilities::default(),
        }
    }
}

impl DriverConfig {
    pub fn command_buffer_size(&self) -> u32 {
        match self.command_buffer_size {
            Some(size) => size,
            None if self.single_command_buffer => DEFAULT_SINGLE_COMMAND_BUFFER_SIZE,
            None => DEFAULT_COMMAND_BUFFER_SIZE,
        }
    }

    pub fn is_gc355(&self) -> bool {
        self.chip_id == 0x355
    }

    /// ETC2 images must be a whole number of blocks; one part needs 16-pixel wide rows.
    pub fn etc2_block_width(&self) -> u32 {
        if self.chip_id == 0x555 {
            16
        } else {
            4
        }
    }

    pub fn command_buffer_count(&self) -> u32 {
        if self.single_command_buffer {
            1
        } else {
            2
        }
    }

    /// Tessellation window: at least 16x16, rounded down to a multiple of 16.
    pub fn tessellation_window(&self) -> (u32, u32) {
        let clamp = |v: u32| v.max(MIN_TESS_SIZE) & !(MIN_TESS_SIZE - 1);
        (clamp(self.tess_width), clamp(self.tess_height))
    }

    pub fn validate(&self) -> VgResult<()> {
        let size = self.command_buffer_size();
        if size < 64 || size % 8 != 0 {
            return Err(VgError::invalid(format!(
                "command buffer size {size} must be a multiple of 8 and at least 64 bytes"
            )));
        }
        Ok(())
    }
}
