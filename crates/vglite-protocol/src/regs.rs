//! Register addresses written through `STATE` records, plus the bitfields the driver and the
//! reference executor agree on.

/// Draw control: paint type, image mode, blend, premultiply and scissor/mask enables.
pub const CONTROL: u32 = 0x0A00;
/// Origin of the current tessellation window (`x | y << 16`).
pub const TESS_ORIGIN: u32 = 0x0A01;
/// Solid color / modulation color, `0xAABBGGRR`.
pub const COLOR: u32 = 0x0A02;
/// Radial gradient `step_xx` term.
pub const RADIAL_STEP_XX: u32 = 0x0A03;
pub const LINEAR_CONSTANT: u32 = 0x0A04;
pub const RADIAL_CONSTANT: u32 = 0x0A05;
pub const LINEAR_STEP_X: u32 = 0x0A06;
pub const RADIAL_STEP_X: u32 = 0x0A07;
pub const LINEAR_STEP_Y: u32 = 0x0A08;
pub const RADIAL_STEP_Y: u32 = 0x0A09;
pub const RADIAL_STEP_YY: u32 = 0x0A0A;
pub const RADIAL_STEP_XY: u32 = 0x0A0B;

pub const TARGET_CONFIG: u32 = 0x0A10;
pub const TARGET_ADDRESS: u32 = 0x0A11;
pub const TARGET_STRIDE: u32 = 0x0A12;
/// Scissor box extent (`right | bottom << 16`), or the target size when no box is set.
pub const TARGET_EXTENT: u32 = 0x0A13;
pub const MASK_ADDRESS: u32 = 0x0A14;
pub const MASK_STRIDE: u32 = 0x0A15;
pub const SCISSOR_LAYER_ADDRESS: u32 = 0x0A16;
pub const SCISSOR_LAYER_STRIDE: u32 = 0x0A17;
/// Sampling step constants `c0..c2`.
pub const STEP_C: u32 = 0x0A18;
/// Cache flush control.
pub const FLUSH: u32 = 0x0A1B;
/// Sampling step x coefficients `x0..x2`.
pub const STEP_X: u32 = 0x0A1C;
pub const STEP_ENABLE: u32 = 0x0A1F;
/// Sampling step y coefficients `y0..y2`.
pub const STEP_Y: u32 = 0x0A20;

pub const PAINT_CONFIG: u32 = 0x0A24;
pub const IMAGE_CONFIG: u32 = 0x0A25;
pub const PAINT_COLOR: u32 = 0x0A26;
pub const IMAGE_COLOR: u32 = 0x0A27;
pub const PAINT_ADDRESS: u32 = 0x0A28;
pub const IMAGE_ADDRESS: u32 = 0x0A29;
pub const PAINT_STRIDE: u32 = 0x0A2A;
pub const IMAGE_STRIDE: u32 = 0x0A2B;
pub const PAINT_ORIGIN: u32 = 0x0A2C;
pub const IMAGE_ORIGIN: u32 = 0x0A2D;
pub const PAINT_SIZE: u32 = 0x0A2E;
pub const IMAGE_SIZE: u32 = 0x0A2F;

/// Tessellation buffer as seen by the VG module: base, L1, L2 and row stride.
pub const TESS_BUFFER_ADDRESS: u32 = 0x0A30;
pub const TESS_L1_ADDRESS: u32 = 0x0A31;
pub const TESS_L2_ADDRESS: u32 = 0x0A32;
pub const TESS_STRIDE: u32 = 0x0A33;
/// Path control. Zero means "not drawing a path"; rectangles are only executed while it is zero.
pub const PATH_CONTROL: u32 = 0x0A34;
/// Tessellation buffer as seen by the TS module.
pub const TS_BUFFER_ADDRESS: u32 = 0x0A35;
pub const TS_L1_ADDRESS: u32 = 0x0A36;
pub const TS_L2_ADDRESS: u32 = 0x0A37;
pub const TS_STRIDE: u32 = 0x0A38;
pub const TESS_WINDOW: u32 = 0x0A39;
/// Tessellation window size (`width | height << 16`).
pub const TESS_WINDOW_SIZE: u32 = 0x0A3A;
pub const TESS_SCALE: u32 = 0x0A3B;
pub const TESS_BIAS: u32 = 0x0A3C;
pub const TESS_SIZE: u32 = 0x0A3D;
/// First of six path matrix registers (`m00 m01 m02 m10 m11 m12`).
pub const PATH_MATRIX: u32 = 0x0A40;

pub const PAINT_UV_ADDRESS: u32 = 0x0A50;
pub const IMAGE_UV_ADDRESS: u32 = 0x0A51;
pub const PAINT_V_ADDRESS: u32 = 0x0A52;
pub const IMAGE_V_ADDRESS: u32 = 0x0A53;
pub const TARGET_UV_ADDRESS: u32 = 0x0A5C;
pub const TARGET_ALPHA_ADDRESS: u32 = 0x0A5D;

/// Sampling steps of the paint image in double-image draws, laid out like `STEP_X`,
/// `STEP_Y` and `STEP_C`.
pub const PAINT_STEP_X: u32 = 0x0A7C;
pub const PAINT_STEP_Y: u32 = 0x0A80;
pub const PAINT_STEP_C: u32 = 0x0A84;

/// Register block of one sampling unit. Rectangle draws read the image sampler; double-image
/// draws also read the paint sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerRegs {
    pub config: u32,
    pub color: u32,
    pub address: u32,
    pub stride: u32,
    pub origin: u32,
    pub size: u32,
    pub uv_address: u32,
    pub v_address: u32,
    pub step_c: u32,
    pub step_x: u32,
    pub step_y: u32,
}

pub const IMAGE_SAMPLER: SamplerRegs = SamplerRegs {
    config: IMAGE_CONFIG,
    color: IMAGE_COLOR,
    address: IMAGE_ADDRESS,
    stride: IMAGE_STRIDE,
    origin: IMAGE_ORIGIN,
    size: IMAGE_SIZE,
    uv_address: IMAGE_UV_ADDRESS,
    v_address: IMAGE_V_ADDRESS,
    step_c: STEP_C,
    step_x: STEP_X,
    step_y: STEP_Y,
};

pub const PAINT_SAMPLER: SamplerRegs = SamplerRegs {
    config: PAINT_CONFIG,
    color: PAINT_COLOR,
    address: PAINT_ADDRESS,
    stride: PAINT_STRIDE,
    origin: PAINT_ORIGIN,
    size: PAINT_SIZE,
    uv_address: PAINT_UV_ADDRESS,
    v_address: PAINT_V_ADDRESS,
    step_c: PAINT_STEP_C,
    step_x: PAINT_STEP_X,
    step_y: PAINT_STEP_Y,
};

/// Color key `i` is written to `COLOR_KEY_LOW + i` (`E/R/G/B`) and `COLOR_KEY_HIGH + i`
/// (`A/R/G/B`).
pub const COLOR_KEY_LOW: u32 = 0x0A90;
pub const COLOR_KEY_HIGH: u32 = 0x0A94;
pub const DITHER_LOW: u32 = 0x0A5A;
pub const DITHER_HIGH: u32 = 0x0A5B;
pub const FLEXA_CONTROL: u32 = 0x0AC8;
pub const GLOBAL_ALPHA: u32 = 0x0AD1;
pub const GAUSSIAN_W0: u32 = 0x0AD3;
pub const GAUSSIAN_W1: u32 = 0x0AD5;
pub const GAUSSIAN_W2: u32 = 0x0AD7;
pub const PIXEL_MATRIX: u32 = 0x0ADE;
pub const CLUT: u32 = 0x0B00;

pub mod control {
    /// Rectangle draw through the image unit.
    pub const RECTANGLE: u32 = 1 << 0;
    /// Path draw with a paint unit (pattern or gradient).
    pub const PAINT: u32 = 1 << 1;
    pub const SCISSOR_ENABLE: u32 = 1 << 4;
    pub const TRANSPARENCY: u32 = 0x8000;
    /// Image mode field. Zero selects a solid fill.
    pub const IMAGE_MODE_MASK: u32 = 0x3000;
    pub const IMAGE_MODE_NORMAL: u32 = 0x1000;
    pub const IMAGE_MODE_MULTIPLY: u32 = 0x2000;
    /// Two-source draw: the image is composited over the paint image before blending.
    pub const IMAGE_MODE_DOUBLE: u32 = 0x5000;
    /// Full image mode field, including the recolor and double-image encodings.
    pub const IMAGE_MODE_FIELD: u32 = 0x7000;
    pub const BLEND_MASK: u32 = 0x0F00;
    /// Rectangle written in tiled order (tiled targets only).
    pub const TILED_OUTPUT: u32 = 0x40;
    pub const MASK_ENABLE: u32 = 1 << 20;
    pub const PAINT_PATTERN: u32 = (1 << 24) | (1 << 25);
    pub const PAINT_LINEAR_GRADIENT: u32 = 1 << 24;
    pub const PAINT_RADIAL_GRADIENT: u32 = 1 << 25;
    pub const IN_PREMULTIPLY: u32 = 0x1000_0000;
    pub const STRIPE_MODE: u32 = 0x2000_0000;
}

pub mod blend {
    pub const NONE: u32 = 0x0000;
    pub const SRC_OVER: u32 = 0x0100;
    pub const DST_OVER: u32 = 0x0200;
    pub const SRC_IN: u32 = 0x0300;
    pub const DST_IN: u32 = 0x0400;
    pub const MULTIPLY: u32 = 0x0500;
    pub const SCREEN: u32 = 0x0600;
    pub const DARKEN: u32 = 0x0700;
    pub const LIGHTEN: u32 = 0x0800;
    pub const ADDITIVE: u32 = 0x0900;
    pub const SUBTRACT: u32 = 0x0A00;
}

pub mod target {
    pub const FLEXA: u32 = 1 << 7;
    pub const PREMULTIPLY_DST: u32 = 0x100;
    pub const ALPHA_DIVIDE: u32 = 0x200;
    pub const MIRROR: u32 = 1 << 16;
    pub const READ_DESTINATION: u32 = 0x0010_0000;
    pub const COMPRESS_SHIFT: u32 = 25;
    /// Gamma value field; `set_gamma` values are shifted here.
    pub const GAMMA_SHIFT: u32 = 12;
    pub const TILED_STRIDE: u32 = 0x1000_0000;
}

pub mod image {
    pub const FILTER_POINT: u32 = 0;
    pub const FILTER_LINEAR: u32 = 0x1_0000;
    pub const FILTER_BILINEAR: u32 = 0x2_0000;
    pub const FILTER_GAUSSIAN: u32 = 0x3_0000;
    pub const FILTER_MASK: u32 = 0x3_0000;
    pub const TILE_PAD: u32 = 0x1000;
    pub const TILE_REPEAT: u32 = 0x2000;
    pub const TILE_REFLECT: u32 = 0x3000;
    pub const SRC_PREMULTIPLY: u32 = 0x0100_0100;
    pub const SRC_PREMULTIPLY_OUT: u32 = 0x100;
    pub const LUMINANCE_CONVERSION: u32 = 0x8000_0000;
    pub const TILED_STRIDE: u32 = 0x1000_0000;
    /// Source format code field.
    pub const FORMAT_MASK: u32 = 0x3F;
}

pub mod flush {
    pub const TARGET: u32 = 0x11;
    pub const MASK_LAYER: u32 = 0x10;
    pub const SCISSOR_LAYER: u32 = 0x100;
    pub const TESSELLATION: u32 = 0x0001_1000;
}

pub mod path {
    pub const BASE_DRAW: u32 = 0x0100_0200;
    pub const BASE_PAINT: u32 = 0x0100_0400;
    pub const FORMAT_S8: u32 = 0;
    pub const FORMAT_S16: u32 = 0x10_0000;
    pub const FORMAT_S32: u32 = 0x20_0000;
    pub const FORMAT_FP32: u32 = 0x30_0000;
    pub const QUALITY_LOW: u32 = 0;
    pub const QUALITY_MEDIUM: u32 = 1;
    pub const QUALITY_UPPER: u32 = 2;
    pub const QUALITY_HIGH: u32 = 3;
    pub const FILL_EVEN_ODD: u32 = 0x10;
    pub const TILED_TESSELLATION: u32 = 0x200_0000;
    /// `TESS_SCALE` value: 1.0f.
    pub const UNIT_SCALE: u32 = 0x3F80_0000;
}
