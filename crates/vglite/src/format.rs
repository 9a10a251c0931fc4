//! Pixel formats and the hardware encodings of every enumerated draw parameter.
//!
//! Every lookup here is total over its enum. Format codes that have no target or source
//! encoding return [`UNSUPPORTED_FORMAT`], which callers check before emitting a record.

use vglite_protocol::regs;

use crate::buffer::{PixelBuffer, Tiling};
use crate::config::Capabilities;
use crate::error::{VgError, VgResult};

/// Sentinel returned by [`BufferFormat::target_code`] and [`BufferFormat::source_code`].
pub const UNSUPPORTED_FORMAT: u32 = 0xFF;

/// Channel layouts of the portable (OpenVG-style) image formats.
///
/// Names list channels from the most significant bit down, so `Rgba8888` stores red in the top
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortableLayout {
    Rgbx8888,
    Rgba8888,
    Rgb565,
    Rgba5551,
    Rgba4444,
    L8,
    A8,
    Bw1,
    A4,
    A1,
    Xrgb8888,
    Argb8888,
    Argb1555,
    Argb4444,
    Bgrx8888,
    Bgra8888,
    Bgr565,
    Bgra5551,
    Bgra4444,
    Xbgr8888,
    Abgr8888,
    Abgr1555,
    Abgr4444,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VgImageFormat {
    pub layout: PortableLayout,
    /// Linear (`l*`) rather than sRGB (`s*`) color space.
    pub linear: bool,
    /// The `_PRE` variants store premultiplied color.
    pub premultiplied: bool,
}

impl VgImageFormat {
    pub const fn new(layout: PortableLayout) -> Self {
        Self {
            layout,
            linear: false,
            premultiplied: false,
        }
    }

    pub const fn premultiplied(layout: PortableLayout) -> Self {
        Self {
            layout,
            linear: false,
            premultiplied: true,
        }
    }
}

/// Pixel formats known to the driver.
///
/// Native names list channels from the least significant bit up: `Argb8888` keeps alpha in byte
/// 0. `Portable` formats are translated to their native equivalent before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Rgba8888,
    Bgra8888,
    Rgbx8888,
    Bgrx8888,
    Rgb565,
    Bgr565,
    Rgba4444,
    Bgra4444,
    Bgra5551,
    A4,
    A8,
    L8,
    Yuyv,
    Yuy2,
    Nv12,
    Anv12,
    Ayuy2,
    Yv12,
    Yv24,
    Yv16,
    Nv16,
    Nv24,
    Yuy2Tiled,
    Nv12Tiled,
    Anv12Tiled,
    Ayuy2Tiled,
    Nv24Tiled,
    Index1,
    Index2,
    Index4,
    Index8,
    Rgba2222,
    Bgra2222,
    Abgr2222,
    Argb2222,
    Abgr4444,
    Argb4444,
    Abgr8888,
    Argb8888,
    Abgr1555,
    Rgba5551,
    Argb1555,
    Xbgr8888,
    Xrgb8888,
    Etc2,
    Rgb888,
    Bgr888,
    Abgr8565,
    Bgra5658,
    Argb8565,
    Rgba5658,
    Abgr8565Planar,
    Bgra5658Planar,
    Argb8565Planar,
    Rgba5658Planar,
    Portable(VgImageFormat),
}

/// Bytes per pixel as `mul / div`, plus the stride alignment in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatBytes {
    pub mul: u32,
    pub div: u32,
    pub align: u32,
}

impl FormatBytes {
    const fn new(mul: u32, div: u32, align: u32) -> Self {
        Self { mul, div, align }
    }

    /// Bytes covered by `pixels` whole pixels, rounded down.
    pub const fn bytes_for(&self, pixels: u32) -> u32 {
        pixels * self.mul / self.div
    }

    /// Byte multiple covering `pixels` pixels, at least 1.
    pub const fn pixel_multiple(&self, pixels: u32) -> u32 {
        let v = pixels * self.mul / self.div;
        if v == 0 {
            1
        } else {
            v
        }
    }

    pub fn bits_per_pixel(&self) -> f32 {
        8.0 * self.mul as f32 / self.div as f32
    }
}

/// Bit-depth class used by the target alignment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthClass {
    SubByte,
    Packed,
    Rgb24,
    Planar24,
    Yuv,
}

impl PortableLayout {
    const fn native(self) -> BufferFormat {
        use BufferFormat as F;
        match self {
            PortableLayout::Rgbx8888 => F::Xbgr8888,
            PortableLayout::Rgba8888 => F::Abgr8888,
            PortableLayout::Rgb565 => F::Bgr565,
            PortableLayout::Rgba5551 => F::Abgr1555,
            PortableLayout::Rgba4444 => F::Abgr4444,
            PortableLayout::L8 => F::L8,
            PortableLayout::A8 => F::A8,
            PortableLayout::Bw1 => F::Index1,
            PortableLayout::A4 | PortableLayout::A1 => F::A4,
            PortableLayout::Xrgb8888 => F::Bgrx8888,
            PortableLayout::Argb8888 => F::Bgra8888,
            PortableLayout::Argb1555 => F::Bgra5551,
            PortableLayout::Argb4444 => F::Bgra4444,
            PortableLayout::Bgrx8888 => F::Xrgb8888,
            PortableLayout::Bgra8888 => F::Argb8888,
            PortableLayout::Bgr565 => F::Rgb565,
            PortableLayout::Bgra5551 => F::Argb1555,
            PortableLayout::Bgra4444 => F::Argb4444,
            PortableLayout::Xbgr8888 => F::Rgbx8888,
            PortableLayout::Abgr8888 => F::Rgba8888,
            PortableLayout::Abgr1555 => F::Rgba5551,
            PortableLayout::Abgr4444 => F::Rgba4444,
        }
    }
}

impl BufferFormat {
    /// Native format with the same memory layout.
    pub const fn native(self) -> BufferFormat {
        match self {
            BufferFormat::Portable(vg) => vg.layout.native(),
            other => other,
        }
    }

    pub const fn is_portable(self) -> bool {
        matches!(self, BufferFormat::Portable(_))
    }

    /// Premultiplied storage is a property of the format alone.
    pub const fn is_premultiplied(self) -> bool {
        match self {
            BufferFormat::Portable(vg) => vg.premultiplied,
            _ => false,
        }
    }

    pub const fn format_bytes(self) -> FormatBytes {
        use BufferFormat as F;
        match self {
            F::L8 | F::A8 | F::Etc2 => FormatBytes::new(1, 1, 4),
            F::A4 => FormatBytes::new(1, 2, 4),
            F::Abgr1555
            | F::Argb1555
            | F::Bgra5551
            | F::Rgba5551
            | F::Rgba4444
            | F::Bgra4444
            | F::Abgr4444
            | F::Argb4444
            | F::Rgb565
            | F::Bgr565
            | F::Yuyv
            | F::Yuy2
            | F::Yuy2Tiled
            | F::Ayuy2
            | F::Ayuy2Tiled
            | F::Abgr8565Planar
            | F::Bgra5658Planar
            | F::Argb8565Planar
            | F::Rgba5658Planar => FormatBytes::new(2, 1, 4),
            F::Rgba8888
            | F::Bgra8888
            | F::Abgr8888
            | F::Argb8888
            | F::Rgbx8888
            | F::Bgrx8888
            | F::Xbgr8888
            | F::Xrgb8888
            | F::Anv12
            | F::Anv12Tiled => FormatBytes::new(4, 1, 4),
            F::Nv12 | F::Nv12Tiled => FormatBytes::new(1, 1, 4),
            F::Index1 => FormatBytes::new(1, 8, 8),
            F::Index2 => FormatBytes::new(1, 4, 8),
            F::Index4 => FormatBytes::new(1, 2, 8),
            F::Index8 => FormatBytes::new(1, 1, 1),
            F::Rgba2222 | F::Bgra2222 | F::Abgr2222 | F::Argb2222 => FormatBytes::new(1, 1, 4),
            F::Rgb888 | F::Bgr888 | F::Abgr8565 | F::Bgra5658 | F::Argb8565 | F::Rgba5658 => {
                FormatBytes::new(3, 1, 48)
            }
            F::Yv12 | F::Yv24 | F::Yv16 | F::Nv16 | F::Nv24 | F::Nv24Tiled => {
                FormatBytes::new(1, 1, 4)
            }
            F::Portable(vg) => match vg.layout {
                PortableLayout::L8 | PortableLayout::A8 => FormatBytes::new(1, 1, 4),
                PortableLayout::Bw1 | PortableLayout::A4 | PortableLayout::A1 => {
                    FormatBytes::new(1, 2, 4)
                }
                PortableLayout::Rgb565
                | PortableLayout::Rgba5551
                | PortableLayout::Rgba4444
                | PortableLayout::Argb1555
                | PortableLayout::Argb4444
                | PortableLayout::Bgr565
                | PortableLayout::Bgra5551
                | PortableLayout::Bgra4444
                | PortableLayout::Abgr1555
                | PortableLayout::Abgr4444 => FormatBytes::new(2, 1, 4),
                _ => FormatBytes::new(4, 1, 4),
            },
        }
    }

    /// Render-target format code for `TARGET_CONFIG`.
    pub const fn target_code(self) -> u32 {
        use BufferFormat as F;
        match self.native() {
            F::A8 => 0x00,
            F::L8 => 0x06,
            F::Abgr4444 => 0x14,
            F::Argb4444 => 0x34,
            F::Rgba4444 => 0x24,
            F::Bgra4444 => 0x04,
            F::Rgb565 => 0x21,
            F::Bgr565 => 0x01,
            F::Abgr8888 => 0x13,
            F::Argb8888 => 0x33,
            F::Rgba8888 => 0x23,
            F::Bgra8888 => 0x03,
            F::Rgbx8888 => 0x22,
            F::Bgrx8888 => 0x02,
            F::Xbgr8888 => 0x12,
            F::Xrgb8888 => 0x32,
            F::Abgr1555 => 0x15,
            F::Rgba5551 => 0x25,
            F::Argb1555 => 0x35,
            F::Bgra5551 => 0x05,
            F::Yuyv | F::Yuy2 | F::Yuy2Tiled => 0x08,
            F::Nv12 | F::Nv12Tiled => 0x0B,
            F::Anv12 | F::Anv12Tiled => 0x0E,
            F::Ayuy2 | F::Ayuy2Tiled => 0x0F,
            F::Bgra2222 => 0x07,
            F::Rgba2222 => 0x27,
            F::Abgr2222 => 0x17,
            F::Argb2222 => 0x37,
            F::Argb8565 => 0x3A,
            F::Rgba5658 => 0x2A,
            F::Abgr8565 => 0x1A,
            F::Bgra5658 => 0x0A,
            F::Argb8565Planar => 0x3C,
            F::Rgba5658Planar => 0x2C,
            F::Abgr8565Planar => 0x1C,
            F::Bgra5658Planar => 0x0C,
            F::Rgb888 => 0x29,
            F::Bgr888 => 0x09,
            _ => UNSUPPORTED_FORMAT,
        }
    }

    /// Image-source format code for `IMAGE_CONFIG` / `PAINT_CONFIG`.
    pub const fn source_code(self) -> u32 {
        use BufferFormat as F;
        if let F::Portable(vg) = self {
            match vg.layout {
                PortableLayout::Bw1 => return 0x200,
                PortableLayout::A1 | PortableLayout::A4 => return 0x1,
                _ => {}
            }
        }
        match self.native() {
            F::L8 => 0x0,
            F::A4 => 0x1,
            F::A8 => 0x2,
            F::Rgba4444 => 0x23,
            F::Bgra4444 => 0x03,
            F::Abgr4444 => 0x13,
            F::Argb4444 => 0x33,
            F::Rgb565 => 0x25,
            F::Bgr565 => 0x05,
            F::Rgba8888 => 0x27,
            F::Bgra8888 => 0x07,
            F::Abgr8888 => 0x17,
            F::Argb8888 => 0x37,
            F::Rgbx8888 => 0x26,
            F::Bgrx8888 => 0x06,
            F::Xbgr8888 => 0x16,
            F::Xrgb8888 => 0x36,
            F::Bgra5551 => 0x04,
            F::Rgba5551 => 0x24,
            F::Abgr1555 => 0x14,
            F::Argb1555 => 0x34,
            F::Yuyv | F::Yuy2 | F::Yuy2Tiled => 0x08,
            F::Nv12 | F::Nv12Tiled => 0x0B,
            F::Anv12 | F::Anv12Tiled => 0x0E,
            F::Yv12 => 0x09,
            F::Yv24 => 0x0D,
            F::Yv16 => 0x0C,
            F::Nv16 => 0x0A,
            F::Nv24 | F::Nv24Tiled => 0x0D | (1 << 19),
            F::Ayuy2 | F::Ayuy2Tiled => 0x0F,
            F::Index1 => 0x200,
            F::Index2 => 0x400,
            F::Index4 => 0x600,
            F::Index8 => 0x800,
            F::Rgba2222 => 0xA20,
            F::Bgra2222 => 0xA00,
            F::Abgr2222 => 0xA10,
            F::Argb2222 => 0xA30,
            F::Etc2 => 0xE00,
            F::Argb8565 => 0x4000_0030,
            F::Rgba5658 => 0x4000_0020,
            F::Abgr8565 => 0x4000_0010,
            F::Bgra5658 => 0x4000_0000,
            F::Rgb888 => 0x2000_0020,
            F::Bgr888 => 0x2000_0000,
            F::Argb8565Planar => 0x6000_0030,
            F::Rgba5658Planar => 0x6000_0020,
            F::Abgr8565Planar => 0x6000_0010,
            F::Bgra5658Planar => 0x6000_0000,
            F::Portable(_) => UNSUPPORTED_FORMAT,
        }
    }

    pub const fn is_packed_yuv(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Yuyv | F::Yuy2 | F::Yuy2Tiled | F::Ayuy2 | F::Ayuy2Tiled
        )
    }

    /// Formats stored as separate luma and chroma planes.
    pub const fn is_planar_yuv(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Nv12
                | F::Anv12
                | F::Nv12Tiled
                | F::Anv12Tiled
                | F::Nv16
                | F::Nv24
                | F::Nv24Tiled
                | F::Yv12
                | F::Yv16
                | F::Yv24
        )
    }

    pub const fn is_yuv(self) -> bool {
        self.is_packed_yuv() || self.is_planar_yuv()
    }

    /// Tiled YUV variants whose layout is fixed by the format.
    pub const fn is_tiled_yuv(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Yuy2Tiled | F::Nv12Tiled | F::Anv12Tiled | F::Ayuy2Tiled | F::Nv24Tiled
        )
    }

    /// Packed 24-bit formats stored 3 bytes per pixel.
    pub const fn is_24bit(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Rgb888 | F::Bgr888 | F::Abgr8565 | F::Bgra5658 | F::Argb8565 | F::Rgba5658
        )
    }

    /// 16-bit color plane plus a separate 8-bit alpha plane.
    pub const fn is_planar_24bit(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Abgr8565Planar | F::Bgra5658Planar | F::Argb8565Planar | F::Rgba5658Planar
        )
    }

    pub const fn is_indexed(self) -> bool {
        use BufferFormat as F;
        matches!(self.native(), F::Index1 | F::Index2 | F::Index4 | F::Index8)
    }

    /// Number of palette entries an indexed format addresses.
    pub const fn clut_entries(self) -> Option<u32> {
        use BufferFormat as F;
        match self.native() {
            F::Index1 => Some(2),
            F::Index2 => Some(4),
            F::Index4 => Some(16),
            F::Index8 => Some(256),
            _ => None,
        }
    }

    /// Alpha-only formats. They take the paint color and skip premultiplication.
    pub const fn is_alpha_only(self) -> bool {
        matches!(self.native(), BufferFormat::A4 | BufferFormat::A8)
    }

    pub const fn has_separate_alpha_plane(self) -> bool {
        matches!(self, BufferFormat::Ayuy2 | BufferFormat::Ayuy2Tiled) || self.is_planar_24bit()
    }

    pub const fn depth_class(self) -> DepthClass {
        if self.is_yuv() {
            DepthClass::Yuv
        } else if self.is_24bit() {
            DepthClass::Rgb24
        } else if self.is_planar_24bit() {
            DepthClass::Planar24
        } else if self.format_bytes().div > 1 {
            DepthClass::SubByte
        } else {
            DepthClass::Packed
        }
    }

    /// Formats the compression block accepts.
    pub const fn is_compressible(self) -> bool {
        use BufferFormat as F;
        matches!(
            self,
            F::Bgrx8888 | F::Rgbx8888 | F::Bgra8888 | F::Rgba8888 | F::Rgb888 | F::Bgr888
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    None,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Additive,
    Subtract,
}

impl BlendMode {
    pub const fn hw_code(self) -> u32 {
        use regs::blend;
        match self {
            BlendMode::None => blend::NONE,
            BlendMode::SrcOver => blend::SRC_OVER,
            BlendMode::DstOver => blend::DST_OVER,
            BlendMode::SrcIn => blend::SRC_IN,
            BlendMode::DstIn => blend::DST_IN,
            BlendMode::Multiply => blend::MULTIPLY,
            BlendMode::Screen => blend::SCREEN,
            BlendMode::Darken => blend::DARKEN,
            BlendMode::Lighten => blend::LIGHTEN,
            BlendMode::Additive => blend::ADDITIVE,
            BlendMode::Subtract => blend::SUBTRACT,
        }
    }

    /// Every mode except `None` reads the destination.
    pub const fn reads_destination(self) -> bool {
        !matches!(self, BlendMode::None)
    }

    /// Modes that are replaced by `SrcOver` when the source is rotated, so pixels outside the
    /// rotated footprint keep the destination.
    pub const fn promotes_when_rotated(self) -> bool {
        matches!(self, BlendMode::None | BlendMode::SrcIn | BlendMode::DstIn)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Point,
    Linear,
    BiLinear,
    Gaussian,
}

impl Filter {
    pub const fn hw_code(self) -> u32 {
        use regs::image;
        match self {
            Filter::Point => image::FILTER_POINT,
            Filter::Linear => image::FILTER_LINEAR,
            Filter::BiLinear => image::FILTER_BILINEAR,
            Filter::Gaussian => image::FILTER_GAUSSIAN,
        }
    }
}

/// Chroma order of YUV buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Swizzle {
    #[default]
    Uv,
    Vu,
}

impl Swizzle {
    pub const fn hw_code(self) -> u32 {
        match self {
            Swizzle::Uv => 0x40,
            Swizzle::Vu => 0x50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum YuvStandard {
    #[default]
    Bt601,
    Bt709,
}

impl YuvStandard {
    pub const fn hw_code(self) -> u32 {
        match self {
            YuvStandard::Bt601 => 0,
            YuvStandard::Bt709 => 0x8000,
        }
    }
}

/// How a source image combines with the paint color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageMode {
    #[default]
    Normal,
    None,
    Multiply,
    Zero,
    Stencil,
    Recolor,
}

impl ImageMode {
    pub const fn hw_code(self) -> u32 {
        match self {
            ImageMode::None => 0,
            ImageMode::Multiply => 0x2000,
            ImageMode::Normal | ImageMode::Zero => 0x1000,
            ImageMode::Stencil => 0x3000,
            ImageMode::Recolor => 0x6000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transparency {
    #[default]
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressMode {
    #[default]
    None,
    NonSample,
    HSample,
    HvSample,
}

impl CompressMode {
    pub const fn hw_code(self) -> u32 {
        match self {
            CompressMode::None => 0,
            CompressMode::NonSample => 1,
            CompressMode::HSample => 2,
            CompressMode::HvSample => 3,
        }
    }

    /// Size of the compressed image relative to the uncompressed one, in thousandths.
    pub const fn ratio_per_mille(self, format: BufferFormat) -> u32 {
        use BufferFormat as F;
        let (rgba, rgbx, rgb) = match self {
            CompressMode::None => return 1000,
            CompressMode::NonSample => (625, 500, 667),
            CompressMode::HSample => (500, 375, 500),
            CompressMode::HvSample => (375, 250, 1000),
        };
        match format {
            F::Bgra8888 | F::Rgba8888 => rgba,
            F::Bgrx8888 | F::Rgbx8888 => rgbx,
            F::Rgb888 | F::Bgr888 => rgb,
            _ => 1000,
        }
    }
}

/// Cross-checks a compression mode against the format and dimensions.
pub fn check_compress(
    format: BufferFormat,
    mode: CompressMode,
    tiling: Tiling,
    width: u32,
    height: u32,
) -> VgResult<()> {
    if mode == CompressMode::None {
        return Ok(());
    }
    let aligned = match tiling {
        Tiling::Tiled => width % 16 == 0 && height % 4 == 0,
        Tiling::Linear => width % 16 == 0 && mode != CompressMode::HvSample,
    };
    if !aligned {
        return Err(VgError::invalid(format!(
            "{mode:?} compression of a {tiling:?} {width}x{height} buffer"
        )));
    }
    if !format.is_compressible() {
        return Err(VgError::NotSupport("compression of this format"));
    }
    Ok(())
}

/// Checks stride and address alignment of an image used as a draw source.
pub fn validate_source_buffer(buf: &PixelBuffer, caps: Capabilities) -> VgResult<()> {
    let bytes = buf.format.format_bytes();
    let stride = buf.stride();
    if buf.address() % 8 != 0 {
        return Err(VgError::invalid(format!(
            "source address {:#x} is not 8-byte aligned",
            buf.address()
        )));
    }
    match buf.tiling {
        Tiling::Tiled => {
            let tile_row = bytes.pixel_multiple(4);
            if stride % tile_row != 0 || buf.height % 4 != 0 {
                return Err(VgError::invalid(format!(
                    "tiled source stride {stride} / height {} not aligned to 4 pixels",
                    buf.height
                )));
            }
        }
        Tiling::Linear => {
            if stride % bytes.align != 0 {
                return Err(VgError::invalid(format!(
                    "source stride {stride} is not a multiple of {}",
                    bytes.align
                )));
            }
            if caps.contains(Capabilities::PIXELS_16_ALIGNED) {
                let row16 = bytes.pixel_multiple(16);
                if stride % row16 != 0 {
                    return Err(VgError::invalid(format!(
                        "source stride {stride} is not a multiple of 16 pixels"
                    )));
                }
            }
        }
    }
    check_compress(buf.format, buf.compress, buf.tiling, buf.width, buf.height)
}

/// Checks format support and alignment of an image bound as the render target.
pub fn validate_target_buffer(buf: &PixelBuffer, caps: Capabilities) -> VgResult<()> {
    let format = buf.format;
    if format.is_yuv() && !caps.contains(Capabilities::YUV_OUTPUT) {
        return Err(VgError::NotSupport("YUV render targets"));
    }
    if (format.is_24bit() || format.is_planar_24bit()) && !caps.contains(Capabilities::RGB888_TARGET) {
        return Err(VgError::NotSupport("24-bit render targets"));
    }
    if format.target_code() == UNSUPPORTED_FORMAT {
        return Err(VgError::NotSupport("render target format"));
    }

    let bytes = format.format_bytes();
    let stride = buf.stride();
    let class = format.depth_class();
    match buf.tiling {
        Tiling::Tiled => {
            let tile_row = bytes.pixel_multiple(4);
            if stride % tile_row != 0 || buf.height % 4 != 0 {
                return Err(VgError::invalid(format!(
                    "tiled target stride {stride} / height {} not aligned to 4 pixels",
                    buf.height
                )));
            }
        }
        Tiling::Linear => {
            let pixel = match class {
                DepthClass::Rgb24 => 3,
                DepthClass::Planar24 => 2,
                _ => bytes.pixel_multiple(1),
            };
            if stride % pixel != 0 || stride % bytes.align != 0 {
                return Err(VgError::invalid(format!(
                    "target stride {stride} does not fit {format:?} (pixel {pixel}, align {})",
                    bytes.align
                )));
            }
        }
    }
    let address_align = if class == DepthClass::Rgb24 { 64 } else { 4 };
    if buf.address() % address_align != 0 {
        return Err(VgError::invalid(format!(
            "target address {:#x} is not {address_align}-byte aligned",
            buf.address()
        )));
    }
    check_compress(format, buf.compress, buf.tiling, buf.width, buf.height)
}

/// BT.709 luma of an `0xAABBGGRR` color, written to the low byte and the alpha byte.
pub fn rgb_to_l(color: u32) -> u32 {
    let r = (color & 0xFF) as f32;
    let g = ((color >> 8) & 0xFF) as f32;
    let b = ((color >> 16) & 0xFF) as f32;
    let l = (0.2126 * r + 0.7152 * g + 0.0722 * b) as u32;
    l | (l << 24)
}
