//! Scissor and mask layers.
//!
//! The scissor layer is a 1-bit-per-pixel map, one `A8` byte per eight target pixels with the
//! leftmost pixel in bit 0. Mask layers are plain `A8` images. Mask composition has no blender
//! of its own: every operation is a `clear`, `blit_rect` or `draw` with a substituted blend mode.

use tracing::debug;
use vglite_kernel::VgKernel;
use vglite_protocol::regs;

use crate::buffer::PixelBuffer;
use crate::config::Capabilities;
use crate::context::RenderContext;
use crate::draw::Rect;
use crate::error::VgResult;
use crate::format::{BlendMode, BufferFormat, Filter};
use crate::matrix::Matrix3x3;
use crate::path::{FillRule, VgPath};

/// How a mask update combines with the existing mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskOperation {
    /// Set coverage to zero.
    Clear,
    /// Set coverage to full.
    Fill,
    /// Replace with the source coverage.
    Set,
    Union,
    Intersect,
    Subtract,
}

impl MaskOperation {
    /// The blend that composes source coverage onto the mask.
    pub const fn blend(self) -> BlendMode {
        match self {
            MaskOperation::Clear | MaskOperation::Fill | MaskOperation::Set => BlendMode::None,
            MaskOperation::Union => BlendMode::Screen,
            MaskOperation::Intersect => BlendMode::DstIn,
            MaskOperation::Subtract => BlendMode::Subtract,
        }
    }
}

/// Clips `rect` to `[0, max_x) x [0, max_y)`. A rectangle that starts outside or is empty
/// yields `None`.
fn clamp_scissor_rect(rect: Rect, max_x: i32, max_y: i32) -> Option<Rect> {
    let mut r = rect;
    if r.x < 0 || r.y < 0 {
        r.width += r.x.min(0);
        r.height += r.y.min(0);
        r.x = r.x.max(0);
        r.y = r.y.max(0);
    }
    if r.x >= max_x || r.y >= max_y || r.width <= 0 || r.height <= 0 {
        return None;
    }
    r.width = r.width.min(max_x - r.x);
    r.height = r.height.min(max_y - r.y);
    Some(r)
}

/// One write into the scissor layer, in layer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScissorSpan {
    /// OR `bits` into byte column `column` of every row.
    Bits { column: i32, bits: u8 },
    /// Fill whole bytes `[column, column + len)`.
    Bytes { column: i32, len: i32 },
}

/// Splits a pixel span into a leading partial byte, whole bytes and a trailing partial byte.
fn scissor_spans(x: i32, width: i32) -> Vec<ScissorSpan> {
    let end = x + width;
    if end >> 3 == x >> 3 {
        let bits = ((0xFFu32 >> (8 - width)) << (x % 8)) as u8;
        return vec![ScissorSpan::Bits { column: x / 8, bits }];
    }
    let left_x = (x + 7) & !7;
    let right_x = end & !7;
    let mut spans = Vec::with_capacity(3);
    let left_len = left_x - x;
    if left_len > 0 {
        spans.push(ScissorSpan::Bits {
            column: x / 8,
            bits: (0xFFu32 << (8 - left_len)) as u8,
        });
    }
    if right_x > left_x {
        spans.push(ScissorSpan::Bytes {
            column: left_x / 8,
            len: (right_x - left_x) / 8,
        });
    }
    let right_len = end - right_x;
    if right_len > 0 {
        spans.push(ScissorSpan::Bits {
            column: right_x / 8,
            bits: (0xFFu32 >> (8 - right_len)) as u8,
        });
    }
    spans
}

impl<K: VgKernel> RenderContext<K> {
    /// Restricts drawing into `target` to the union of `rects` through the scissor layer.
    ///
    /// The layer is reallocated when `target` outgrows it, cleared, rasterized and then bound.
    /// Scissoring must still be turned on with [`RenderContext::enable_scissor`].
    pub fn scissor_rects(&mut self, target: &PixelBuffer, rects: &[Rect]) -> VgResult<()> {
        self.require(Capabilities::SCISSOR_LAYER, "scissor layers")?;
        let saved = (self.state.scissor_enabled, self.state.scissor_set);
        self.state.scissor_enabled = false;
        self.state.scissor_set = false;
        let result = self.rasterize_scissor_layer(target, rects);
        (self.state.scissor_enabled, self.state.scissor_set) = saved;
        self.state.scissor_dirty = true;
        result
    }

    fn rasterize_scissor_layer(&mut self, target: &PixelBuffer, rects: &[Rect]) -> VgResult<()> {
        let (width, height) = (target.width.div_ceil(8), target.height);
        if let Some(mut old) = self.state.scissor_layer.take() {
            if old.width < width || old.height < height {
                self.free(&mut old)?;
            } else {
                self.state.scissor_layer = Some(old);
            }
        }
        let layer = match self.state.scissor_layer {
            Some(layer) => layer,
            None => {
                let mut layer = PixelBuffer::new(width, height, BufferFormat::A8);
                self.allocate(&mut layer)?;
                debug!(width, height, address = layer.address(), "scissor layer allocated");
                self.state.scissor_layer = Some(layer);
                layer
            }
        };

        self.clear(&layer, None, 0)?;
        self.finish()?;

        let (max_x, max_y) = (layer.width as i32 * 8, layer.height as i32);
        let (address, stride) = (layer.address() as u64, layer.stride() as u64);
        for &rect in rects {
            let Some(r) = clamp_scissor_rect(rect, max_x, max_y) else {
                continue;
            };
            for span in scissor_spans(r.x, r.width) {
                match span {
                    ScissorSpan::Bits { column, bits } => {
                        let mem = self.kernel_mut().memory();
                        for row in r.y..r.y + r.height {
                            let at = address + row as u64 * stride + column as u64;
                            let byte = mem.read_u8(at) | bits;
                            mem.write_physical(at, &[byte]);
                        }
                    }
                    ScissorSpan::Bytes { column, len } => {
                        self.clear(&layer, Some(Rect::new(column, r.y, len, r.height)), 0xFFFF_FFFF)?;
                        self.finish()?;
                    }
                }
            }
        }

        self.push_state(regs::SCISSOR_LAYER_ADDRESS, layer.address())?;
        self.push_state(regs::SCISSOR_LAYER_STRIDE, layer.stride())?;
        self.push_state(regs::FLUSH, regs::flush::SCISSOR_LAYER)?;
        self.finish()
    }

    /// Allocates a `width` x `height` mask with full coverage.
    pub fn create_masklayer(&mut self, width: u32, height: u32) -> VgResult<PixelBuffer> {
        self.require(Capabilities::MASK, "mask layers")?;
        let mut layer = PixelBuffer::new(width, height, BufferFormat::A8);
        self.allocate(&mut layer)?;
        self.clear(&layer, None, 0xFF00_0000)?;
        Ok(layer)
    }

    /// Sets the coverage of `rect` (or the whole layer) to `value`.
    pub fn fill_masklayer(&mut self, layer: &PixelBuffer, rect: Option<Rect>, value: u8) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        self.clear(layer, rect, (value as u32) << 24)
    }

    /// Combines `src` into the `rect` area of `dst`. `src` is read from its origin.
    pub fn blend_masklayer(
        &mut self,
        dst: &PixelBuffer,
        src: &PixelBuffer,
        op: MaskOperation,
        rect: Rect,
    ) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        match op {
            MaskOperation::Clear => self.clear(dst, Some(rect), 0),
            MaskOperation::Fill => self.clear(dst, Some(rect), 0xFF00_0000),
            _ => {
                let mut matrix = Matrix3x3::identity();
                matrix.translate(rect.x as f32, rect.y as f32);
                let area = Rect::new(0, 0, rect.width, rect.height);
                self.blit_rect(dst, src, Some(area), Some(&matrix), op.blend(), 0, Filter::Point)
            }
        }
    }

    /// Rasterizes `path` into the mask with coverage `value`.
    #[allow(clippy::too_many_arguments)]
    pub fn render_masklayer(
        &mut self,
        layer: &PixelBuffer,
        op: MaskOperation,
        path: &VgPath,
        fill: FillRule,
        value: u8,
        matrix: Option<&Matrix3x3>,
    ) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        let color = match op {
            MaskOperation::Clear => 0,
            MaskOperation::Fill => 0xFF00_0000,
            _ => (value as u32) << 24,
        };
        self.draw(layer, path, fill, matrix, op.blend(), color)
    }

    /// Points the pixel pipe at `layer` for masked draws.
    pub fn set_masklayer(&mut self, layer: &PixelBuffer) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        self.push_state(regs::MASK_ADDRESS, layer.address())?;
        self.push_state(regs::MASK_STRIDE, layer.stride())?;
        self.push_state(regs::FLUSH, regs::flush::MASK_LAYER)
    }

    pub fn enable_masklayer(&mut self) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        self.state.mask_enabled = true;
        Ok(())
    }

    pub fn disable_masklayer(&mut self) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        self.state.mask_enabled = false;
        Ok(())
    }

    pub fn destroy_masklayer(&mut self, layer: &mut PixelBuffer) -> VgResult<()> {
        self.require(Capabilities::MASK, "mask layers")?;
        self.free(layer)
    }
}
