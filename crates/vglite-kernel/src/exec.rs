//! Reference executor for submitted command streams.
//!
//! This is not a GPU model. It keeps a register file, follows `CALL`/`RETURN`, and rasterizes the
//! rectangle draws (clears and image blits) the pixel pipe would perform, so host tests can check
//! rendered pixels. Path data is tessellated by hardware and is skipped here.

use thiserror::Error;
use tracing::{debug, trace};
use vglite_protocol::regs::{self, control, image, SamplerRegs, IMAGE_SAMPLER, PAINT_SAMPLER};
use vglite_protocol::{VgCmdDecodeError, VgCmdRecord, VgCmdStreamIter};

use crate::memory::MemoryBus;
use crate::pixel::{PixelLayout, Rgba8};

const REG_BASE: u32 = 0x0A00;
const REG_COUNT: usize = 0x200;
const MAX_CALL_DEPTH: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Decode(#[from] VgCmdDecodeError),
    #[error("CALL nesting deeper than {0}")]
    CallDepth(u32),
    #[error("command stream ended without an END record")]
    MissingEnd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStats {
    /// Event id of the terminating `END` record.
    pub event: u32,
    pub rectangles: u32,
    pub path_blocks: u32,
    /// Rectangles whose formats the executor cannot rasterize.
    pub skipped: u32,
}

#[derive(Debug, Clone)]
pub struct RegisterFile {
    values: Vec<u32>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            values: vec![0; REG_COUNT],
        }
    }
}

impl RegisterFile {
    pub fn get(&self, address: u32) -> u32 {
        address
            .checked_sub(REG_BASE)
            .and_then(|i| self.values.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, address: u32, value: u32) {
        match address.checked_sub(REG_BASE).and_then(|i| self.values.get_mut(i as usize)) {
            Some(slot) => *slot = value,
            None => trace!(address, value, "write to unmodelled register"),
        }
    }

    pub fn get_f32(&self, address: u32) -> f32 {
        f32::from_bits(self.get(address))
    }
}

enum Flow {
    End,
    Return,
    Exhausted,
}

struct ImageSource {
    layout: PixelLayout,
    address: u32,
    stride: u32,
    origin: (u32, u32),
    size: (u32, u32),
    c: [f32; 3],
    x: [f32; 3],
    y: [f32; 3],
    luminance: bool,
}

impl ImageSource {
    fn sample(&self, mem: &mut dyn MemoryBus, px: u32, py: u32) -> Option<Rgba8> {
        let (fx, fy) = (px as f32, py as f32);
        let w = self.x[2] * fx + self.y[2] * fy + self.c[2];
        if w <= 0.0 {
            return None;
        }
        let u = (self.x[0] * fx + self.y[0] * fy + self.c[0]) / w;
        let v = (self.x[1] * fx + self.y[1] * fy + self.c[1]) / w;
        let sx = (u * self.size.0 as f32).floor();
        let sy = (v * self.size.1 as f32).floor();
        if sx < 0.0 || sy < 0.0 || sx >= self.size.0 as f32 || sy >= self.size.1 as f32 {
            return None;
        }

        let bpp = self.layout.bytes_per_pixel() as u32;
        let addr = self.address
            + (self.origin.1 + sy as u32) * self.stride
            + (self.origin.0 + sx as u32) * bpp;
        let mut raw = [0u8; 4];
        mem.read_physical(addr as u64, &mut raw[..bpp as usize]);
        let mut texel = self.layout.decode(&raw);
        if self.luminance {
            texel.r = texel.luminance();
        }
        Some(texel)
    }
}

fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Blends straight-alpha `src` over `dst` with a hardware blend code.
pub fn blend_pixel(blend: u32, src: Rgba8, dst: Rgba8) -> Rgba8 {
    if blend == regs::blend::NONE {
        return src;
    }
    let (sa, da) = (unit(src.a), unit(dst.a));
    let premul = |c: u8, a: f32| unit(c) * a;
    let s = [premul(src.r, sa), premul(src.g, sa), premul(src.b, sa), sa];
    let d = [premul(dst.r, da), premul(dst.g, da), premul(dst.b, da), da];

    let src_over = |s: f32, d: f32| s + (1.0 - sa) * d;
    let dst_over = |s: f32, d: f32| (1.0 - da) * s + d;
    let f = |s: f32, d: f32| -> f32 {
        match blend {
            regs::blend::SRC_OVER => src_over(s, d),
            regs::blend::DST_OVER => dst_over(s, d),
            regs::blend::SRC_IN => da * s,
            regs::blend::DST_IN => sa * d,
            regs::blend::MULTIPLY => s * (1.0 - da) + d * (1.0 - sa) + s * d,
            regs::blend::SCREEN => s + d - s * d,
            regs::blend::DARKEN => src_over(s, d).min(dst_over(s, d)),
            regs::blend::LIGHTEN => src_over(s, d).max(dst_over(s, d)),
            regs::blend::ADDITIVE => (s + d).min(1.0),
            regs::blend::SUBTRACT => d * (1.0 - sa),
            _ => s,
        }
    };

    let out = [f(s[0], d[0]), f(s[1], d[1]), f(s[2], d[2]), f(s[3], d[3])];
    let a = out[3].clamp(0.0, 1.0);
    let unpremul = |c: f32| if a > 0.0 { to_u8(c / a) } else { 0 };
    Rgba8::new(unpremul(out[0]), unpremul(out[1]), unpremul(out[2]), to_u8(a))
}

/// Executes command streams against a [`MemoryBus`].
#[derive(Debug, Default)]
pub struct CommandExecutor {
    regs: RegisterFile,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn reset(&mut self) {
        self.regs = RegisterFile::default();
    }

    /// Executes one submission. The stream must be terminated by an `END` record.
    pub fn execute(&mut self, mem: &mut dyn MemoryBus, stream: &[u8]) -> Result<ExecStats, ExecError> {
        let mut stats = ExecStats::default();
        match self.run(mem, stream, 0, &mut stats)? {
            Flow::End => Ok(stats),
            Flow::Return | Flow::Exhausted => Err(ExecError::MissingEnd),
        }
    }

    fn run(
        &mut self,
        mem: &mut dyn MemoryBus,
        stream: &[u8],
        depth: u32,
        stats: &mut ExecStats,
    ) -> Result<Flow, ExecError> {
        for record in VgCmdStreamIter::new(stream)? {
            let record = record?;
            match record {
                VgCmdRecord::End { event } => {
                    stats.event = event;
                    return Ok(Flow::End);
                }
                VgCmdRecord::Semaphore { .. } | VgCmdRecord::Stall { .. } | VgCmdRecord::Nop => {}
                VgCmdRecord::States { .. } => {
                    for (address, value) in record.register_writes() {
                        self.regs.set(address, value);
                    }
                }
                VgCmdRecord::Data { payload } => self.data(mem, payload, stats),
                VgCmdRecord::Call { words, address } => {
                    if depth + 1 > MAX_CALL_DEPTH {
                        return Err(ExecError::CallDepth(MAX_CALL_DEPTH));
                    }
                    let mut sub = vec![0u8; words as usize * 8];
                    mem.read_physical(address as u64, &mut sub);
                    if let Flow::End = self.run(mem, &sub, depth + 1, stats)? {
                        return Ok(Flow::End);
                    }
                }
                VgCmdRecord::Return => return Ok(Flow::Return),
            }
        }
        Ok(Flow::Exhausted)
    }

    fn data(&mut self, mem: &mut dyn MemoryBus, payload: &[u8], stats: &mut ExecStats) {
        if self.regs.get(regs::PATH_CONTROL) != 0 {
            stats.path_blocks += 1;
            debug!(bytes = payload.len(), "path data left to the tessellator");
            return;
        }
        if payload.len() != 8 {
            stats.skipped += 1;
            debug!(bytes = payload.len(), "unexpected data block outside a path");
            return;
        }
        let half = |i: usize| u16::from_le_bytes([payload[i], payload[i + 1]]) as u32;
        self.rectangle(mem, half(0), half(2), half(4), half(6), stats);
    }

    fn sampler(&self, unit: &SamplerRegs) -> Option<ImageSource> {
        let config = self.regs.get(unit.config);
        let layout = PixelLayout::from_source_code(config & image::FORMAT_MASK)?;
        let origin = self.regs.get(unit.origin);
        let size = self.regs.get(unit.size);
        let three = |base: u32| {
            [
                self.regs.get_f32(base),
                self.regs.get_f32(base + 1),
                self.regs.get_f32(base + 2),
            ]
        };
        Some(ImageSource {
            layout,
            address: self.regs.get(unit.address),
            stride: self.regs.get(unit.stride) & !image::TILED_STRIDE,
            origin: (origin & 0xFFFF, origin >> 16),
            size: (size & 0xFFFF, size >> 16),
            c: three(unit.step_c),
            x: three(unit.step_x),
            y: three(unit.step_y),
            luminance: config & image::LUMINANCE_CONVERSION != 0,
        })
    }

    fn rectangle(
        &mut self,
        mem: &mut dyn MemoryBus,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        stats: &mut ExecStats,
    ) {
        let ctrl = self.regs.get(regs::CONTROL);
        let Some(dst_layout) = PixelLayout::from_target_code(self.regs.get(regs::TARGET_CONFIG) & 0x3F)
        else {
            stats.skipped += 1;
            debug!("rectangle on a target format the executor does not model");
            return;
        };
        let filling = ctrl & control::IMAGE_MODE_MASK == 0;
        let double = ctrl & control::IMAGE_MODE_FIELD == control::IMAGE_MODE_DOUBLE;
        let source = if filling {
            None
        } else {
            match self.sampler(&IMAGE_SAMPLER) {
                Some(src) => Some(src),
                None => {
                    stats.skipped += 1;
                    debug!("blit from a source format the executor does not model");
                    return;
                }
            }
        };
        let paint = if double {
            match self.sampler(&PAINT_SAMPLER) {
                Some(paint) => Some(paint),
                None => {
                    stats.skipped += 1;
                    debug!("double-image paint format the executor does not model");
                    return;
                }
            }
        } else {
            None
        };

        let dst_addr = self.regs.get(regs::TARGET_ADDRESS);
        let dst_stride = self.regs.get(regs::TARGET_STRIDE) & !regs::target::TILED_STRIDE;
        let extent = self.regs.get(regs::TARGET_EXTENT);
        let x_end = (x + width).min(extent & 0xFFFF);
        let y_end = (y + height).min(extent >> 16);

        let scissor = (ctrl & control::SCISSOR_ENABLE != 0 && self.regs.get(regs::SCISSOR_LAYER_ADDRESS) != 0)
            .then(|| {
                (
                    self.regs.get(regs::SCISSOR_LAYER_ADDRESS),
                    self.regs.get(regs::SCISSOR_LAYER_STRIDE),
                )
            });
        let mask = (ctrl & control::MASK_ENABLE != 0 && self.regs.get(regs::MASK_ADDRESS) != 0).then(|| {
            (
                self.regs.get(regs::MASK_ADDRESS),
                self.regs.get(regs::MASK_STRIDE),
            )
        });
        let color = Rgba8::from_abgr32(self.regs.get(regs::COLOR));
        let blend = ctrl & control::BLEND_MASK;
        let bpp = dst_layout.bytes_per_pixel();

        for py in y..y_end {
            for px in x..x_end {
                if let Some((addr, stride)) = scissor {
                    let bits = mem.read_u8((addr + py * stride + px / 8) as u64);
                    if (bits >> (px % 8)) & 1 == 0 {
                        continue;
                    }
                }
                let mut src = match (&source, &paint) {
                    (None, _) => color,
                    (Some(img), None) => match img.sample(mem, px, py) {
                        Some(texel) => texel,
                        None => continue,
                    },
                    (Some(img), Some(bg)) => match (img.sample(mem, px, py), bg.sample(mem, px, py)) {
                        (Some(fg), Some(bg)) => blend_pixel(regs::blend::SRC_OVER, fg, bg),
                        (Some(texel), None) | (None, Some(texel)) => texel,
                        (None, None) => continue,
                    },
                };
                if let Some((addr, stride)) = mask {
                    let coverage = mem.read_u8((addr + py * stride + px) as u64) as u32;
                    src.a = (src.a as u32 * coverage / 255) as u8;
                }

                let paddr = (dst_addr + py * dst_stride + px * bpp as u32) as u64;
                let mut raw = [0u8; 4];
                mem.read_physical(paddr, &mut raw[..bpp]);
                let out = if filling {
                    src
                } else {
                    blend_pixel(blend, src, dst_layout.decode(&raw))
                };
                dst_layout.encode(out, &mut raw);
                mem.write_physical(paddr, &raw[..bpp]);
            }
        }
        stats.rectangles += 1;
    }
}
