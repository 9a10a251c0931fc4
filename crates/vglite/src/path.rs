//! Vector paths and the tessellation walk shared by every path draw.
//!
//! Path data is an opaque opcode stream for the tessellator. The driver only encodes it, keeps
//! its bounding box, and replays it once per tessellation window that covers the clipped bounds,
//! either inline as `DATA` or as a `CALL` into an uploaded copy.

use tracing::{debug, trace};
use vglite_kernel::{MemoryHandle, VgKernel, VgKernelExt};
use vglite_protocol::{cmd, regs, STALL_MODULE_TESSELLATOR};

use crate::buffer::PixelBuffer;
use crate::config::Capabilities;
use crate::context::RenderContext;
use crate::error::{VgError, VgResult};
use crate::matrix::{transform, Matrix3x3, Point};
use crate::format::{BlendMode, Filter};
use crate::stroke::{PathType, Stroke};

/// Kernel tessellation layout that needs the tiled-tessellation path control bit.
const TILED_TESSELLATION_LAYOUT: u32 = 2;

/// Path opcodes understood by the tessellator.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathOp {
    End = 0x00,
    Close = 0x01,
    Move = 0x02,
    MoveRel = 0x03,
    Line = 0x04,
    LineRel = 0x05,
    Quad = 0x06,
    QuadRel = 0x07,
    Cubic = 0x08,
    CubicRel = 0x09,
    HLine = 0x0B,
    HLineRel = 0x0C,
    VLine = 0x0D,
    VLineRel = 0x0E,
}

impl PathOp {
    /// Coordinates that follow the opcode.
    pub const fn coords(self) -> usize {
        match self {
            PathOp::End | PathOp::Close => 0,
            PathOp::Move | PathOp::MoveRel | PathOp::Line | PathOp::LineRel => 2,
            PathOp::Quad | PathOp::QuadRel => 4,
            PathOp::Cubic | PathOp::CubicRel => 6,
            PathOp::HLine | PathOp::HLineRel | PathOp::VLine | PathOp::VLineRel => 1,
        }
    }

    pub const fn is_relative(self) -> bool {
        matches!(
            self,
            PathOp::MoveRel
                | PathOp::LineRel
                | PathOp::QuadRel
                | PathOp::CubicRel
                | PathOp::HLineRel
                | PathOp::VLineRel
        )
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => PathOp::End,
            0x01 => PathOp::Close,
            0x02 => PathOp::Move,
            0x03 => PathOp::MoveRel,
            0x04 => PathOp::Line,
            0x05 => PathOp::LineRel,
            0x06 => PathOp::Quad,
            0x07 => PathOp::QuadRel,
            0x08 => PathOp::Cubic,
            0x09 => PathOp::CubicRel,
            0x0B => PathOp::HLine,
            0x0C => PathOp::HLineRel,
            0x0D => PathOp::VLine,
            0x0E => PathOp::VLineRel,
            _ => return None,
        })
    }

    const fn is_move(self) -> bool {
        matches!(self, PathOp::Move | PathOp::MoveRel)
    }
}

/// Storage type of path coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PathFormat {
    S8,
    S16,
    S32,
    #[default]
    Fp32,
}

impl PathFormat {
    pub const fn bytes(self) -> usize {
        match self {
            PathFormat::S8 => 1,
            PathFormat::S16 => 2,
            PathFormat::S32 | PathFormat::Fp32 => 4,
        }
    }

    pub const fn hw_code(self) -> u32 {
        use regs::path;
        match self {
            PathFormat::S8 => path::FORMAT_S8,
            PathFormat::S16 => path::FORMAT_S16,
            PathFormat::S32 => path::FORMAT_S32,
            PathFormat::Fp32 => path::FORMAT_FP32,
        }
    }

    fn push(self, out: &mut Vec<u8>, v: f32) {
        match self {
            PathFormat::S8 => out.push(v as i8 as u8),
            PathFormat::S16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            PathFormat::S32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            PathFormat::Fp32 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Reads one coordinate from the front of `bytes`, which holds at least [`Self::bytes`].
    pub(crate) fn read(self, bytes: &[u8]) -> f32 {
        match self {
            PathFormat::S8 => bytes[0] as i8 as f32,
            PathFormat::S16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            PathFormat::S32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            PathFormat::Fp32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Value as stored, so bounds match what the tessellator sees.
    fn quantize(self, v: f32) -> f32 {
        match self {
            PathFormat::S8 => v as i8 as f32,
            PathFormat::S16 => v as i16 as f32,
            PathFormat::S32 => v as i32 as f32,
            PathFormat::Fp32 => v,
        }
    }
}

/// Anti-aliasing level of the tessellator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    #[default]
    High,
    Upper,
    Medium,
    Low,
}

impl Quality {
    pub const fn hw_code(self) -> u32 {
        use regs::path;
        match self {
            Quality::High => path::QUALITY_HIGH,
            Quality::Upper => path::QUALITY_UPPER,
            Quality::Medium => path::QUALITY_MEDIUM,
            Quality::Low => path::QUALITY_LOW,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub const fn hw_code(self) -> u32 {
        match self {
            FillRule::NonZero => 0,
            FillRule::EvenOdd => regs::path::FILL_EVEN_ODD,
        }
    }
}

/// GPU copy of a path, laid out as a callable sub-stream: `DATA`, payload, `RETURN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedPath {
    pub handle: MemoryHandle,
    pub address: u32,
    pub bytes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VgPath {
    pub format: PathFormat,
    pub quality: Quality,
    /// `[min_x, min_y, max_x, max_y]` in path space.
    pub bounds: [f32; 4],
    data: Vec<u8>,
    uploaded: Option<UploadedPath>,
    /// The final subpath was closed before its `CLOSE` became `END`.
    pub(crate) ends_closed: bool,
    pub(crate) path_type: PathType,
    pub(crate) stroke: Option<Box<Stroke>>,
}

impl VgPath {
    /// An empty path. Draws of an empty path succeed without emitting anything.
    pub fn new(format: PathFormat, quality: Quality) -> Self {
        Self {
            format,
            quality,
            bounds: [0.0; 4],
            data: Vec::new(),
            uploaded: None,
            ends_closed: false,
            path_type: PathType::Fill,
            stroke: None,
        }
    }

    /// Wraps pre-encoded path data. A trailing `CLOSE` is rewritten to `END`, which the
    /// tessellator requires as the last opcode.
    pub fn from_data(format: PathFormat, quality: Quality, mut data: Vec<u8>, bounds: [f32; 4]) -> VgResult<Self> {
        let size = format.bytes();
        if data.len() % size != 0 {
            return Err(VgError::invalid(format!(
                "path length {} is not a multiple of the {size}-byte coordinate size",
                data.len()
            )));
        }
        let mut ends_closed = false;
        if let Some(last) = data.len().checked_sub(size) {
            if data[last] == PathOp::Close as u8 {
                data[last] = PathOp::End as u8;
                ends_closed = true;
            }
        }
        Ok(Self {
            format,
            quality,
            bounds,
            data,
            uploaded: None,
            ends_closed,
            path_type: PathType::Fill,
            stroke: None,
        })
    }

    /// Builds a path from opcodes and their coordinates, computing the bounding box.
    pub fn from_ops(format: PathFormat, quality: Quality, ops: &[PathOp], coords: &[f32]) -> VgResult<Self> {
        let mut path = Self::new(format, quality);
        path.encode(ops, coords)?;
        Ok(path)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn uploaded(&self) -> Option<&UploadedPath> {
        self.uploaded.as_ref()
    }

    /// Replaces the path data with `ops`.
    ///
    /// Each opcode is padded to the coordinate size. A `CLOSE` directly followed by a move is
    /// written with every byte set to `CLOSE`, and the stream always ends in `END`.
    pub fn encode(&mut self, ops: &[PathOp], coords: &[f32]) -> VgResult<()> {
        if self.uploaded.is_some() {
            return Err(VgError::invalid("clear the uploaded copy before re-encoding a path"));
        }
        let needed: usize = ops.iter().map(|op| op.coords()).sum();
        if needed != coords.len() {
            return Err(VgError::invalid(format!(
                "{} opcodes take {needed} coordinates, got {}",
                ops.len(),
                coords.len()
            )));
        }

        let size = self.format.bytes();
        let mut out = Vec::with_capacity(ops.len() * size + coords.len() * size + size);
        let mut coords = coords.iter().copied();
        let (mut px, mut py) = (0.0f32, 0.0f32);
        let mut bounds: Option<[f32; 4]> = None;

        for (i, &op) in ops.iter().enumerate() {
            let closes_subpath = op == PathOp::Close && ops.get(i + 1).is_some_and(|next| next.is_move());
            let last = i + 1 == ops.len();
            let opcode = if op == PathOp::Close && last { PathOp::End } else { op };
            if closes_subpath {
                out.resize(out.len() + size, PathOp::Close as u8);
            } else {
                out.push(opcode as u8);
                out.resize(out.len().next_multiple_of(size), 0);
            }

            let (bx, by) = if op.is_relative() { (px, py) } else { (0.0, 0.0) };
            let mut point = None;
            match op {
                PathOp::HLine | PathOp::HLineRel => {
                    let v = self.format.quantize(coords.next().unwrap_or_default());
                    self.format.push(&mut out, v);
                    point = Some((bx + v, py));
                }
                PathOp::VLine | PathOp::VLineRel => {
                    let v = self.format.quantize(coords.next().unwrap_or_default());
                    self.format.push(&mut out, v);
                    point = Some((px, by + v));
                }
                _ => {
                    for _ in 0..op.coords() / 2 {
                        let x = self.format.quantize(coords.next().unwrap_or_default());
                        let y = self.format.quantize(coords.next().unwrap_or_default());
                        self.format.push(&mut out, x);
                        self.format.push(&mut out, y);
                        let p = (bx + x, by + y);
                        extend(&mut bounds, p);
                        point = Some(p);
                    }
                }
            }
            if let Some((x, y)) = point {
                extend(&mut bounds, (x, y));
                px = x;
                py = y;
            }
        }
        if ops.last() != Some(&PathOp::End) && ops.last() != Some(&PathOp::Close) {
            out.push(PathOp::End as u8);
            out.resize(out.len().next_multiple_of(size), 0);
        }

        self.data = out;
        self.bounds = bounds.unwrap_or_default();
        self.ends_closed = ops.last() == Some(&PathOp::Close);
        if let Some(stroke) = self.stroke.as_mut() {
            stroke.outline = None;
        }
        trace!(bytes = self.data.len(), bounds = ?self.bounds, "path encoded");
        Ok(())
    }
}

fn extend(bounds: &mut Option<[f32; 4]>, (x, y): (f32, f32)) {
    let b = bounds.get_or_insert([x, y, x, y]);
    b[0] = b[0].min(x);
    b[1] = b[1].min(y);
    b[2] = b[2].max(x);
    b[3] = b[3].max(y);
}

/// Control bits and paint color of one path draw.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathDraw {
    pub control: u32,
    /// Solid color, or `None` when a paint unit supplies the color.
    pub color: Option<u32>,
    /// [`regs::path::BASE_DRAW`] or [`regs::path::BASE_PAINT`].
    pub base: u32,
}

impl<K: VgKernel> RenderContext<K> {
    /// Copies `path` into GPU memory so draws replay it with a `CALL`.
    pub fn upload_path(&mut self, path: &mut VgPath) -> VgResult<()> {
        if path.data.is_empty() {
            return Err(VgError::invalid("cannot upload an empty path"));
        }
        if let Some(old) = path.uploaded.take() {
            self.kernel_mut().free(old.handle)?;
        }
        let mut stream = Vec::with_capacity(cmd::data_bytes(path.data.len()) + cmd::RETURN_BYTES);
        cmd::write_data(&mut stream, &path.data);
        cmd::write_return(&mut stream);
        let bytes = u32::try_from(stream.len()).map_err(|_| VgError::invalid("path too large"))?;

        let (handle, address) = self.kernel_mut().allocate(bytes, true)?;
        self.kernel_mut().memory().write_physical(address as u64, &stream);
        path.uploaded = Some(UploadedPath { handle, address, bytes });
        debug!(address, bytes, "path uploaded");
        Ok(())
    }

    /// Releases the uploaded copy, the path data and any stroke state.
    pub fn clear_path(&mut self, path: &mut VgPath) -> VgResult<()> {
        if let Some(uploaded) = path.uploaded.take() {
            self.kernel_mut().free(uploaded.handle)?;
        }
        path.data.clear();
        path.bounds = [0.0; 4];
        path.ends_closed = false;
        path.stroke = None;
        Ok(())
    }

    /// Device-space box `(min, max)` the tessellation walk covers for `path` on `target`.
    ///
    /// A target that fits in one tessellation window is covered whole. Otherwise the transformed
    /// path bounds are clipped to the target and the scissor box.
    pub(crate) fn path_window_bounds(
        &self,
        target: &PixelBuffer,
        path: &VgPath,
        matrix: &Matrix3x3,
    ) -> VgResult<(Point, Point)> {
        let tess = self.tessellation();
        if tess.width == 0 || tess.height == 0 {
            return Err(VgError::NoContext);
        }
        let bytes = target.format.format_bytes();
        let aligned_width = (target.stride() as u64 * bytes.div as u64 / bytes.mul as u64) as i32;
        let height = target.height as i32;
        if aligned_width <= tess.width as i32 && height <= tess.height as i32 {
            return Ok((Point::new(0, 0), Point::new(aligned_width, height)));
        }

        let [x0, y0, x1, y1] = path.bounds;
        let mut min = Point::new(i32::MAX, i32::MAX);
        let mut max = Point::new(i32::MIN, i32::MIN);
        for (x, y) in [(x0, y0), (x1, y0), (x1, y1), (x0, y1)] {
            let p = transform(x, y, Some(matrix), Filter::Point)
                .ok_or_else(|| VgError::invalid("path bounds project behind the viewer"))?;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        min.x = min.x.max(0);
        min.y = min.y.max(0);
        max.x = max.x.min(aligned_width);
        max.y = max.y.min(height);
        if self.state.scissor_set {
            let [sx, sy, right, bottom] = self.state.scissor;
            min.x = min.x.max(sx);
            min.y = min.y.max(sy);
            max.x = max.x.min(right);
            max.y = max.y.min(bottom);
        }
        Ok((min, max))
    }

    /// Emits the path control states and one tessellation pass per window over `bounds`, then
    /// resets `PATH_CONTROL`.
    pub(crate) fn encode_path(
        &mut self,
        path: &VgPath,
        fill: FillRule,
        matrix: &Matrix3x3,
        bounds: (Point, Point),
        draw: PathDraw,
    ) -> VgResult<()> {
        let tiling = if self.tessellation().tiled == TILED_TESSELLATION_LAYOUT {
            regs::path::TILED_TESSELLATION
        } else {
            0
        };
        self.push_state(regs::CONTROL, draw.control)?;
        if let Some(color) = draw.color {
            self.push_state(regs::COLOR, color)?;
        }
        self.push_state(
            regs::PATH_CONTROL,
            draw.base | path.format.hw_code() | path.quality.hw_code() | tiling | fill.hw_code(),
        )?;
        self.push_state(regs::TESS_SCALE, regs::path::UNIT_SCALE)?;
        self.push_state(regs::TESS_BIAS, 0)?;
        let m = &matrix.m;
        let row = [m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2]];
        for (i, v) in (0u32..).zip(row) {
            self.push_state_f32(regs::PATH_MATRIX + i, v)?;
        }

        let tess = *self.tessellation();
        let tess_size = if tess.l2_bytes != 0 { tess.l2_bytes } else { tess.l1_bytes };
        let (min, max) = bounds;
        let mut windows = 0u32;
        let mut y = min.y;
        while y < max.y {
            let mut x = min.x;
            while x < max.x {
                let origin = (x as u32 & 0xFFFF) | ((y as u32) << 16);
                self.push_stall(STALL_MODULE_TESSELLATOR)?;
                self.push_state(regs::FLUSH, regs::flush::TESSELLATION)?;
                self.push_state(regs::TESS_ORIGIN, origin)?;
                self.push_state(regs::TESS_WINDOW, origin)?;
                self.push_state(regs::TESS_SIZE, tess_size / 64)?;
                match path.uploaded {
                    Some(up) => self.push_call(up.address, up.bytes)?,
                    None => self.push_data(&path.data)?,
                }
                windows += 1;
                x += tess.width as i32;
            }
            y += tess.height as i32;
        }
        trace!(windows, "path tessellated");
        self.push_state(regs::PATH_CONTROL, 0)
    }

    /// Fills `path` with a solid color.
    ///
    /// Depending on [`VgPath::path_type`] the path itself, its stroke outline or both are drawn.
    /// The stroke outline is filled non-zero with the stroke color, after the path fill.
    pub fn draw(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        matrix: Option<&Matrix3x3>,
        blend: BlendMode,
        color: u32,
    ) -> VgResult<()> {
        self.reject_gc355_only_targets(target)?;
        let path_type = path.path_type();
        let stroke = if path_type.strokes() {
            self.require(Capabilities::STROKE_PATH, "stroked paths")?;
            let style = path
                .stroke_style()
                .ok_or_else(|| VgError::invalid("stroked path has no stroke parameters"))?;
            let outline = path
                .stroke_outline()
                .ok_or_else(|| VgError::invalid("stroke outline is stale; update the stroke first"))?;
            (!outline.is_empty()).then_some((outline, style.color))
        } else {
            None
        };
        let filled = path_type.fills() && !path.is_empty();
        if !filled && stroke.is_none() {
            return Ok(());
        }

        let matrix = matrix.copied().unwrap_or_default();
        let fill_bounds = if filled {
            Some(self.path_window_bounds(target, path, &matrix)?)
        } else {
            None
        };
        let stroke_bounds = match stroke {
            Some((outline, _)) => Some(self.path_window_bounds(target, outline, &matrix)?),
            None => None,
        };

        let premul_in = !target.premultiplied();
        self.set_render_target(target, premul_in)?;
        let control = self.draw_control_bits(blend)
            | if premul_in { regs::control::IN_PREMULTIPLY } else { 0 };
        if let Some(bounds) = fill_bounds {
            self.encode_path(
                path,
                fill,
                &matrix,
                bounds,
                PathDraw {
                    control,
                    color: Some(color),
                    base: regs::path::BASE_DRAW,
                },
            )?;
        }
        if let (Some((outline, stroke_color)), Some(bounds)) = (stroke, stroke_bounds) {
            trace!(bytes = outline.data.len(), "drawing stroke outline");
            self.encode_path(
                outline,
                FillRule::NonZero,
                &matrix,
                bounds,
                PathDraw {
                    control,
                    color: Some(stroke_color),
                    base: regs::path::BASE_DRAW,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::format::BufferFormat;
    use crate::stroke::StrokeStyle;
    use crate::testutil::{context, register_writes};
    use pretty_assertions::assert_eq;
    use vglite_protocol::{decode_stream, VgCmdRecord};

    fn square(format: PathFormat) -> VgPath {
        VgPath::from_ops(
            format,
            Quality::High,
            &[PathOp::Move, PathOp::Line, PathOp::Line, PathOp::Line, PathOp::Close],
            &[8.0, 8.0, 40.0, 8.0, 40.0, 40.0, 8.0, 40.0],
        )
        .unwrap()
    }

    #[test]
    fn s8_encoding_pads_nothing_and_ends_in_end() {
        let path = square(PathFormat::S8);
        assert_eq!(
            path.data(),
            &[2, 8, 8, 4, 40, 8, 4, 40, 40, 4, 8, 40, 0][..]
        );
        assert_eq!(path.bounds, [8.0, 8.0, 40.0, 40.0]);
    }

    #[test]
    fn fp32_opcodes_are_padded_to_the_coordinate_size() {
        let path = square(PathFormat::Fp32);
        assert_eq!(path.data().len(), 5 * 4 + 8 * 4);
        assert_eq!(&path.data()[..4], &[2, 0, 0, 0]);
        assert_eq!(&path.data()[4..8], &8.0f32.to_le_bytes());
    }

    #[test]
    fn close_before_move_fills_the_whole_slot() {
        let path = VgPath::from_ops(
            PathFormat::S16,
            Quality::Low,
            &[PathOp::Move, PathOp::Close, PathOp::MoveRel, PathOp::HLineRel],
            &[1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        assert_eq!(&path.data()[6..8], &[1, 1]);
        assert_eq!(path.bounds, [1.0, 2.0, 9.0, 6.0]);
    }

    #[test]
    fn from_data_rewrites_a_trailing_close() {
        let path = VgPath::from_data(PathFormat::S16, Quality::High, vec![2, 0, 1, 0, 1, 0, 1, 0], [0.0; 4]).unwrap();
        assert_eq!(path.data()[6], 0);
        assert!(VgPath::from_data(PathFormat::S32, Quality::High, vec![0; 6], [0.0; 4]).is_err());
    }

    #[test]
    fn coordinate_count_must_match_the_opcodes() {
        let err = VgPath::from_ops(PathFormat::S8, Quality::High, &[PathOp::Line], &[1.0]);
        assert!(matches!(err, Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn upload_builds_a_callable_stream() {
        let mut ctx = context(DriverConfig::default());
        let mut path = square(PathFormat::S8);
        ctx.upload_path(&mut path).unwrap();
        let up = *path.uploaded().unwrap();
        assert_eq!(up.bytes, 8 + 16 + 8);

        let mut mem = vec![0u8; up.bytes as usize];
        ctx.kernel_mut().memory().read_physical(up.address as u64, &mut mem);
        let records = decode_stream(&mem).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], VgCmdRecord::Data { payload } if &payload[..13] == path.data()));
        assert_eq!(records[1], VgCmdRecord::Return);

        let free = ctx.query_mem().unwrap();
        ctx.clear_path(&mut path).unwrap();
        assert!(ctx.query_mem().unwrap() > free);
        assert!(path.is_empty());
    }

    #[test]
    fn small_target_is_one_tessellation_window() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let path = square(PathFormat::S8);
        ctx.draw(&target, &path, FillRule::EvenOdd, None, BlendMode::SrcOver, 0xFF00_00FF)
            .unwrap();

        let writes = register_writes(ctx.pending_commands());
        assert_eq!(writes.iter().filter(|w| w.0 == regs::TESS_WINDOW).count(), 1);
        let control = writes.iter().rev().find(|w| w.0 == regs::PATH_CONTROL && w.1 != 0).unwrap().1;
        assert_eq!(control, regs::path::BASE_DRAW | regs::path::QUALITY_HIGH | regs::path::FILL_EVEN_ODD);
        assert_eq!(writes.last(), Some(&(regs::PATH_CONTROL, 0)));
        assert!(writes.contains(&(regs::COLOR, 0xFF00_00FF)));
    }

    #[test]
    fn large_target_walks_only_windows_covering_the_path() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(512, 512, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let path = VgPath::from_ops(
            PathFormat::S16,
            Quality::Medium,
            &[PathOp::Move, PathOp::Line, PathOp::Line],
            &[100.0, 100.0, 300.0, 100.0, 300.0, 140.0],
        )
        .unwrap();
        ctx.draw(&target, &path, FillRule::NonZero, None, BlendMode::None, 0xFFFF_FFFF)
            .unwrap();

        let origins: Vec<u32> = register_writes(ctx.pending_commands())
            .into_iter()
            .filter(|w| w.0 == regs::TESS_WINDOW)
            .map(|w| w.1)
            .collect();
        // x: 100, 228; y: 100 only, with 128x128 windows.
        assert_eq!(origins, vec![100 | (100 << 16), 228 | (100 << 16)]);
    }

    #[test]
    fn empty_path_draws_nothing() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(16, 16, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let before = ctx.pending_bytes();
        let path = VgPath::new(PathFormat::S8, Quality::High);
        ctx.draw(&target, &path, FillRule::NonZero, None, BlendMode::None, 0).unwrap();
        assert_eq!(ctx.pending_bytes(), before);
    }

    fn stroked_square(path_type: PathType) -> VgPath {
        let mut path = square(PathFormat::S16);
        path.set_path_type(path_type);
        path.set_stroke(StrokeStyle::solid(4.0, 0xFF00_FF00)).unwrap();
        path.update_stroke().unwrap();
        path
    }

    #[test]
    fn stroke_outline_is_drawn_non_zero_in_the_stroke_color() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let path = stroked_square(PathType::Stroke);
        ctx.draw(&target, &path, FillRule::EvenOdd, None, BlendMode::SrcOver, 0xFF00_00FF)
            .unwrap();

        let writes = register_writes(ctx.pending_commands());
        let controls: Vec<u32> =
            writes.iter().filter(|w| w.0 == regs::PATH_CONTROL && w.1 != 0).map(|w| w.1).collect();
        assert_eq!(
            controls,
            vec![regs::path::BASE_DRAW | regs::path::FORMAT_FP32 | regs::path::QUALITY_HIGH]
        );
        assert!(writes.contains(&(regs::COLOR, 0xFF00_FF00)));
        assert!(!writes.contains(&(regs::COLOR, 0xFF00_00FF)));
    }

    #[test]
    fn fill_stroke_draws_the_fill_then_the_outline() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let path = stroked_square(PathType::FillStroke);
        ctx.draw(&target, &path, FillRule::EvenOdd, None, BlendMode::SrcOver, 0xFF00_00FF)
            .unwrap();

        let writes = register_writes(ctx.pending_commands());
        let colors: Vec<u32> = writes.iter().filter(|w| w.0 == regs::COLOR).map(|w| w.1).collect();
        assert_eq!(colors, vec![0xFF00_00FF, 0xFF00_FF00]);
        let controls: Vec<u32> =
            writes.iter().filter(|w| w.0 == regs::PATH_CONTROL && w.1 != 0).map(|w| w.1).collect();
        assert_eq!(
            controls,
            vec![
                regs::path::BASE_DRAW | regs::path::FORMAT_S16 | regs::path::QUALITY_HIGH | regs::path::FILL_EVEN_ODD,
                regs::path::BASE_DRAW | regs::path::FORMAT_FP32 | regs::path::QUALITY_HIGH,
            ]
        );
    }

    fn draw_outline<K: VgKernel>(ctx: &mut RenderContext<K>, target: &PixelBuffer, path: &VgPath) -> VgResult<()> {
        ctx.draw(target, path, FillRule::NonZero, None, BlendMode::None, 0)
    }

    #[test]
    fn stroke_draws_need_a_current_outline_and_the_capability() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let mut path = square(PathFormat::S8);
        path.set_path_type(PathType::Stroke);
        assert!(matches!(draw_outline(&mut ctx, &target, &path), Err(VgError::InvalidArgument(_))));
        path.set_stroke(StrokeStyle::solid(1.0, 0)).unwrap();
        assert!(matches!(draw_outline(&mut ctx, &target, &path), Err(VgError::InvalidArgument(_))));
        path.update_stroke().unwrap();
        draw_outline(&mut ctx, &target, &path).unwrap();

        let mut ctx = context(DriverConfig {
            capabilities: Capabilities::default() - Capabilities::STROKE_PATH,
            ..DriverConfig::default()
        });
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        assert!(matches!(
            draw_outline(&mut ctx, &target, &path),
            Err(VgError::NotSupport("stroked paths"))
        ));
    }

    #[test]
    fn clear_path_drops_the_stroke() {
        let mut ctx = context(DriverConfig::default());
        let mut path = stroked_square(PathType::FillStroke);
        ctx.clear_path(&mut path).unwrap();
        assert!(path.is_empty());
        assert!(path.stroke_style().is_none());
    }
}
