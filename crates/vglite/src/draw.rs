//! Rectangle draws (clear, blit, copy) and pattern-filled paths.
//!
//! Every draw validates its inputs, binds the target, then emits control, sampling and image
//! states followed by a `RECTANGLE` or a tessellation walk.

use tracing::trace;
use vglite_kernel::VgKernel;
use vglite_protocol::regs::{self, SamplerRegs, IMAGE_SAMPLER, PAINT_SAMPLER};

use crate::buffer::{PixelBuffer, Tiling};
use crate::config::Capabilities;
use crate::context::RenderContext;
use crate::error::{VgError, VgResult};
use crate::format::{
    rgb_to_l, validate_source_buffer, BlendMode, BufferFormat, Filter, ImageMode, Transparency,
    UNSUPPORTED_FORMAT,
};
use crate::matrix::{transformed_bounds, Matrix3x3, Point};
use crate::path::{FillRule, PathDraw, VgPath};
use crate::steps::SamplingSteps;
use crate::target::GammaConversion;

/// Axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// What a pattern fill shows outside the pattern image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PatternMode {
    /// A solid color.
    #[default]
    Color,
    /// The nearest edge texel.
    Pad,
    Repeat,
    Reflect,
}

impl PatternMode {
    pub const fn hw_code(self) -> u32 {
        use regs::image;
        match self {
            PatternMode::Color => 0,
            PatternMode::Pad => image::TILE_PAD,
            PatternMode::Repeat => image::TILE_REPEAT,
            PatternMode::Reflect => image::TILE_REFLECT,
        }
    }
}

/// Swaps an `0xAARRGGBB` color to the `0xAABBGGRR` order of the color registers.
pub(crate) const fn argb_to_abgr(color: u32) -> u32 {
    (color & 0xFF00_FF00) | ((color >> 16) & 0xFF) | ((color & 0xFF) << 16)
}

/// Where premultiplication happens for one source/target pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PremultiplyPlan {
    /// `IN_PREMULTIPLY` control bit or zero.
    pub in_premult: u32,
    /// Image-unit premultiply bits for the source config register.
    pub src_premultiply: u32,
    /// Bind the target with premultiplied output.
    pub apply_premult: bool,
}

impl PremultiplyPlan {
    /// `prediv` is set when a color stage between the source and the blender needs straight
    /// alpha. `premul` is set when the blend itself expects premultiplied input.
    pub fn select(source: bool, target: bool, prediv: bool, premul: bool, alpha_only_blend: bool) -> Self {
        use regs::image::{SRC_PREMULTIPLY, SRC_PREMULTIPLY_OUT};
        let (src_premultiply, mut in_premult) = match (source, target) {
            (false, false) if !premul => (SRC_PREMULTIPLY, regs::control::IN_PREMULTIPLY),
            (true, false) if !prediv => (SRC_PREMULTIPLY, regs::control::IN_PREMULTIPLY),
            (false, _) => (SRC_PREMULTIPLY, 0),
            (true, _) => (SRC_PREMULTIPLY_OUT, 0),
        };
        if alpha_only_blend {
            in_premult = 0;
        }
        Self {
            in_premult,
            src_premultiply,
            apply_premult: source == target && !premul,
        }
    }
}

impl<K: VgKernel> RenderContext<K> {
    /// GC355 cannot render into luminance, packed YUYV or 2-bit-per-channel targets.
    pub(crate) fn reject_gc355_only_targets(&self, target: &PixelBuffer) -> VgResult<()> {
        if self.config().is_gc355() && gc355_unsupported(target.format) {
            return Err(VgError::NotSupport("render target format on GC355"));
        }
        Ok(())
    }

    /// Checks that `source` can be read by the image unit.
    pub(crate) fn check_source(&self, source: &PixelBuffer) -> VgResult<()> {
        if !source.is_allocated() {
            return Err(VgError::invalid("source image has no memory"));
        }
        let format = source.format;
        if format.source_code() == UNSUPPORTED_FORMAT {
            return Err(VgError::NotSupport("source format"));
        }
        if self.config().is_gc355() && gc355_unsupported(format) {
            return Err(VgError::NotSupport("source format on GC355"));
        }
        if format.is_yuv() {
            self.require(Capabilities::YUV_INPUT, "YUV sources")?;
        }
        if format.is_indexed() {
            self.require(Capabilities::INDEX_FORMAT, "indexed images")?;
        }
        if format.native() == BufferFormat::Etc2
            && (source.width % self.config().etc2_block_width() != 0 || source.height % 4 != 0)
        {
            return Err(VgError::invalid(format!(
                "ETC2 image {}x{} is not a whole number of blocks",
                source.width, source.height
            )));
        }
        validate_source_buffer(source, self.capabilities())
    }

    /// Blend, mask, scissor and pixel-matrix bits shared by every draw.
    pub(crate) fn draw_control_bits(&self, blend: BlendMode) -> u32 {
        blend.hw_code()
            | self.state.mask_enable_bits()
            | self.state.scissor_enable_bits()
            | self.state.matrix_enable
    }

    /// Tiled-output and stripe bits of rectangle draws into `target`.
    fn rectangle_output_bits(&self, target: &PixelBuffer) -> u32 {
        if target.tiling == Tiling::Tiled {
            regs::control::TILED_OUTPUT | regs::control::STRIPE_MODE
        } else {
            self.state.stripe_bits()
        }
    }

    pub(crate) fn premultiply_plan(
        &self,
        source: &PixelBuffer,
        target: &PixelBuffer,
        blend: BlendMode,
    ) -> PremultiplyPlan {
        let prediv = self.state.gamma != GammaConversion::None
            || self.state.matrix_enable != 0
            || self.state.global_alpha_active()
            || !matches!(source.image_mode, ImageMode::Normal | ImageMode::Zero);
        let premul = source.image_mode == ImageMode::Stencil;
        PremultiplyPlan::select(
            source.premultiplied(),
            target.premultiplied(),
            prediv,
            premul,
            source.format.is_alpha_only() && blend != BlendMode::None,
        )
    }

    /// Clip box for rectangle draws: the scissor box if one is set, else the whole target.
    fn clip_box(&self, target: &PixelBuffer) -> (Point, Point) {
        let (w, h) = (target.width as i32, target.height as i32);
        if self.state.scissor_set {
            let [x, y, right, bottom] = self.state.scissor;
            (Point::new(x.max(0), y.max(0)), Point::new(right.min(w), bottom.min(h)))
        } else {
            (Point::new(0, 0), Point::new(w, h))
        }
    }

    /// Emits the nine sampling-step registers of `unit` for a `width` x `height` source seen
    /// through `matrix`.
    pub(crate) fn push_sampling_steps(
        &mut self,
        unit: &SamplerRegs,
        matrix: &Matrix3x3,
        filter: Filter,
        width: u32,
        height: u32,
        correct: bool,
    ) -> VgResult<()> {
        let inverse = matrix
            .inverse()
            .ok_or_else(|| VgError::invalid("source matrix is singular"))?;
        let mut steps = SamplingSteps::from_inverse(&inverse, filter, width as f32, height as f32);
        if correct {
            self.step_correction().correct(&mut steps, filter, matrix);
        }
        for (i, v) in (0u32..).zip(steps.c) {
            self.push_state_f32(unit.step_c + i, v)?;
        }
        for (i, v) in (0u32..).zip(steps.x) {
            self.push_state_f32(unit.step_x + i, v)?;
        }
        self.push_state(regs::STEP_ENABLE, 1)?;
        for (i, v) in (0u32..).zip(steps.y) {
            self.push_state_f32(unit.step_y + i, v)?;
        }
        Ok(())
    }

    /// Programs sampler `unit` to read `region` of `source`.
    fn push_image_source(
        &mut self,
        unit: &SamplerRegs,
        source: &PixelBuffer,
        region: Rect,
        config_bits: u32,
        color: u32,
    ) -> VgResult<()> {
        let format = source.format;
        let mut config = format.source_code() | config_bits | (source.compress.hw_code() << 25);
        if format.is_packed_yuv() {
            config |= source.yuv_standard.hw_code() | source.swizzle.hw_code();
        }
        self.push_state(unit.config, config)?;
        if let Some(uv) = source.uv_plane() {
            self.push_state(unit.uv_address, uv.address)?;
        }
        if let Some(v) = source.v_plane() {
            self.push_state(unit.v_address, v.address)?;
        }
        if let Some(alpha) = source.alpha_plane() {
            self.push_state(unit.v_address, alpha.address)?;
        }
        self.push_state(unit.color, color)?;
        self.push_state(unit.address, source.address())?;
        self.push_state(unit.stride, source_stride(source))?;
        self.push_state(unit.origin, region.x as u32 | ((region.y as u32) << 16))?;
        self.push_state(unit.size, region.width as u32 | ((region.height as u32) << 16))
    }

    /// Fills `rect` (or the whole target) with `color`, ignoring blend, mask and pixel matrix.
    pub fn clear(&mut self, target: &PixelBuffer, rect: Option<Rect>, color: u32) -> VgResult<()> {
        self.reject_gc355_only_targets(target)?;
        let in_premult = if target.premultiplied() {
            0
        } else {
            regs::control::IN_PREMULTIPLY
        };
        self.set_render_target(target, in_premult != 0)?;

        let (mut min, mut max) = match rect {
            Some(r) => (Point::new(r.x, r.y), Point::new(r.right(), r.bottom())),
            None => (Point::new(0, 0), Point::new(target.width as i32, target.height as i32)),
        };
        let (lo, hi) = self.clip_box(target);
        min.x = min.x.max(lo.x);
        min.y = min.y.max(lo.y);
        max.x = max.x.min(hi.x);
        max.y = max.y.min(hi.y);
        if max.x <= min.x || max.y <= min.y {
            return Ok(());
        }

        let color = if target.format.native() == BufferFormat::L8 {
            rgb_to_l(color)
        } else {
            color
        };
        self.push_state(regs::PATH_CONTROL, 0)?;
        self.push_state(regs::COLOR, color)?;
        self.push_state(
            regs::CONTROL,
            in_premult
                | regs::control::RECTANGLE
                | self.rectangle_output_bits(target)
                | self.state.scissor_enable_bits(),
        )?;
        self.push_rectangle(min.x, min.y, max.x - min.x, max.y - min.y)?;
        trace!(x = min.x, y = min.y, w = max.x - min.x, h = max.y - min.y, "clear");
        self.push_state(regs::FLUSH, regs::flush::TARGET)
    }

    /// Draws `source` through `matrix` into `target`.
    pub fn blit(
        &mut self,
        target: &PixelBuffer,
        source: &PixelBuffer,
        matrix: Option<&Matrix3x3>,
        blend: BlendMode,
        color: u32,
        filter: Filter,
    ) -> VgResult<()> {
        self.blit_rect(target, source, None, matrix, blend, color, filter)
    }

    /// Draws the `rect` sub-image of `source`. The sub-image's top-left corner is the origin of
    /// `matrix`.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_rect(
        &mut self,
        target: &PixelBuffer,
        source: &PixelBuffer,
        rect: Option<Rect>,
        matrix: Option<&Matrix3x3>,
        blend: BlendMode,
        color: u32,
        filter: Filter,
    ) -> VgResult<()> {
        self.reject_gc355_only_targets(target)?;
        self.check_source(source)?;
        if blend != BlendMode::None && target.format.is_packed_yuv() {
            return Err(VgError::NotSupport("blending into a packed YUV target"));
        }
        if filter == Filter::Gaussian {
            self.require(Capabilities::GAUSSIAN_BLUR, "gaussian filtering")?;
        }
        let region = source_region(source, rect)?;
        let matrix = matrix.copied().unwrap_or_default();
        if matrix.inverse().is_none() {
            return Err(VgError::invalid("source matrix is singular"));
        }

        let mut blend = blend;
        let mut stripe = 0;
        if !(matrix.is_axis_aligned() && matrix.is_affine()) && blend.promotes_when_rotated() {
            blend = BlendMode::SrcOver;
            if !self.has(Capabilities::STRIPE_MODE) {
                stripe = regs::control::STRIPE_MODE;
            }
        }
        let conversion = luminance_conversion(target, source);

        let (mut min, mut max) =
            transformed_bounds(region.width as f32, region.height as f32, Some(&matrix), filter)
                .ok_or_else(|| VgError::invalid("source corners project behind the viewer"))?;
        let (lo, hi) = self.clip_box(target);
        min.x = min.x.max(lo.x);
        min.y = min.y.max(lo.y);
        max.x = max.x.min(hi.x);
        max.y = max.y.min(hi.y);
        if max.x <= min.x || max.y <= min.y {
            return Ok(());
        }

        let plan = self.premultiply_plan(source, target, blend);
        self.set_render_target(target, plan.apply_premult)?;

        if self.has(Capabilities::GLOBAL_ALPHA) {
            self.push_state(regs::GLOBAL_ALPHA, self.state.global_alpha_word())?;
        }
        let transparency = match source.transparency {
            Transparency::Transparent => regs::control::TRANSPARENCY,
            Transparency::Opaque => 0,
        };
        self.push_state(
            regs::CONTROL,
            regs::control::RECTANGLE
                | plan.in_premult
                | source.image_mode.hw_code()
                | transparency
                | self.rectangle_output_bits(target)
                | stripe
                | self.draw_control_bits(blend),
        )?;
        self.push_state(regs::COLOR, color)?;
        self.push_sampling_steps(
            &IMAGE_SAMPLER,
            &matrix,
            filter,
            region.width as u32,
            region.height as u32,
            true,
        )?;
        self.push_image_source(
            &IMAGE_SAMPLER,
            source,
            region,
            filter.hw_code() | conversion | plan.src_premultiply,
            target.bg_color,
        )?;
        self.push_state(regs::PATH_CONTROL, 0)?;
        self.push_rectangle(min.x, min.y, max.x - min.x, max.y - min.y)?;
        trace!(x = min.x, y = min.y, w = max.x - min.x, h = max.y - min.y, ?blend, "blit");

        if self.state.flexa_mode {
            Ok(())
        } else {
            self.flush_target()
        }
    }

    /// Copies a `width` x `height` block from `(sx, sy)` in `source` to `(dx, dy)` in `target`
    /// without blending or filtering.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_image(
        &mut self,
        target: &PixelBuffer,
        source: &PixelBuffer,
        sx: i32,
        sy: i32,
        dx: i32,
        dy: i32,
        width: u32,
        height: u32,
    ) -> VgResult<()> {
        let rect = Rect::new(
            sx,
            sy,
            i32::try_from(width).map_err(|_| VgError::invalid("copy width"))?,
            i32::try_from(height).map_err(|_| VgError::invalid("copy height"))?,
        );
        let mut matrix = Matrix3x3::identity();
        matrix.translate(dx as f32, dy as f32);
        self.blit_rect(target, source, Some(rect), Some(&matrix), BlendMode::None, 0, Filter::Point)
    }

    /// Composites `source` over `background` in one pass and blends the result into `target`.
    ///
    /// Each image is placed by its own matrix. The rectangle covers the projected background,
    /// so background pixels outside `source` are drawn from the background alone. Nothing is
    /// drawn when the projected `source` misses the clip box.
    #[allow(clippy::too_many_arguments)]
    pub fn blit2(
        &mut self,
        target: &PixelBuffer,
        source: &PixelBuffer,
        background: &PixelBuffer,
        matrix: Option<&Matrix3x3>,
        background_matrix: Option<&Matrix3x3>,
        blend: BlendMode,
        filter: Filter,
    ) -> VgResult<()> {
        self.require(Capabilities::DOUBLE_IMAGE, "double-image blits")?;
        self.reject_gc355_only_targets(target)?;
        self.check_source(source)?;
        self.check_source(background)?;
        if filter == Filter::Gaussian {
            self.require(Capabilities::GAUSSIAN_BLUR, "gaussian filtering")?;
        }
        let matrix = matrix.copied().unwrap_or_default();
        let background_matrix = background_matrix.copied().unwrap_or_default();
        if matrix.inverse().is_none() || background_matrix.inverse().is_none() {
            return Err(VgError::invalid("blit2 matrix is singular"));
        }

        let (lo, hi) = self.clip_box(target);
        let clipped = |image: &PixelBuffer, m: &Matrix3x3| -> VgResult<Option<(Point, Point)>> {
            let (min, max) =
                transformed_bounds(image.width as f32, image.height as f32, Some(m), Filter::Point)
                    .ok_or_else(|| VgError::invalid("image corners project behind the viewer"))?;
            let min = Point::new(min.x.max(lo.x), min.y.max(lo.y));
            let max = Point::new(max.x.min(hi.x), max.y.min(hi.y));
            Ok((max.x > min.x && max.y > min.y).then_some((min, max)))
        };
        if clipped(source, &matrix)?.is_none() {
            return Ok(());
        }
        let Some((min, max)) = clipped(background, &background_matrix)? else {
            return Ok(());
        };

        let in_premult = if target.premultiplied() {
            0
        } else {
            regs::control::IN_PREMULTIPLY
        };
        self.set_render_target(target, in_premult != 0)?;
        self.push_state(
            regs::CONTROL,
            regs::control::RECTANGLE
                | in_premult
                | regs::control::IMAGE_MODE_DOUBLE
                | self.rectangle_output_bits(target)
                | self.draw_control_bits(blend),
        )?;
        self.push_state(regs::PATH_CONTROL, 0)?;

        let sampling = filter.hw_code() | luminance_conversion(target, source);
        self.push_sampling_steps(
            &IMAGE_SAMPLER,
            &matrix,
            filter,
            source.width,
            source.height,
            false,
        )?;
        self.push_image_source(
            &IMAGE_SAMPLER,
            source,
            Rect::new(0, 0, source.width as i32, source.height as i32),
            sampling,
            0,
        )?;
        self.push_sampling_steps(
            &PAINT_SAMPLER,
            &background_matrix,
            filter,
            background.width,
            background.height,
            false,
        )?;
        self.push_image_source(
            &PAINT_SAMPLER,
            background,
            Rect::new(0, 0, background.width as i32, background.height as i32),
            sampling,
            0,
        )?;
        self.push_rectangle(min.x, min.y, max.x - min.x, max.y - min.y)?;
        trace!(x = min.x, y = min.y, w = max.x - min.x, h = max.y - min.y, ?blend, "blit2");
        self.flush_target()
    }

    /// Fills `path` with `source` mapped through `pattern_matrix`.
    ///
    /// Pixels outside the pattern image show `pattern_color` (`0xAARRGGBB`) in
    /// [`PatternMode::Color`], or the edge texels in the other modes.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_pattern(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        path_matrix: Option<&Matrix3x3>,
        source: &PixelBuffer,
        pattern_matrix: Option<&Matrix3x3>,
        blend: BlendMode,
        pattern_mode: PatternMode,
        pattern_color: u32,
        filter: Filter,
    ) -> VgResult<()> {
        self.reject_gc355_only_targets(target)?;
        if matches!(source.format.native(), BufferFormat::A4 | BufferFormat::A8) {
            return Err(VgError::NotSupport("alpha-only pattern images"));
        }
        self.check_source(source)?;
        if path.is_empty() {
            return Ok(());
        }
        let path_matrix = path_matrix.copied().unwrap_or_default();
        let pattern_matrix = pattern_matrix.copied().unwrap_or_default();
        pattern_matrix
            .inverse()
            .ok_or_else(|| VgError::invalid("pattern matrix is singular"))?;
        let bounds = self.path_window_bounds(target, path, &path_matrix)?;

        let plan = self.premultiply_plan(source, target, blend);
        self.set_render_target(target, plan.apply_premult)?;

        let color = match pattern_mode {
            PatternMode::Color => argb_to_abgr(pattern_color),
            _ => pattern_color,
        };
        let image_mode = match source.image_mode {
            ImageMode::None => 0,
            ImageMode::Multiply => regs::control::IMAGE_MODE_MULTIPLY,
            _ => regs::control::IMAGE_MODE_NORMAL,
        };
        let transparency = match source.transparency {
            Transparency::Transparent => regs::control::TRANSPARENCY,
            Transparency::Opaque => 0,
        };
        self.push_sampling_steps(
            &IMAGE_SAMPLER,
            &pattern_matrix,
            Filter::Point,
            source.width,
            source.height,
            false,
        )?;
        self.push_image_source(
            &IMAGE_SAMPLER,
            source,
            Rect::new(0, 0, source.width as i32, source.height as i32),
            filter.hw_code()
                | pattern_mode.hw_code()
                | luminance_conversion(target, source)
                | plan.src_premultiply,
            color,
        )?;
        let control = regs::control::PAINT
            | plan.in_premult
            | image_mode
            | transparency
            | self.draw_control_bits(blend);
        self.encode_path(
            path,
            fill,
            &path_matrix,
            bounds,
            PathDraw {
                control,
                color: None,
                base: regs::path::BASE_PAINT,
            },
        )
    }
}

fn gc355_unsupported(format: BufferFormat) -> bool {
    matches!(
        format.native(),
        BufferFormat::L8
            | BufferFormat::Yuyv
            | BufferFormat::Bgra2222
            | BufferFormat::Rgba2222
            | BufferFormat::Abgr2222
            | BufferFormat::Argb2222
    )
}

/// Color sources drawn into a luminance target are converted to luma by the image unit.
pub(crate) fn luminance_conversion(target: &PixelBuffer, source: &PixelBuffer) -> u32 {
    let to_luma = target.format.native() == BufferFormat::L8
        && !matches!(source.format.native(), BufferFormat::L8 | BufferFormat::A8);
    if to_luma {
        regs::image::LUMINANCE_CONVERSION
    } else {
        0
    }
}

/// Image-unit stride: 24-bit rows are reported as four bytes per pixel.
pub(crate) fn source_stride(source: &PixelBuffer) -> u32 {
    let stride = if source.format.is_24bit() {
        source.stride() / 3 * 4
    } else {
        source.stride()
    };
    match source.tiling {
        Tiling::Tiled => stride | regs::image::TILED_STRIDE,
        Tiling::Linear => stride,
    }
}

/// Clamps a requested sub-image to the source. A region that starts outside the image or is
/// empty is rejected.
fn source_region(source: &PixelBuffer, rect: Option<Rect>) -> VgResult<Rect> {
    let (w, h) = (source.width as i32, source.height as i32);
    let Some(r) = rect else {
        return Ok(Rect::new(0, 0, w, h));
    };
    let x = r.x.max(0);
    let y = r.y.max(0);
    if x > w || y > h || r.width <= 0 || r.height <= 0 {
        return Err(VgError::invalid(format!("source region {r:?} misses the {w}x{h} image")));
    }
    Ok(Rect::new(x, y, r.width.min(w - x), r.height.min(h - y)))
}
