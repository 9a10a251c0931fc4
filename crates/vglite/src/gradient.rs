//! Color ramps baked into one-row gradient images.
//!
//! Linear and radial gradients take floating-point stops in `[0, 1]`. The stops are normalized
//! once when set, then baked into an `ABGR8888` row the paint unit indexes by the gradient
//! parameter it evaluates per pixel. The legacy gradient keeps integer stops over a fixed
//! 256-texel `BGRA8888` ramp and is drawn as a padded pattern.

use std::f32::consts::PI;

use tracing::{debug, warn};
use vglite_kernel::VgKernel;
use vglite_protocol::regs;

use crate::buffer::{PixelBuffer, PlaneData, Tiling};
use crate::config::Capabilities;
use crate::context::RenderContext;
use crate::draw::{argb_to_abgr, luminance_conversion, PatternMode};
use crate::error::{VgError, VgResult};
use crate::format::{BlendMode, BufferFormat, Filter, ImageMode, Transparency};
use crate::matrix::Matrix3x3;
use crate::path::{FillRule, PathDraw, VgPath};

/// Most stops a linear or radial ramp accepts.
pub const MAX_RAMP_STOPS: usize = 16;
/// Most stops a legacy gradient accepts.
pub const MAX_LEGACY_STOPS: usize = 16;
/// Texels in a legacy gradient ramp.
pub const LEGACY_RAMP_WIDTH: u32 = 256;

const TEXELS_PER_STOP: u32 = 128;
/// Stop fractions closer than this to a whole multiple count as exact.
const STOP_FRACTION_EPSILON: f32 = 0.00013;

/// One stop of a color ramp. Channels are straight (not premultiplied) and nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorStop {
    pub stop: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorStop {
    pub const fn new(stop: f32, r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { stop, r, g, b, a }
    }

    fn clamped(self) -> Self {
        Self {
            stop: self.stop,
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }

    fn rgba(&self, premultiplied: bool) -> [f32; 4] {
        if premultiplied {
            [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
        } else {
            [self.r, self.g, self.b, self.a]
        }
    }
}

/// Opaque black at 0.0 to opaque white at 1.0.
pub const DEFAULT_RAMP: [ColorStop; 2] = [
    ColorStop::new(0.0, 0.0, 0.0, 0.0, 1.0),
    ColorStop::new(1.0, 1.0, 1.0, 1.0, 1.0),
];

/// What the paint unit shows for gradient parameters outside `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SpreadMode {
    /// The gradient's fill color.
    #[default]
    Fill,
    Pad,
    Repeat,
    Reflect,
}

impl SpreadMode {
    pub const fn hw_code(self) -> u32 {
        use regs::image;
        match self {
            SpreadMode::Fill => 0,
            SpreadMode::Pad => image::TILE_PAD,
            SpreadMode::Repeat => image::TILE_REPEAT,
            SpreadMode::Reflect => image::TILE_REFLECT,
        }
    }
}

/// Start and end point of a linear gradient, in gradient space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearParams {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Center, radius and focal point of a radial gradient, in gradient space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RadialParams {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    pub fx: f32,
    pub fy: f32,
}

/// Validates `stops` and pins the ramp to `[0, 1]`.
///
/// Returns `None` when the ramp is empty, too long, leaves `[0, 1]` or decreases. A first stop
/// above 0.0 or a last stop below 1.0 is extended with a copy of its color.
pub fn normalize_ramp(stops: &[ColorStop]) -> Option<Vec<ColorStop>> {
    if stops.is_empty() || stops.len() > MAX_RAMP_STOPS {
        return None;
    }
    let mut prev = 0.0f32;
    for s in stops {
        if !(0.0..=1.0).contains(&s.stop) || s.stop < prev {
            return None;
        }
        prev = s.stop;
    }

    let mut ramp = Vec::with_capacity(stops.len() + 2);
    for s in stops {
        let s = s.clamped();
        if ramp.is_empty() && s.stop > 0.0 {
            ramp.push(ColorStop { stop: 0.0, ..s });
        }
        ramp.push(s);
    }
    if let Some(&last) = ramp.last() {
        if last.stop != 1.0 {
            ramp.push(ColorStop { stop: 1.0, ..last });
        }
    }
    Some(ramp)
}

fn ramp_or_default(stops: &[ColorStop], kind: &'static str) -> Vec<ColorStop> {
    normalize_ramp(stops).unwrap_or_else(|| {
        warn!(kind, count = stops.len(), "invalid color ramp, using the default ramp");
        DEFAULT_RAMP.to_vec()
    })
}

fn pack_channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Samples `ramp` at `width` evenly spaced parameters and packs `ABGR8888` texels.
pub(crate) fn bake_ramp(ramp: &[ColorStop], width: u32, premultiplied: bool) -> Vec<u8> {
    let mut texels = Vec::with_capacity(width as usize * 4);
    let Some(last) = ramp.len().checked_sub(1) else {
        return texels;
    };
    let mut k = 0;
    for i in 0..width {
        let g = if width > 1 {
            i as f32 / (width - 1) as f32
        } else {
            0.0
        };
        while k < last && g > ramp[k].stop {
            k += 1;
        }
        let color = if k == 0 || g >= ramp[k].stop {
            ramp[k].rgba(premultiplied)
        } else {
            let (lo, hi) = (&ramp[k - 1], &ramp[k]);
            let w = (hi.stop - g) / (hi.stop - lo.stop);
            let (c1, c2) = (lo.rgba(premultiplied), hi.rgba(premultiplied));
            std::array::from_fn(|c| c1[c] * w + c2[c] * (1.0 - w))
        };
        let [r, g, b, a] = color;
        texels.extend_from_slice(&[pack_channel(a), pack_channel(b), pack_channel(g), pack_channel(r)]);
    }
    texels
}

/// Texel count of a radial ramp. Sub-pixel radii get enough texels to land every stop on a
/// texel, rounded up to 16.
pub(crate) fn radial_ramp_width(ramp: &[ColorStop], radius: f32) -> u32 {
    if radius >= 1.0 {
        return ramp.len() as u32 * TEXELS_PER_STOP;
    }
    let mut common = 1u32;
    for s in ramp.iter().filter(|s| s.stop != 0.0) {
        let scaled = common as f32 * s.stop;
        let frac = scaled - scaled.floor();
        if frac > STOP_FRACTION_EPSILON {
            common = common.max((1.0 / frac + 0.5) as u32);
        }
    }
    (common + 1 + 15) & !15
}

/// `LINEAR_CONSTANT`, `LINEAR_STEP_X` and `LINEAR_STEP_Y` for a gradient from `(x0, y0)` to
/// `(x1, y1)` seen through the destination-to-gradient `inverse`.
///
/// The paint unit evaluates `g = constant + x·step_x + y·step_y` at each pixel center.
pub(crate) fn linear_coefficients(inverse: &Matrix3x3, p: &LinearParams) -> [(u32, f32); 3] {
    let m = &inverse.m;
    let (dx, dy) = (p.x1 - p.x0, p.y1 - p.y0);
    let len2 = dx * dx + dy * dy;
    let step_x = (dx * m[0][0] + dy * m[1][0]) / len2;
    let step_y = (dx * m[0][1] + dy * m[1][1]) / len2;
    let constant = ((0.5 * (m[0][0] + m[0][1]) + m[0][2] - p.x0) * dx
        + (0.5 * (m[1][0] + m[1][1]) + m[1][2] - p.y0) * dy)
        / len2;
    [
        (regs::LINEAR_CONSTANT, constant),
        (regs::LINEAR_STEP_X, step_x),
        (regs::LINEAR_STEP_Y, step_y),
    ]
}

/// The nine radial registers.
///
/// The gradient parameter is `g = lin + sqrt(rad)`, each a polynomial in the pixel position.
/// A focal point on or outside the circle is pulled in to 0.9 of the radius.
pub(crate) fn radial_coefficients(inverse: &Matrix3x3, p: &RadialParams) -> [(u32, f32); 9] {
    let m = &inverse.m;
    let r = p.r;
    let r2 = r * r;
    let (mut fx, mut fy) = (p.fx - p.cx, p.fy - p.cy);
    let (mut focal_x, mut focal_y) = (p.fx, p.fy);
    if fx * fx + fy * fy >= r2 {
        let fr = fx.hypot(fy);
        fx = r * fx / fr * 0.9;
        fy = r * fy / fr * 0.9;
        focal_x = p.cx + fx;
        focal_y = p.cy + fy;
    }

    let fxfy_2 = 2.0 * fx * fy;
    let r2_fx2 = r2 - fx * fx;
    let r2_fy2 = r2 - fy * fy;
    let r2_fx2_2 = 2.0 * r2_fx2;
    let r2_fy2_2 = 2.0 * r2_fy2;
    let denom = r2_fx2 - fy * fy;
    let denom_sq = denom * denom;

    let cx = 0.5 * (m[0][0] + m[0][1]) + m[0][2] - focal_x;
    let cy = 0.5 * (m[1][0] + m[1][1]) + m[1][2] - focal_y;

    let step_x_lin = (m[0][0] * fx + m[1][0] * fy) / denom;
    let step_y_lin = (m[0][1] * fx + m[1][1] * fy) / denom;
    let constant_lin = (cx * fx + cy * fy) / denom;

    let step_xx = (m[0][0] * m[0][0] * r2_fy2 + m[1][0] * m[1][0] * r2_fx2 + m[0][0] * m[1][0] * fxfy_2) / denom_sq;
    let step_yy = (m[0][1] * m[0][1] * r2_fy2 + m[1][1] * m[1][1] * r2_fx2 + m[0][1] * m[1][1] * fxfy_2) / denom_sq;
    let step_xy = (m[0][0] * m[0][1] * r2_fy2_2
        + m[1][0] * m[1][1] * r2_fx2_2
        + (m[0][0] * m[1][1] + m[0][1] * m[1][0]) * fxfy_2)
        / denom_sq;
    let step_x_rad =
        (m[0][0] * cx * r2_fy2_2 + m[1][0] * cy * r2_fx2_2 + (m[0][0] * cy + m[1][0] * cx) * fxfy_2) / denom_sq;
    let step_y_rad =
        (m[0][1] * cx * r2_fy2_2 + m[1][1] * cy * r2_fx2_2 + (m[0][1] * cy + m[1][1] * cx) * fxfy_2) / denom_sq;
    let constant_rad = (cx * cx * r2_fy2 + cy * cy * r2_fx2 + cx * cy * fxfy_2) / denom_sq;

    [
        (regs::LINEAR_CONSTANT, constant_lin),
        (regs::LINEAR_STEP_X, step_x_lin),
        (regs::LINEAR_STEP_Y, step_y_lin),
        (regs::RADIAL_CONSTANT, constant_rad),
        (regs::RADIAL_STEP_X, step_x_rad),
        (regs::RADIAL_STEP_Y, step_y_rad),
        (regs::RADIAL_STEP_XX, step_xx),
        (regs::RADIAL_STEP_YY, step_yy),
        (regs::RADIAL_STEP_XY, step_xy),
    ]
}

/// A linear gradient and its baked ramp image.
#[derive(Debug, Clone)]
pub struct LinearGradient {
    pub params: LinearParams,
    pub spread: SpreadMode,
    /// Bake premultiplied colors.
    pub premultiplied: bool,
    /// Color shown by [`SpreadMode::Fill`], `0xAARRGGBB`.
    pub fill_color: u32,
    matrix: Matrix3x3,
    ramp: Vec<ColorStop>,
    image: PixelBuffer,
    /// Ramp texel space to destination space, rebuilt by every update.
    ramp_matrix: Matrix3x3,
}

impl Default for LinearGradient {
    fn default() -> Self {
        Self {
            params: LinearParams::default(),
            spread: SpreadMode::default(),
            premultiplied: false,
            fill_color: 0,
            matrix: Matrix3x3::identity(),
            ramp: DEFAULT_RAMP.to_vec(),
            image: PixelBuffer::new(0, 1, BufferFormat::Abgr8888),
            ramp_matrix: Matrix3x3::identity(),
        }
    }
}

impl LinearGradient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ramp, geometry and spread mode.
    ///
    /// An invalid ramp falls back to [`DEFAULT_RAMP`]. Coincident endpoints also select the
    /// default ramp and are reported as `InvalidArgument`.
    pub fn set(
        &mut self,
        stops: &[ColorStop],
        params: LinearParams,
        spread: SpreadMode,
        premultiplied: bool,
    ) -> VgResult<()> {
        self.spread = spread;
        self.premultiplied = premultiplied;
        if params.x0 == params.x1 && params.y0 == params.y1 {
            warn!(x = params.x0, y = params.y0, "linear gradient endpoints coincide, using the default ramp");
            self.ramp = DEFAULT_RAMP.to_vec();
            return Err(VgError::invalid("linear gradient endpoints coincide"));
        }
        self.params = params;
        self.ramp = ramp_or_default(stops, "linear");
        Ok(())
    }

    /// The normalized ramp.
    pub fn ramp(&self) -> &[ColorStop] {
        &self.ramp
    }

    /// The baked ramp, unallocated until the first update.
    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    /// Gradient space to destination space. Changes take effect on the next update.
    pub fn matrix(&self) -> &Matrix3x3 {
        &self.matrix
    }

    /// Mutable access to the gradient matrix.
    pub fn matrix_mut(&mut self) -> &mut Matrix3x3 {
        &mut self.matrix
    }
}

/// A radial gradient and its baked ramp image.
#[derive(Debug, Clone)]
pub struct RadialGradient {
    pub params: RadialParams,
    pub spread: SpreadMode,
    pub premultiplied: bool,
    /// Color shown by [`SpreadMode::Fill`], `0xAARRGGBB`.
    pub fill_color: u32,
    matrix: Matrix3x3,
    ramp: Vec<ColorStop>,
    image: PixelBuffer,
}

impl Default for RadialGradient {
    fn default() -> Self {
        Self {
            params: RadialParams::default(),
            spread: SpreadMode::default(),
            premultiplied: false,
            fill_color: 0,
            matrix: Matrix3x3::identity(),
            ramp: DEFAULT_RAMP.to_vec(),
            image: PixelBuffer::new(0, 1, BufferFormat::Abgr8888),
        }
    }
}

impl RadialGradient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ramp, geometry and spread mode. A non-positive radius selects the default
    /// ramp and is reported as `InvalidArgument`.
    pub fn set(
        &mut self,
        stops: &[ColorStop],
        params: RadialParams,
        spread: SpreadMode,
        premultiplied: bool,
    ) -> VgResult<()> {
        self.spread = spread;
        self.premultiplied = premultiplied;
        if !(params.r > 0.0) {
            warn!(r = params.r, "radial gradient radius is not positive, using the default ramp");
            self.ramp = DEFAULT_RAMP.to_vec();
            return Err(VgError::invalid(format!("radial gradient radius {}", params.r)));
        }
        self.params = params;
        self.ramp = ramp_or_default(stops, "radial");
        Ok(())
    }

    /// The normalized ramp.
    pub fn ramp(&self) -> &[ColorStop] {
        &self.ramp
    }

    /// The baked ramp, unallocated until the first update.
    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    /// Gradient space to destination space, inverted when the paint unit is programmed.
    pub fn matrix(&self) -> &Matrix3x3 {
        &self.matrix
    }

    /// Mutable access to the gradient matrix.
    pub fn matrix_mut(&mut self) -> &mut Matrix3x3 {
        &mut self.matrix
    }
}

/// A 256-level gradient with integer stops, drawn as a padded pattern.
#[derive(Debug, Clone)]
pub struct LegacyGradient {
    stops: Vec<u32>,
    colors: Vec<u32>,
    matrix: Matrix3x3,
    image: PixelBuffer,
}

impl LegacyGradient {
    /// Keeps the stops below [`LEGACY_RAMP_WIDTH`] that strictly increase. A stop equal to the
    /// previous kept one replaces its color. Colors are `0xAARRGGBB`.
    ///
    /// An empty or oversized input leaves no stops, which bakes as black to white.
    pub fn set(&mut self, colors: &[u32], stops: &[u32]) -> VgResult<()> {
        if colors.len() != stops.len() {
            return Err(VgError::invalid(format!(
                "{} colors for {} stops",
                colors.len(),
                stops.len()
            )));
        }
        self.stops.clear();
        self.colors.clear();
        if stops.is_empty() || stops.len() > MAX_LEGACY_STOPS {
            return Ok(());
        }
        for (&stop, &color) in stops.iter().zip(colors) {
            if stop >= LEGACY_RAMP_WIDTH {
                continue;
            }
            match self.stops.last() {
                Some(&prev) if stop == prev => {
                    if let Some(c) = self.colors.last_mut() {
                        *c = color;
                    }
                }
                Some(&prev) if stop < prev => {}
                _ => {
                    self.stops.push(stop);
                    self.colors.push(color);
                }
            }
        }
        Ok(())
    }

    /// Kept `(stop, color)` pairs.
    pub fn stops(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.stops.iter().copied().zip(self.colors.iter().copied())
    }

    /// The 256x1 ramp image, unallocated until the first update.
    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    /// The pattern matrix the ramp is drawn through.
    pub fn matrix(&self) -> &Matrix3x3 {
        &self.matrix
    }

    /// Mutable access to the pattern matrix.
    pub fn matrix_mut(&mut self) -> &mut Matrix3x3 {
        &mut self.matrix
    }
}

fn argb_channels(c: u32) -> [i32; 4] {
    [(c >> 24) as i32, ((c >> 16) & 0xFF) as i32, ((c >> 8) & 0xFF) as i32, (c & 0xFF) as i32]
}

/// Interpolates the 256 `0xAARRGGBB` texels of a legacy ramp. Stops must be strictly increasing
/// and below 256.
pub(crate) fn legacy_ramp(stops: &[u32], colors: &[u32]) -> Vec<u32> {
    let (stops, colors) = if stops.is_empty() {
        (&[0, LEGACY_RAMP_WIDTH - 1][..], &[0xFF00_0000, 0xFFFF_FFFF][..])
    } else {
        (stops, colors)
    };
    let mut ramp = vec![0u32; LEGACY_RAMP_WIDTH as usize];
    let first = stops[0] as usize;
    ramp[..first].fill(colors[0]);

    for (s, c) in stops.windows(2).zip(colors.windows(2)) {
        let (s0, s1) = (s[0] as i32, s[1] as i32);
        ramp[s0 as usize] = c[0];
        let (from, to) = (argb_channels(c[0]), argb_channels(c[1]));
        let ds = s1 - s0;
        for j in 1..ds {
            let [a, r, g, b]: [i32; 4] = std::array::from_fn(|i| from[i] + (to[i] - from[i]) * j / ds);
            ramp[(s0 + j) as usize] = ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        }
    }

    let last = stops.len() - 1;
    ramp[stops[last] as usize..].fill(colors[last]);
    ramp
}

impl<K: VgKernel> RenderContext<K> {
    /// Reallocates `image` as a `width` x 1 row and uploads `texels` into it.
    fn store_ramp(
        &mut self,
        image: &mut PixelBuffer,
        width: u32,
        format: BufferFormat,
        image_mode: ImageMode,
        texels: &[u8],
    ) -> VgResult<()> {
        if image.is_allocated() {
            self.free(image)?;
        }
        let mut fresh = PixelBuffer::new(width, 1, format);
        fresh.image_mode = image_mode;
        self.allocate(&mut fresh)?;
        let stride = fresh.stride();
        let mut row = texels.to_vec();
        row.resize(stride as usize, 0);
        self.upload(&fresh, &[PlaneData { bytes: &row, stride }])?;
        *image = fresh;
        Ok(())
    }

    /// Bakes the ramp of `grad` along its transformed axis.
    ///
    /// The ramp image gets 128 texels per stop. The gradient matrix is folded into the ramp
    /// matrix, so later matrix changes need another update.
    pub fn update_linear_grad(&mut self, grad: &mut LinearGradient) -> VgResult<()> {
        let m = &grad.matrix.m;
        let p = grad.params;
        let x0 = m[0][0] * p.x0 + m[0][1] * p.y0 + m[0][2];
        let y0 = m[1][0] * p.x0 + m[1][1] * p.y0 + m[1][2];
        let x1 = m[0][0] * p.x1 + m[0][1] * p.y1 + m[0][2];
        let y1 = m[1][0] * p.x1 + m[1][1] * p.y1 + m[1][2];
        let (dx, dy) = (x1 - x0, y1 - y0);
        let length = dx.hypot(dy);
        if !(length > 0.0) {
            return Err(VgError::invalid("linear gradient has no length"));
        }
        let width = grad.ramp.len() as u32 * TEXELS_PER_STOP;

        let angle = (dx / length).clamp(-1.0, 1.0).acos();
        let angle = if dy >= 0.0 { angle } else { 2.0 * PI - angle };
        let mut ramp_matrix = Matrix3x3::identity();
        ramp_matrix
            .translate(x0, y0)
            .rotate(angle.to_degrees())
            .scale(length / width as f32, 1.0);

        let texels = bake_ramp(&grad.ramp, width, grad.premultiplied);
        self.store_ramp(&mut grad.image, width, BufferFormat::Abgr8888, ImageMode::None, &texels)?;
        grad.ramp_matrix = ramp_matrix;
        debug!(width, length, stops = grad.ramp.len(), "linear gradient baked");
        Ok(())
    }

    /// Bakes the ramp of `grad`.
    pub fn update_radial_grad(&mut self, grad: &mut RadialGradient) -> VgResult<()> {
        if !(grad.params.r > 0.0) {
            return Err(VgError::invalid(format!("radial gradient radius {}", grad.params.r)));
        }
        let width = radial_ramp_width(&grad.ramp, grad.params.r);
        let texels = bake_ramp(&grad.ramp, width, grad.premultiplied);
        self.store_ramp(&mut grad.image, width, BufferFormat::Abgr8888, ImageMode::None, &texels)?;
        debug!(width, stops = grad.ramp.len(), "radial gradient baked");
        Ok(())
    }

    pub fn clear_linear_grad(&mut self, grad: &mut LinearGradient) -> VgResult<()> {
        grad.ramp = DEFAULT_RAMP.to_vec();
        if grad.image.is_allocated() {
            self.free(&mut grad.image)?;
        }
        Ok(())
    }

    pub fn clear_radial_grad(&mut self, grad: &mut RadialGradient) -> VgResult<()> {
        grad.ramp = DEFAULT_RAMP.to_vec();
        if grad.image.is_allocated() {
            self.free(&mut grad.image)?;
        }
        Ok(())
    }

    /// Allocates the 256 x 1 ramp of a legacy gradient with no stops.
    pub fn init_grad(&mut self) -> VgResult<LegacyGradient> {
        let mut image = PixelBuffer::new(LEGACY_RAMP_WIDTH, 1, BufferFormat::Bgra8888);
        self.allocate(&mut image)?;
        Ok(LegacyGradient {
            stops: Vec::new(),
            colors: Vec::new(),
            matrix: Matrix3x3::identity(),
            image,
        })
    }

    /// Rewrites the legacy ramp from the current stops.
    pub fn update_grad(&mut self, grad: &mut LegacyGradient) -> VgResult<()> {
        if !grad.image.is_allocated() {
            return Err(VgError::invalid("legacy gradient has no ramp image"));
        }
        let texels: Vec<u8> = legacy_ramp(&grad.stops, &grad.colors)
            .into_iter()
            .flat_map(u32::to_le_bytes)
            .collect();
        let stride = grad.image.stride();
        let mut row = texels;
        row.resize(stride as usize, 0);
        self.upload(&grad.image, &[PlaneData { bytes: &row, stride }])
    }

    pub fn clear_grad(&mut self, grad: &mut LegacyGradient) -> VgResult<()> {
        grad.stops.clear();
        grad.colors.clear();
        if grad.image.is_allocated() {
            self.free(&mut grad.image)?;
        }
        Ok(())
    }

    /// Programs the paint unit to read a gradient ramp through `matrix`.
    fn push_paint_source(
        &mut self,
        ramp: &PixelBuffer,
        matrix: &Matrix3x3,
        config_bits: u32,
        color: u32,
    ) -> VgResult<()> {
        self.push_sampling_steps(
            &regs::IMAGE_SAMPLER,
            matrix,
            Filter::Point,
            ramp.width,
            ramp.height,
            false,
        )?;
        self.push_state(regs::PAINT_CONFIG, ramp.format.source_code() | config_bits)?;
        self.push_state(regs::PAINT_COLOR, color)?;
        self.push_state(regs::PAINT_ADDRESS, ramp.address())?;
        // The paint unit walks a single row; only the tiling flag of the stride is read.
        let tiled = match ramp.tiling {
            Tiling::Tiled => regs::image::TILED_STRIDE,
            Tiling::Linear => 0,
        };
        self.push_state(regs::PAINT_STRIDE, tiled)?;
        self.push_state(regs::PAINT_ORIGIN, 0)?;
        self.push_state(regs::PAINT_SIZE, ramp.width | (ramp.height << 16))
    }

    /// Shared body of the linear and radial gradient fills.
    #[allow(clippy::too_many_arguments)]
    fn draw_gradient(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        path_matrix: Option<&Matrix3x3>,
        ramp: &PixelBuffer,
        ramp_matrix: &Matrix3x3,
        coefficients: &[(u32, f32)],
        spread: SpreadMode,
        fill_color: u32,
        paint: u32,
        blend: BlendMode,
        filter: Filter,
    ) -> VgResult<()> {
        self.reject_gc355_only_targets(target)?;
        if !ramp.is_allocated() {
            return Err(VgError::invalid("gradient ramp has not been baked"));
        }
        if path.is_empty() {
            return Ok(());
        }
        let path_matrix = path_matrix.copied().unwrap_or_default();
        let bounds = self.path_window_bounds(target, path, &path_matrix)?;

        let plan = self.premultiply_plan(ramp, target, blend);
        self.set_render_target(target, plan.apply_premult)?;

        for &(address, value) in coefficients {
            self.push_state_f32(address, value)?;
        }
        let color = match spread {
            SpreadMode::Fill => argb_to_abgr(fill_color),
            _ => fill_color,
        };
        self.push_paint_source(
            ramp,
            ramp_matrix,
            filter.hw_code() | spread.hw_code() | luminance_conversion(target, ramp) | plan.src_premultiply,
            color,
        )?;
        let transparency = match ramp.transparency {
            Transparency::Transparent => regs::control::TRANSPARENCY,
            Transparency::Opaque => 0,
        };
        let control = regs::control::PAINT
            | paint
            | plan.in_premult
            | ramp.image_mode.hw_code()
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

    /// Fills `path` with a baked linear gradient.
    pub fn draw_linear_grad(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        path_matrix: Option<&Matrix3x3>,
        grad: &LinearGradient,
        blend: BlendMode,
    ) -> VgResult<()> {
        self.require(Capabilities::LINEAR_GRADIENT, "linear gradients")?;
        let inverse = grad
            .ramp_matrix
            .inverse()
            .ok_or_else(|| VgError::invalid("linear gradient matrix is singular"))?;
        let axis = LinearParams {
            x0: 0.0,
            y0: 0.0,
            x1: grad.image.width as f32,
            y1: 0.0,
        };
        let coefficients = linear_coefficients(&inverse, &axis);
        self.draw_gradient(
            target,
            path,
            fill,
            path_matrix,
            &grad.image,
            &grad.ramp_matrix,
            &coefficients,
            grad.spread,
            grad.fill_color,
            regs::control::PAINT_LINEAR_GRADIENT,
            blend,
            Filter::Linear,
        )
    }

    /// Fills `path` with a baked radial gradient.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_radial_grad(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        path_matrix: Option<&Matrix3x3>,
        grad: &RadialGradient,
        blend: BlendMode,
        filter: Filter,
    ) -> VgResult<()> {
        self.require(Capabilities::RADIAL_GRADIENT, "radial gradients")?;
        if grad.params.r < 0.0 {
            return Err(VgError::invalid(format!("radial gradient radius {}", grad.params.r)));
        }
        let inverse = grad
            .matrix
            .inverse()
            .ok_or_else(|| VgError::invalid("radial gradient matrix is singular"))?;
        let coefficients = radial_coefficients(&inverse, &grad.params);
        self.draw_gradient(
            target,
            path,
            fill,
            path_matrix,
            &grad.image,
            &grad.matrix,
            &coefficients,
            grad.spread,
            grad.fill_color,
            regs::control::PAINT_RADIAL_GRADIENT,
            blend,
            filter,
        )
    }

    /// Fills `path` with a legacy gradient: its ramp as a padded pattern through the gradient
    /// matrix.
    pub fn draw_grad(
        &mut self,
        target: &PixelBuffer,
        path: &VgPath,
        fill: FillRule,
        matrix: Option<&Matrix3x3>,
        grad: &LegacyGradient,
        blend: BlendMode,
    ) -> VgResult<()> {
        self.draw_pattern(
            target,
            path,
            fill,
            matrix,
            &grad.image,
            Some(&grad.matrix),
            blend,
            PatternMode::Pad,
            0,
            Filter::Linear,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::path::{PathFormat, PathOp, Quality};
    use crate::testutil::{context, register_writes};
    use pretty_assertions::assert_eq;
    use vglite_kernel::SimulatedKernel;

    fn red(stop: f32) -> ColorStop {
        ColorStop::new(stop, 1.0, 0.0, 0.0, 1.0)
    }

    fn blue(stop: f32) -> ColorStop {
        ColorStop::new(stop, 0.0, 0.0, 1.0, 1.0)
    }

    fn square() -> VgPath {
        VgPath::from_ops(
            PathFormat::S16,
            Quality::High,
            &[PathOp::Move, PathOp::Line, PathOp::Line, PathOp::Line, PathOp::Close],
            &[0.0, 0.0, 32.0, 0.0, 32.0, 32.0, 0.0, 32.0],
        )
        .unwrap()
    }

    fn read_row(ctx: &mut RenderContext<SimulatedKernel>, image: &PixelBuffer) -> Vec<u8> {
        let mut row = vec![0u8; image.stride() as usize];
        ctx.kernel_mut().memory().read_physical(image.address() as u64, &mut row);
        row
    }

    #[test]
    fn missing_boundary_stops_replicate_the_nearest_color() {
        let ramp = normalize_ramp(&[red(0.25), blue(0.75)]).unwrap();
        assert_eq!(ramp, vec![red(0.0), red(0.25), blue(0.75), blue(1.0)]);
    }

    #[test]
    fn colors_are_clamped() {
        let ramp = normalize_ramp(&[ColorStop::new(0.0, 2.0, -1.0, 0.5, 1.5)]).unwrap();
        assert_eq!(ramp[0], ColorStop::new(0.0, 1.0, 0.0, 0.5, 1.0));
    }

    #[test]
    fn invalid_ramps_are_rejected() {
        assert_eq!(normalize_ramp(&[]), None);
        assert_eq!(normalize_ramp(&[red(0.5), blue(0.25)]), None);
        assert_eq!(normalize_ramp(&[red(-0.1), blue(1.0)]), None);
        assert_eq!(normalize_ramp(&[red(0.0), blue(1.5)]), None);
        assert_eq!(normalize_ramp(&vec![red(0.5); MAX_RAMP_STOPS + 1]), None);
        assert!(normalize_ramp(&vec![red(0.5); MAX_RAMP_STOPS]).is_some());
    }

    #[test]
    fn coincident_endpoints_select_the_default_ramp() {
        let mut grad = LinearGradient::new();
        let params = LinearParams { x0: 4.0, y0: 4.0, x1: 4.0, y1: 4.0 };
        let err = grad.set(&[red(0.0), blue(1.0)], params, SpreadMode::Pad, false);
        assert!(matches!(err, Err(VgError::InvalidArgument(_))));
        assert_eq!(grad.ramp(), &DEFAULT_RAMP[..]);
    }

    #[test]
    fn non_positive_radius_selects_the_default_ramp() {
        let mut grad = RadialGradient::new();
        let params = RadialParams { r: 0.0, ..RadialParams::default() };
        assert!(grad.set(&[red(0.0)], params, SpreadMode::Fill, false).is_err());
        assert_eq!(grad.ramp(), &DEFAULT_RAMP[..]);
    }

    #[test]
    fn default_ramp_bakes_black_to_white() {
        let texels = bake_ramp(&DEFAULT_RAMP, 256, false);
        assert_eq!(texels.len(), 1024);
        assert_eq!(&texels[..4], &[255, 0, 0, 0]);
        assert_eq!(&texels[1020..], &[255, 255, 255, 255]);
        let mid = texels[128 * 4 + 3];
        assert!((127..=129).contains(&mid), "mid texel red {mid}");
    }

    #[test]
    fn premultiplied_bake_scales_color_by_alpha() {
        let half_red = ColorStop::new(0.0, 1.0, 0.0, 0.0, 0.5);
        let texels = bake_ramp(&[half_red, ColorStop { stop: 1.0, ..half_red }], 16, true);
        assert_eq!(&texels[..4], &[128, 0, 0, 128]);
        let straight = bake_ramp(&[half_red, ColorStop { stop: 1.0, ..half_red }], 16, false);
        assert_eq!(&straight[..4], &[128, 0, 0, 255]);
    }

    #[test]
    fn radial_width_follows_the_stop_denominator() {
        let ramp = normalize_ramp(&[red(0.0), blue(0.5), red(1.0)]).unwrap();
        assert_eq!(radial_ramp_width(&ramp, 0.5), 16);
        assert_eq!(radial_ramp_width(&ramp, 4.0), 3 * TEXELS_PER_STOP);
        let thirds = normalize_ramp(&[red(0.0), blue(0.3), red(1.0)]).unwrap();
        assert_eq!(radial_ramp_width(&thirds, 0.5), 16);
    }

    #[test]
    fn linear_coefficients_on_the_x_axis() {
        let c = linear_coefficients(&Matrix3x3::identity(), &LinearParams { x0: 0.0, y0: 0.0, x1: 10.0, y1: 0.0 });
        assert_eq!(c[0].0, regs::LINEAR_CONSTANT);
        assert!((c[0].1 - 0.05).abs() < 1e-6);
        assert!((c[1].1 - 0.1).abs() < 1e-6);
        assert_eq!(c[2].1, 0.0);
    }

    #[test]
    fn focal_point_outside_the_circle_is_pulled_in() {
        let params = RadialParams { cx: 0.0, cy: 0.0, r: 10.0, fx: 20.0, fy: 0.0 };
        let c = radial_coefficients(&Matrix3x3::identity(), &params);
        assert_eq!(c[1].0, regs::LINEAR_STEP_X);
        assert!((c[1].1 - 9.0 / 19.0).abs() < 1e-5, "step x {}", c[1].1);
        assert!(c.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn update_linear_grad_uploads_the_ramp() {
        let mut ctx = context(DriverConfig::default());
        let mut grad = LinearGradient::new();
        grad.set(&[red(0.0), blue(1.0)], LinearParams { x0: 0.0, y0: 0.0, x1: 64.0, y1: 0.0 }, SpreadMode::Pad, false)
            .unwrap();
        ctx.update_linear_grad(&mut grad).unwrap();

        let image = grad.image().clone();
        assert_eq!((image.width, image.height), (256, 1));
        assert_eq!(image.image_mode, ImageMode::None);
        let row = read_row(&mut ctx, &image);
        assert_eq!(&row[..4], &[255, 0, 0, 255]);
        assert_eq!(&row[1020..1024], &[255, 255, 0, 0]);
        assert!((grad.ramp_matrix.m[0][0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn vertical_axis_rotates_the_ramp() {
        let mut ctx = context(DriverConfig::default());
        let mut grad = LinearGradient::new();
        grad.set(&DEFAULT_RAMP, LinearParams { x0: 0.0, y0: 0.0, x1: 0.0, y1: -32.0 }, SpreadMode::Pad, false)
            .unwrap();
        ctx.update_linear_grad(&mut grad).unwrap();
        // 270 degrees maps the ramp's +x onto -y.
        let (x, y) = (grad.ramp_matrix.m[0][0], grad.ramp_matrix.m[1][0]);
        assert!(x.abs() < 1e-6 && y < 0.0, "axis ({x}, {y})");
    }

    #[test]
    fn draw_linear_grad_programs_the_paint_unit() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let mut grad = LinearGradient::new();
        grad.set(&DEFAULT_RAMP, LinearParams { x0: 0.0, y0: 0.0, x1: 32.0, y1: 0.0 }, SpreadMode::Pad, false)
            .unwrap();
        ctx.update_linear_grad(&mut grad).unwrap();
        ctx.draw_linear_grad(&target, &square(), FillRule::NonZero, None, &grad, BlendMode::SrcOver)
            .unwrap();

        let writes = register_writes(ctx.pending_commands());
        assert!(writes.iter().any(|w| w.0 == regs::LINEAR_CONSTANT));
        assert!(writes.contains(&(regs::PAINT_ADDRESS, grad.image().address())));
        assert!(writes.contains(&(regs::PAINT_SIZE, 256 | (1 << 16))));
        let config = writes.iter().find(|w| w.0 == regs::PAINT_CONFIG).unwrap().1;
        assert_eq!(config & regs::image::TILE_REFLECT, regs::image::TILE_PAD);
        let control = writes.iter().find(|w| w.0 == regs::CONTROL && w.1 & regs::control::PAINT != 0).unwrap().1;
        assert_eq!(control & regs::control::PAINT_PATTERN, regs::control::PAINT_LINEAR_GRADIENT);
    }

    #[test]
    fn gradients_need_their_capability() {
        let config = DriverConfig {
            capabilities: Capabilities::default() - Capabilities::RADIAL_GRADIENT,
            ..DriverConfig::default()
        };
        let mut ctx = context(config);
        let mut target = PixelBuffer::new(16, 16, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let grad = RadialGradient::new();
        let err = ctx.draw_radial_grad(&target, &square(), FillRule::NonZero, None, &grad, BlendMode::None, Filter::Linear);
        assert_eq!(err, Err(VgError::NotSupport("radial gradients")));
    }

    #[test]
    fn unbaked_gradients_are_rejected() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(16, 16, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let grad = LinearGradient::new();
        let err = ctx.draw_linear_grad(&target, &square(), FillRule::NonZero, None, &grad, BlendMode::None);
        assert!(matches!(err, Err(VgError::InvalidArgument(_))));
    }

    #[test]
    fn radial_draw_uses_the_radial_paint_mode() {
        let mut ctx = context(DriverConfig::default());
        let mut target = PixelBuffer::new(64, 64, BufferFormat::Argb8888);
        ctx.allocate(&mut target).unwrap();
        let mut grad = RadialGradient::new();
        let params = RadialParams { cx: 16.0, cy: 16.0, r: 16.0, fx: 16.0, fy: 16.0 };
        grad.set(&[red(0.0), blue(1.0)], params, SpreadMode::Fill, false).unwrap();
        grad.fill_color = 0xFF00_00FF;
        ctx.update_radial_grad(&mut grad).unwrap();
        ctx.draw_radial_grad(&target, &square(), FillRule::EvenOdd, None, &grad, BlendMode::SrcOver, Filter::Linear)
            .unwrap();

        let writes = register_writes(ctx.pending_commands());
        for reg in [regs::RADIAL_CONSTANT, regs::RADIAL_STEP_XX, regs::RADIAL_STEP_XY] {
            assert!(writes.iter().any(|w| w.0 == reg), "missing {reg:#x}");
        }
        assert!(writes.contains(&(regs::PAINT_COLOR, 0xFFFF_0000)));
        let control = writes.iter().find(|w| w.0 == regs::CONTROL && w.1 & regs::control::PAINT != 0).unwrap().1;
        assert_eq!(control & regs::control::PAINT_PATTERN, regs::control::PAINT_RADIAL_GRADIENT);
    }

    #[test]
    fn legacy_set_keeps_increasing_stops() {
        let mut ctx = context(DriverConfig::default());
        let mut grad = ctx.init_grad().unwrap();
        grad.set(&[1, 2, 3, 4, 5], &[10, 5, 10, 300, 40]).unwrap();
        assert_eq!(grad.stops().collect::<Vec<_>>(), vec![(10, 3), (40, 5)]);
        assert!(grad.set(&[1], &[]).is_err());
    }

    #[test]
    fn legacy_ramp_defaults_to_black_and_white() {
        let ramp = legacy_ramp(&[], &[]);
        assert_eq!(ramp[0], 0xFF00_0000);
        assert_eq!(ramp[128], 0xFF80_8080);
        assert_eq!(ramp[255], 0xFFFF_FFFF);
    }

    #[test]
    fn legacy_ramp_pads_outside_the_stops() {
        let ramp = legacy_ramp(&[64, 192], &[0xFF00_0000, 0xFFFF_0000]);
        assert_eq!(ramp[0], 0xFF00_0000);
        assert_eq!(ramp[63], 0xFF00_0000);
        assert_eq!(ramp[128], 0xFF7F_0000);
        assert!(ramp[192..].iter().all(|&c| c == 0xFFFF_0000));
    }

    #[test]
    fn legacy_update_writes_bgra_texels() {
        let mut ctx = context(DriverConfig::default());
        let mut grad = ctx.init_grad().unwrap();
        grad.set(&[0xFF11_2233], &[0]).unwrap();
        ctx.update_grad(&mut grad).unwrap();
        let image = grad.image().clone();
        let row = read_row(&mut ctx, &image);
        assert_eq!(&row[..4], &[0x33, 0x22, 0x11, 0xFF]);
        assert_eq!(&row[1020..1024], &[0x33, 0x22, 0x11, 0xFF]);

        ctx.clear_grad(&mut grad).unwrap();
        assert!(!grad.image().is_allocated());
        assert!(ctx.update_grad(&mut grad).is_err());
    }
}
