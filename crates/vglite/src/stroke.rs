//! CPU stroking.
//!
//! The tessellator only fills. A stroked path is turned into a second, `FP32` path whose
//! polygons cover the stroke: one quad per segment, plus joins and caps. Every polygon is wound
//! the same way, so a non-zero fill of the outline paints their union.
//!
//! Curves are flattened first and dashes are cut from the flattened polylines, so dash lengths
//! follow the curve.

use std::f32::consts::PI;

use tracing::{debug, trace};

use crate::error::{VgError, VgResult};
use crate::path::{PathFormat, PathOp, VgPath};

/// Squared distance under which two consecutive points are the same point.
const SAME_POINT: f32 = 1e-12;

/// Shape drawn at the open ends of a stroked subpath or dash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CapStyle {
    #[default]
    Butt,
    Round,
    Square,
}

/// Shape drawn where two stroked segments meet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JoinStyle {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Which outlines [`crate::RenderContext::draw`] fills for a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PathType {
    #[default]
    Fill,
    Stroke,
    FillStroke,
}

impl PathType {
    pub const fn fills(self) -> bool {
        matches!(self, PathType::Fill | PathType::FillStroke)
    }

    pub const fn strokes(self) -> bool {
        matches!(self, PathType::Stroke | PathType::FillStroke)
    }
}

/// Stroke parameters of a path.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub cap: CapStyle,
    pub join: JoinStyle,
    pub line_width: f32,
    /// Longest miter allowed, as a multiple of the line width. Sharper joins are beveled.
    pub miter_limit: f32,
    /// Alternating on and off lengths, starting with on. Empty for a solid stroke.
    pub dash_pattern: Vec<f32>,
    /// Distance into the pattern where each subpath starts.
    pub dash_phase: f32,
    /// Written to `COLOR` as is.
    pub color: u32,
}

impl StrokeStyle {
    /// Solid stroke with butt caps and miter joins.
    pub fn solid(line_width: f32, color: u32) -> Self {
        Self {
            cap: CapStyle::Butt,
            join: JoinStyle::Miter,
            line_width,
            miter_limit: 4.0,
            dash_pattern: Vec::new(),
            dash_phase: 0.0,
            color,
        }
    }

    /// Rejects a non-positive width and clamps everything else into range: the miter limit is
    /// at least 1, an odd trailing dash entry is dropped, negative dash entries become 0 and a
    /// negative phase is wrapped forward into the pattern.
    fn normalized(mut self) -> VgResult<Self> {
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(VgError::invalid(format!(
                "stroke width {} must be positive",
                self.line_width
            )));
        }
        if self.miter_limit.is_nan() || self.miter_limit < 1.0 {
            self.miter_limit = 1.0;
        }
        let even = self.dash_pattern.len() & !1;
        self.dash_pattern.truncate(even);
        for length in &mut self.dash_pattern {
            if length.is_nan() || *length < 0.0 {
                *length = 0.0;
            }
        }
        if self.dash_phase < 0.0 {
            let total: f32 = self.dash_pattern.iter().sum();
            self.dash_phase = if total > 0.0 {
                self.dash_phase + ((-self.dash_phase / total) as i32 + 1) as f32 * total
            } else {
                0.0
            };
        }
        Ok(self)
    }

    fn half_width(&self) -> f32 {
        self.line_width / 2.0
    }
}

/// Stroke state carried by a [`VgPath`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stroke {
    pub style: StrokeStyle,
    /// Generated by [`VgPath::update_stroke`]; dropped whenever the path is re-encoded.
    pub outline: Option<VgPath>,
}

impl VgPath {
    pub fn path_type(&self) -> PathType {
        self.path_type
    }

    pub fn set_path_type(&mut self, path_type: PathType) {
        self.path_type = path_type;
    }

    /// Sets the stroke parameters. Any generated outline is dropped until the next
    /// [`Self::update_stroke`].
    pub fn set_stroke(&mut self, style: StrokeStyle) -> VgResult<()> {
        let style = style.normalized()?;
        self.stroke = Some(Box::new(Stroke { style, outline: None }));
        Ok(())
    }

    pub fn stroke_style(&self) -> Option<&StrokeStyle> {
        self.stroke.as_deref().map(|stroke| &stroke.style)
    }

    /// The outline built by the last [`Self::update_stroke`], if still current.
    pub fn stroke_outline(&self) -> Option<&VgPath> {
        self.stroke.as_deref().and_then(|stroke| stroke.outline.as_ref())
    }

    /// Rebuilds the stroke outline from the path data and the stroke parameters.
    pub fn update_stroke(&mut self) -> VgResult<()> {
        let Some(stroke) = self.stroke.as_deref() else {
            return Err(VgError::invalid("path has no stroke parameters"));
        };
        let polygons = if self.is_empty() {
            Vec::new()
        } else {
            let polylines = flatten(self)?;
            let polylines = dash(polylines, &stroke.style.dash_pattern, stroke.style.dash_phase);
            outline(&polylines, &stroke.style)
        };
        let path = outline_path(self, &polygons)?;
        debug!(polygons = polygons.len(), bytes = path.data().len(), "stroke updated");
        if let Some(stroke) = self.stroke.as_mut() {
            stroke.outline = Some(path);
        }
        Ok(())
    }
}

type Vec2 = [f32; 2];

#[derive(Debug, Clone, PartialEq)]
struct Polyline {
    points: Vec<Vec2>,
    closed: bool,
}

fn add(a: Vec2, b: Vec2) -> Vec2 {
    [a[0] + b[0], a[1] + b[1]]
}

fn sub(a: Vec2, b: Vec2) -> Vec2 {
    [a[0] - b[0], a[1] - b[1]]
}

fn scale(a: Vec2, s: f32) -> Vec2 {
    [a[0] * s, a[1] * s]
}

fn dot(a: Vec2, b: Vec2) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

fn cross(a: Vec2, b: Vec2) -> f32 {
    a[0] * b[1] - a[1] * b[0]
}

fn length(a: Vec2) -> f32 {
    dot(a, a).sqrt()
}

fn lerp(a: Vec2, b: Vec2, t: f32) -> Vec2 {
    add(a, scale(sub(b, a), t))
}

/// Left-hand normal of the unit direction `d`.
fn normal(d: Vec2) -> Vec2 {
    [-d[1], d[0]]
}

/// Subdivisions for a curve with the given control polygon.
fn curve_steps(control: &[Vec2]) -> usize {
    let len: f32 = control.windows(2).map(|w| length(sub(w[1], w[0]))).sum();
    (len.sqrt() * 2.0).ceil().clamp(2.0, 64.0) as usize
}

/// Decodes the path stream into polylines, flattening curves.
fn flatten(path: &VgPath) -> VgResult<Vec<Polyline>> {
    let format = path.format;
    let size = format.bytes();
    let data = path.data();
    let mut lines = Vec::new();
    let mut current: Vec<Vec2> = Vec::new();
    let (mut start, mut pen) = ([0.0f32; 2], [0.0f32; 2]);
    let mut offset = 0;
    let mut ended = false;

    while offset < data.len() {
        let op = PathOp::from_code(data[offset])
            .ok_or_else(|| VgError::invalid(format!("unknown path opcode {:#04x}", data[offset])))?;
        offset += size;
        let end = offset + op.coords() * size;
        if end > data.len() {
            return Err(VgError::invalid("path data ends inside an opcode"));
        }
        let v: Vec<f32> = (0..op.coords()).map(|i| format.read(&data[offset + i * size..])).collect();
        offset = end;
        let base = if op.is_relative() { pen } else { [0.0; 2] };
        if current.is_empty() && !matches!(op, PathOp::Move | PathOp::MoveRel | PathOp::Close | PathOp::End) {
            start = pen;
            current.push(pen);
        }
        match op {
            PathOp::End => {
                ended = true;
                break;
            }
            PathOp::Close => {
                finish(&mut lines, &mut current, true);
                pen = start;
            }
            PathOp::Move | PathOp::MoveRel => {
                finish(&mut lines, &mut current, false);
                pen = add(base, [v[0], v[1]]);
                start = pen;
                current.push(pen);
            }
            PathOp::Line | PathOp::LineRel => {
                pen = add(base, [v[0], v[1]]);
                current.push(pen);
            }
            PathOp::HLine | PathOp::HLineRel => {
                pen = [base[0] + v[0], pen[1]];
                current.push(pen);
            }
            PathOp::VLine | PathOp::VLineRel => {
                pen = [pen[0], base[1] + v[0]];
                current.push(pen);
            }
            PathOp::Quad | PathOp::QuadRel => {
                let c = add(base, [v[0], v[1]]);
                let p = add(base, [v[2], v[3]]);
                let steps = curve_steps(&[pen, c, p]);
                for i in 1..=steps {
                    let t = i as f32 / steps as f32;
                    current.push(lerp(lerp(pen, c, t), lerp(c, p, t), t));
                }
                pen = p;
            }
            PathOp::Cubic | PathOp::CubicRel => {
                let c0 = add(base, [v[0], v[1]]);
                let c1 = add(base, [v[2], v[3]]);
                let p = add(base, [v[4], v[5]]);
                let steps = curve_steps(&[pen, c0, c1, p]);
                for i in 1..=steps {
                    let t = i as f32 / steps as f32;
                    let a = lerp(lerp(pen, c0, t), lerp(c0, c1, t), t);
                    let b = lerp(lerp(c0, c1, t), lerp(c1, p, t), t);
                    current.push(lerp(a, b, t));
                }
                pen = p;
            }
        }
    }
    finish(&mut lines, &mut current, ended && path.ends_closed);
    trace!(polylines = lines.len(), "path flattened");
    Ok(lines)
}

/// Moves `points` into `lines` as one polyline, dropping repeated points. A single point strokes
/// to nothing and is discarded.
fn finish(lines: &mut Vec<Polyline>, points: &mut Vec<Vec2>, closed: bool) {
    let mut kept: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points.drain(..) {
        if !kept.last().is_some_and(|&last| dot(sub(p, last), sub(p, last)) <= SAME_POINT) {
            kept.push(p);
        }
    }
    let closed = closed && kept.len() > 2;
    if closed {
        let (first, last) = (kept[0], kept[kept.len() - 1]);
        if dot(sub(last, first), sub(last, first)) <= SAME_POINT {
            kept.pop();
        }
    }
    if kept.len() >= 2 {
        lines.push(Polyline { points: kept, closed });
    }
}

/// Cuts every polyline into dashes. Each subpath restarts the pattern at `phase`.
fn dash(lines: Vec<Polyline>, pattern: &[f32], phase: f32) -> Vec<Polyline> {
    let total: f32 = pattern.iter().sum();
    if pattern.is_empty() || total <= 0.0 {
        return lines;
    }
    let mut dashes = Vec::new();
    for line in lines {
        let mut points = line.points;
        if line.closed {
            points.push(points[0]);
        }

        let mut index = 0;
        let mut skip = phase % total;
        while skip >= pattern[index] {
            skip -= pattern[index];
            index = (index + 1) % pattern.len();
        }
        let mut remaining = pattern[index] - skip;
        let mut current: Vec<Vec2> = if index % 2 == 0 { vec![points[0]] } else { Vec::new() };

        for w in points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let seg = length(sub(b, a));
            let mut t = 0.0;
            while seg - t > remaining {
                t += remaining;
                // Ends the current dash, or starts the next one.
                current.push(lerp(a, b, t / seg));
                if index % 2 == 0 {
                    dashes.push(Polyline {
                        points: std::mem::take(&mut current),
                        closed: false,
                    });
                }
                index = (index + 1) % pattern.len();
                remaining = pattern[index];
            }
            remaining -= seg - t;
            if index % 2 == 0 {
                current.push(b);
            }
        }
        if index % 2 == 0 {
            dashes.push(Polyline {
                points: current,
                closed: false,
            });
        }
    }
    dashes
        .into_iter()
        .filter_map(|mut d| {
            let mut kept = Vec::new();
            finish(&mut kept, &mut d.points, false);
            kept.pop()
        })
        .collect()
}

/// Polygons covering the stroke of every polyline.
fn outline(lines: &[Polyline], style: &StrokeStyle) -> Vec<Vec<Vec2>> {
    let half = style.half_width();
    let mut polygons = Vec::new();
    for line in lines {
        let points = &line.points;
        let n = points.len();
        let segments = if line.closed { n } else { n - 1 };
        let dir = |i: usize| {
            let d = sub(points[(i + 1) % n], points[i]);
            scale(d, 1.0 / length(d))
        };

        for i in 0..segments {
            let (a, b) = (points[i], points[(i + 1) % n]);
            let off = scale(normal(dir(i)), half);
            polygons.push(vec![add(a, off), add(b, off), sub(b, off), sub(a, off)]);
        }

        let joints = if line.closed { 0..n } else { 1..n - 1 };
        for i in joints {
            let incoming = dir((i + n - 1) % n);
            let outgoing = dir(i);
            join(&mut polygons, points[i], incoming, outgoing, style);
        }

        if !line.closed {
            cap(&mut polygons, points[0], scale(dir(0), -1.0), style);
            cap(&mut polygons, points[n - 1], dir(n - 2), style);
        }
    }
    polygons
}

fn join(polygons: &mut Vec<Vec<Vec2>>, at: Vec2, incoming: Vec2, outgoing: Vec2, style: &StrokeStyle) {
    let half = style.half_width();
    let turn = cross(incoming, outgoing);
    if turn.abs() < 1e-6 && dot(incoming, outgoing) > 0.0 {
        return;
    }
    if style.join == JoinStyle::Round {
        polygons.push(circle(at, half));
        return;
    }
    // The outer side of the turn is opposite the normal it turns towards.
    let side = if turn > 0.0 { -half } else { half };
    let o0 = scale(normal(incoming), side);
    let o1 = scale(normal(outgoing), side);

    if style.join == JoinStyle::Miter {
        let bisector = add(o0, o1);
        let cos_half = (dot(o0, o1) / (half * half) + 1.0).max(0.0).sqrt() / 2f32.sqrt();
        if cos_half > 0.0 && 1.0 / cos_half <= style.miter_limit {
            let tip = add(at, scale(bisector, half / (cos_half * length(bisector))));
            polygons.push(vec![at, add(at, o0), tip, add(at, o1)]);
            return;
        }
    }
    polygons.push(vec![at, add(at, o0), add(at, o1)]);
}

/// Cap at `end`, with `forward` the unit direction pointing out of the stroke.
fn cap(polygons: &mut Vec<Vec<Vec2>>, end: Vec2, forward: Vec2, style: &StrokeStyle) {
    let half = style.half_width();
    match style.cap {
        CapStyle::Butt => {}
        CapStyle::Round => polygons.push(circle(end, half)),
        CapStyle::Square => {
            let side = scale(normal(forward), half);
            let tip = add(end, scale(forward, half));
            polygons.push(vec![add(end, side), add(tip, side), sub(tip, side), sub(end, side)]);
        }
    }
}

fn circle(center: Vec2, radius: f32) -> Vec<Vec2> {
    let steps = (radius.sqrt() * 8.0).ceil().clamp(8.0, 64.0) as usize;
    (0..steps)
        .map(|i| {
            let a = 2.0 * PI * i as f32 / steps as f32;
            [center[0] + radius * a.cos(), center[1] + radius * a.sin()]
        })
        .collect()
}

fn signed_area(polygon: &[Vec2]) -> f32 {
    let n = polygon.len();
    (0..n).map(|i| cross(polygon[i], polygon[(i + 1) % n])).sum::<f32>() / 2.0
}

/// Encodes `polygons` as an `FP32` path, each wound with positive area.
fn outline_path(source: &VgPath, polygons: &[Vec<Vec2>]) -> VgResult<VgPath> {
    let mut ops = Vec::new();
    let mut coords = Vec::new();
    for polygon in polygons {
        let area = signed_area(polygon);
        if area.abs() <= f32::EPSILON {
            continue;
        }
        let mut polygon = polygon.clone();
        if area < 0.0 {
            polygon.reverse();
        }
        for (i, p) in polygon.iter().enumerate() {
            ops.push(if i == 0 { PathOp::Move } else { PathOp::Line });
            coords.extend_from_slice(p);
        }
        ops.push(PathOp::Close);
    }
    VgPath::from_ops(PathFormat::Fp32, source.quality, &ops, &coords)
}
