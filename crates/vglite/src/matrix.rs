//! 3x3 transforms and point projection.

use crate::format::Filter;

/// Row-major 3x3 transform.
///
/// `scale_x`, `scale_y` and `angle` accumulate the factors passed to [`Matrix3x3::scale`] and
/// [`Matrix3x3::rotate`]. Only step corrections read them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3x3 {
    pub m: [[f32; 3]; 3],
    pub scale_x: f32,
    pub scale_y: f32,
    /// Degrees.
    pub angle: f32,
}

impl Default for Matrix3x3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Matrix3x3 {
    pub const fn identity() -> Self {
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub const fn from_rows(m: [[f32; 3]; 3]) -> Self {
        Self {
            m,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
        }
    }

    /// `self * other`.
    pub fn multiply(&self, other: &Matrix3x3) -> Matrix3x3 {
        let mut m = [[0.0f32; 3]; 3];
        for (r, row) in m.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (0..3).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Matrix3x3 { m, ..*self }
    }

    /// Post-multiplies a translation.
    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        let t = Matrix3x3::from_rows([[1.0, 0.0, x], [0.0, 1.0, y], [0.0, 0.0, 1.0]]);
        self.m = self.multiply(&t).m;
        self
    }

    /// Post-multiplies a scale.
    pub fn scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        let s = Matrix3x3::from_rows([[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]]);
        self.m = self.multiply(&s).m;
        self.scale_x *= sx;
        self.scale_y *= sy;
        self
    }

    /// Post-multiplies a rotation by `degrees`, clockwise in y-down device space.
    pub fn rotate(&mut self, degrees: f32) -> &mut Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let r = Matrix3x3::from_rows([[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]]);
        self.m = self.multiply(&r).m;
        self.angle += degrees;
        self
    }

    pub fn is_affine(&self) -> bool {
        self.m[2][0] == 0.0 && self.m[2][1] == 0.0 && self.m[2][2] == 1.0
    }

    /// No shear, rotation or homogeneous scale: axis-aligned rectangles map to pixel-exact
    /// axis-aligned rectangles.
    pub fn is_axis_aligned(&self) -> bool {
        let m = &self.m;
        m[0][1] == 0.0 && m[1][0] == 0.0 && m[2][0] == 0.0 && m[2][1] == 0.0 && m[2][2] == 1.0
    }

    pub fn determinant(&self) -> f32 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Cofactor inverse. `None` when the determinant is exactly zero.
    ///
    /// The projective row of an affine inverse is set to `[0, 0, 1]` rather than computed.
    pub fn inverse(&self) -> Option<Matrix3x3> {
        let m = &self.m;
        let det00 = m[1][1] * m[2][2] - m[2][1] * m[1][2];
        let det01 = m[2][0] * m[1][2] - m[1][0] * m[2][2];
        let det02 = m[1][0] * m[2][1] - m[2][0] * m[1][1];
        let d = m[0][0] * det00 + m[0][1] * det01 + m[0][2] * det02;
        if d == 0.0 {
            return None;
        }
        let d = 1.0 / d;

        let mut r = [[0.0f32; 3]; 3];
        r[0][0] = d * det00;
        r[0][1] = d * (m[2][1] * m[0][2] - m[0][1] * m[2][2]);
        r[0][2] = d * (m[0][1] * m[1][2] - m[1][1] * m[0][2]);
        r[1][0] = d * det01;
        r[1][1] = d * (m[0][0] * m[2][2] - m[2][0] * m[0][2]);
        r[1][2] = d * (m[1][0] * m[0][2] - m[0][0] * m[1][2]);
        if self.is_affine() {
            r[2] = [0.0, 0.0, 1.0];
        } else {
            r[2][0] = d * det02;
            r[2][1] = d * (m[2][0] * m[0][1] - m[0][0] * m[2][1]);
            r[2][2] = d * (m[0][0] * m[1][1] - m[1][0] * m[0][1]);
        }
        Some(Matrix3x3::from_rows(r))
    }

    /// Projects `(x, y)` with a perspective divide, rounding half away from zero.
    pub fn apply(&self, x: f32, y: f32) -> Option<Point> {
        let m = &self.m;
        let w = x * m[2][0] + y * m[2][1] + m[2][2];
        if w <= 0.0 {
            return None;
        }
        let px = (x * m[0][0] + y * m[0][1] + m[0][2]) / w;
        let py = (x * m[1][0] + y * m[1][1] + m[1][2]) / w;
        Some(Point::new(px.round() as i32, py.round() as i32))
    }
}

/// Maps a source coordinate to device space. `None` for the matrix means identity.
///
/// Interpolating filters on a rotated matrix sample half a pixel inward, so the projected
/// corner is nudged the same way.
pub fn transform(x: f32, y: f32, matrix: Option<&Matrix3x3>, filter: Filter) -> Option<Point> {
    let Some(matrix) = matrix else {
        return Some(Point::new(x as i32, y as i32));
    };
    let (mut x, mut y) = (x, y);
    if !matrix.is_axis_aligned() {
        if matches!(filter, Filter::Linear | Filter::BiLinear) && x != 0.0 {
            x += 0.5;
        }
        if filter == Filter::BiLinear && y != 0.0 {
            y += 0.5;
        }
    }
    matrix.apply(x, y)
}

/// Device-space bounds of a `width` x `height` source rectangle.
///
/// Returns `(min, max)` over the four projected corners, or `None` if any corner falls behind
/// the projection plane.
pub fn transformed_bounds(
    width: f32,
    height: f32,
    matrix: Option<&Matrix3x3>,
    filter: Filter,
) -> Option<(Point, Point)> {
    let corners = [(0.0, 0.0), (0.0, height), (width, height), (width, 0.0)];
    let mut min = Point::new(i32::MAX, i32::MAX);
    let mut max = Point::new(i32::MIN, i32::MIN);
    for (x, y) in corners {
        let p = transform(x, y, matrix, filter)?;
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}
