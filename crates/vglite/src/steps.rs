//! Per-draw sampling steps.
//!
//! The pixel pipe walks the destination and evaluates `u = (x[0]·px + y[0]·py + c[0]) / w` (and
//! the same for `v` and `w` with index 1 and 2) to find the normalized source coordinate. The
//! steps are the destination-to-source inverse matrix, normalized by the source size and biased
//! so sample centers land on texel centers.

use std::fmt;

use crate::format::Filter;
use crate::matrix::Matrix3x3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingSteps {
    pub c: [f32; 3],
    pub x: [f32; 3],
    pub y: [f32; 3],
}

impl SamplingSteps {
    /// Steps for sampling a `width` x `height` image through `inverse`.
    pub fn from_inverse(inverse: &Matrix3x3, filter: Filter, width: f32, height: f32) -> Self {
        let i = &inverse.m;
        let mut steps = SamplingSteps {
            x: [i[0][0] / width, i[1][0] / height, i[2][0]],
            y: [i[0][1] / width, i[1][1] / height, i[2][1]],
            c: [
                (0.5 * (i[0][0] + i[0][1]) + i[0][2]) / width,
                (0.5 * (i[1][0] + i[1][1]) + i[1][2]) / height,
                0.5 * (i[2][0] + i[2][1]) + i[2][2],
            ],
        };
        let projective_bias = 0.25 * (i[2][0] + i[2][1]) + 0.5 * i[2][2];
        if matches!(filter, Filter::Linear | Filter::BiLinear) {
            steps.x[0] = (i[0][0] - 0.5 * i[2][0]) / width;
            steps.y[0] = (i[0][1] - 0.5 * i[2][1]) / width;
            steps.c[0] = (0.5 * (i[0][0] + i[0][1]) + i[0][2] - projective_bias) / width;
        }
        if filter == Filter::BiLinear {
            steps.x[1] = (i[1][0] - 0.5 * i[2][0]) / height;
            steps.y[1] = (i[1][1] - 0.5 * i[2][1]) / height;
            steps.c[1] = (0.5 * (i[1][0] + i[1][1]) + i[1][2] - projective_bias) / height;
        }
        steps
    }
}

/// Adjusts sampling steps to compensate for the fixed-point truncation of a particular part.
///
/// The adjustment is empirical and silicon specific, so it is injected per context through
/// [`crate::RenderContext::set_step_correction`].
pub trait StepCorrection: fmt::Debug {
    fn correct(&self, steps: &mut SamplingSteps, filter: Filter, matrix: &Matrix3x3);
}

/// Leaves the steps untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCorrection;

impl StepCorrection for NoCorrection {
    fn correct(&self, _steps: &mut SamplingSteps, _filter: Filter, _matrix: &Matrix3x3) {}
}

/// Re-biases bit 5 of the constant term's mantissa for point-sampled draws.
///
/// When the x and y steps of an axis are both non-negative and agree in bit 5, the constant's
/// bit 5 is forced to the complement of theirs, flipped again if the constant is negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct MantissaRounding;

const MANTISSA_BIT: u32 = 1 << 5;
const SIGN_BIT: u32 = 1 << 31;

impl StepCorrection for MantissaRounding {
    fn correct(&self, steps: &mut SamplingSteps, filter: Filter, _matrix: &Matrix3x3) {
        if filter != Filter::Point {
            return;
        }
        for i in 0..2 {
            let a = steps.x[i].to_bits();
            let b = steps.y[i].to_bits();
            let c = steps.c[i].to_bits();
            if a & SIGN_BIT != 0 || b & SIGN_BIT != 0 || (a & MANTISSA_BIT) != (b & MANTISSA_BIT) {
                continue;
            }
            let c_negative = c & SIGN_BIT != 0;
            let a_bit = a & MANTISSA_BIT != 0;
            let set = c_negative ^ !a_bit;
            let c = if set { c | MANTISSA_BIT } else { c & !MANTISSA_BIT };
            steps.c[i] = f32::from_bits(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translated_point_sampling_hits_texel_centers() {
        let mut m = Matrix3x3::identity();
        m.translate(16.0, 16.0);
        let inv = m.inverse().unwrap();
        let steps = SamplingSteps::from_inverse(&inv, Filter::Point, 32.0, 32.0);
        let u = steps.x[0] * 16.0 + steps.y[0] * 16.0 + steps.c[0];
        assert_eq!((u * 32.0).floor(), 0.0);
        assert_eq!(steps.c[2], 1.0);
    }

    #[test]
    fn bilinear_shifts_both_axes() {
        let inv = Matrix3x3::identity();
        let point = SamplingSteps::from_inverse(&inv, Filter::Point, 8.0, 8.0);
        let linear = SamplingSteps::from_inverse(&inv, Filter::Linear, 8.0, 8.0);
        let bilinear = SamplingSteps::from_inverse(&inv, Filter::BiLinear, 8.0, 8.0);
        assert_eq!(point.c[0] - linear.c[0], 0.5 / 8.0);
        assert_eq!(linear.c[1], point.c[1]);
        assert_eq!(point.c[1] - bilinear.c[1], 0.5 / 8.0);
    }

    #[test]
    fn mantissa_rounding_only_touches_point_sampling() {
        let inv = Matrix3x3::identity();
        let base = SamplingSteps::from_inverse(&inv, Filter::Linear, 3.0, 3.0);
        let mut steps = base;
        MantissaRounding.correct(&mut steps, Filter::Linear, &inv);
        assert_eq!(steps, base);
    }

    #[test]
    fn mantissa_rounding_sets_bit_five_of_the_constant() {
        let mut steps = SamplingSteps {
            x: [1.0, 0.0, 0.0],
            y: [0.0, 1.0, 0.0],
            c: [0.5, 0.5, 1.0],
        };
        MantissaRounding.correct(&mut steps, Filter::Point, &Matrix3x3::identity());
        // Both steps have bit 5 clear and are positive, so the constant's bit 5 is set.
        assert_eq!(steps.c[0].to_bits(), 0.5f32.to_bits() | MANTISSA_BIT);
        assert_eq!(steps.c[1].to_bits(), 0.5f32.to_bits() | MANTISSA_BIT);
        assert_eq!(steps.c[2], 1.0);
    }
}
