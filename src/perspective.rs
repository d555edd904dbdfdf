//! General quadrilateral-to-quadrilateral projective transform.
//!
//! Built the classic way: compose the closed-form unit-square-to-quad
//! transform for the destination with the adjugate (projective inverse) of
//! the one for the source. Coefficients are normalized so the bottom-right
//! matrix entry is 1, leaving eight coefficients. A point maps as
//!
//! ```text
//! x' = (a11*x + a21*y + a31) / (a13*x + a23*y + 1)
//! y' = (a12*x + a22*y + a32) / (a13*x + a23*y + 1)
//! ```

/// Four (x, y) corners in scan order TL, TR, BR, BL.
pub type Quad = [(f64, f64); 4];

#[derive(Clone, Copy, Debug)]
pub struct PerspectiveTransform {
    a11: f64,
    a12: f64,
    a13: f64,
    a21: f64,
    a22: f64,
    a23: f64,
    a31: f64,
    a32: f64,
}

/// Full 3x3 used internally before normalization.
#[derive(Clone, Copy)]
struct Matrix3([[f64; 3]; 3]);

impl Matrix3 {
    /// Map the unit square (0,0),(1,0),(1,1),(0,1) onto `quad`.
    fn square_to_quad(quad: &Quad) -> Self {
        let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] = *quad;
        let dx3 = x0 - x1 + x2 - x3;
        let dy3 = y0 - y1 + y2 - y3;
        if dx3 == 0.0 && dy3 == 0.0 {
            // Affine case.
            return Matrix3([
                [x1 - x0, y1 - y0, 0.0],
                [x2 - x1, y2 - y1, 0.0],
                [x0, y0, 1.0],
            ]);
        }
        let dx1 = x1 - x2;
        let dx2 = x3 - x2;
        let dy1 = y1 - y2;
        let dy2 = y3 - y2;
        let denominator = dx1 * dy2 - dx2 * dy1;
        let a13 = (dx3 * dy2 - dx2 * dy3) / denominator;
        let a23 = (dx1 * dy3 - dx3 * dy1) / denominator;
        Matrix3([
            [x1 - x0 + a13 * x1, y1 - y0 + a13 * y1, a13],
            [x3 - x0 + a23 * x3, y3 - y0 + a23 * y3, a23],
            [x0, y0, 1.0],
        ])
    }

    /// Adjugate: the projective inverse up to scale.
    fn adjugate(&self) -> Self {
        let m = &self.0;
        Matrix3([
            [
                m[1][1] * m[2][2] - m[1][2] * m[2][1],
                m[0][2] * m[2][1] - m[0][1] * m[2][2],
                m[0][1] * m[1][2] - m[0][2] * m[1][1],
            ],
            [
                m[1][2] * m[2][0] - m[1][0] * m[2][2],
                m[0][0] * m[2][2] - m[0][2] * m[2][0],
                m[0][2] * m[1][0] - m[0][0] * m[1][2],
            ],
            [
                m[1][0] * m[2][1] - m[1][1] * m[2][0],
                m[0][1] * m[2][0] - m[0][0] * m[2][1],
                m[0][0] * m[1][1] - m[0][1] * m[1][0],
            ],
        ])
    }

    fn multiply(&self, other: &Matrix3) -> Self {
        let mut out = [[0.0f64; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        Matrix3(out)
    }
}

impl PerspectiveTransform {
    /// Transform mapping `source` onto `destination`. `None` when the pair
    /// is projectively degenerate (collinear corners).
    pub fn quad_to_quad(source: &Quad, destination: &Quad) -> Option<Self> {
        let source_to_square = Matrix3::square_to_quad(source).adjugate();
        let square_to_destination = Matrix3::square_to_quad(destination);
        let m = source_to_square.multiply(&square_to_destination).0;
        let a33 = m[2][2];
        if a33.abs() < 1e-12 {
            return None;
        }
        Some(Self {
            a11: m[0][0] / a33,
            a12: m[0][1] / a33,
            a13: m[0][2] / a33,
            a21: m[1][0] / a33,
            a22: m[1][1] / a33,
            a23: m[1][2] / a33,
            a31: m[2][0] / a33,
            a32: m[2][1] / a33,
        })
    }

    /// Apply the forward map to one point.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let denominator = self.a13 * x + self.a23 * y + 1.0;
        (
            (self.a11 * x + self.a21 * y + self.a31) / denominator,
            (self.a12 * x + self.a22 * y + self.a32) / denominator,
        )
    }

    /// Project an interleaved [x0, y0, x1, y1, ...] buffer in place, one
    /// whole row of sample points per call.
    pub fn transform_points(&self, points: &mut [f64]) {
        debug_assert!(points.len() % 2 == 0);
        for pair in points.chunks_exact_mut(2) {
            let (x, y) = self.apply(pair[0], pair[1]);
            pair[0] = x;
            pair[1] = y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: Quad = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
    const SKEWED: Quad = [(10.0, 10.0), (50.0, 20.0), (60.0, 60.0), (20.0, 50.0)];

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-6 && (actual.1 - expected.1).abs() < 1e-6,
            "{actual:?} != {expected:?}"
        );
    }

    fn inside_convex_quad(quad: &Quad, point: (f64, f64)) -> bool {
        let mut sign = 0i32;
        for i in 0..4 {
            let a = quad[i];
            let b = quad[(i + 1) % 4];
            let cross = (b.0 - a.0) * (point.1 - a.1) - (b.1 - a.1) * (point.0 - a.0);
            let s = if cross > 0.0 { 1 } else { -1 };
            if sign == 0 {
                sign = s;
            } else if s != sign {
                return false;
            }
        }
        true
    }

    #[test]
    fn corners_round_trip() {
        let transform = PerspectiveTransform::quad_to_quad(&SQUARE, &SKEWED).unwrap();
        for i in 0..4 {
            assert_close(transform.apply(SQUARE[i].0, SQUARE[i].1), SKEWED[i]);
        }
        let back = PerspectiveTransform::quad_to_quad(&SKEWED, &SQUARE).unwrap();
        for i in 0..4 {
            assert_close(back.apply(SKEWED[i].0, SKEWED[i].1), SQUARE[i]);
        }
    }

    #[test]
    fn interior_point_lands_inside_destination() {
        let transform = PerspectiveTransform::quad_to_quad(&SQUARE, &SKEWED).unwrap();
        let projected = transform.apply(50.5, 50.5);
        assert!(inside_convex_quad(&SKEWED, projected), "{projected:?}");
    }

    #[test]
    fn batch_transform_matches_single_points() {
        let transform = PerspectiveTransform::quad_to_quad(&SQUARE, &SKEWED).unwrap();
        let mut batch = vec![3.0, 4.0, 50.5, 50.5, 99.0, 1.0];
        transform.transform_points(&mut batch);
        for (i, &(x, y)) in [(3.0, 4.0), (50.5, 50.5), (99.0, 1.0)].iter().enumerate() {
            let single = transform.apply(x, y);
            assert_close((batch[2 * i], batch[2 * i + 1]), single);
        }
    }

    #[test]
    fn affine_pair_round_trips() {
        // A pure translation exercises the affine fast path.
        let shifted: Quad = [(5.0, 7.0), (105.0, 7.0), (105.0, 107.0), (5.0, 107.0)];
        let transform = PerspectiveTransform::quad_to_quad(&SQUARE, &shifted).unwrap();
        assert_close(transform.apply(50.0, 50.0), (55.0, 57.0));
    }
}
