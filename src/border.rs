//! Barcode border localization.
//!
//! From each of the four image edges, scan lines march inward until they hit
//! the transition from bright background into the outer black ring. The
//! samples for each edge are median-filtered, line-fitted, and adjacent edge
//! lines are intersected to produce the four corners in scan order TL, TR,
//! BR, BL.

use crate::binarize::BinaryMatrix;
use crate::error::DecodeError;

/// Scan lines marched per edge.
const SCAN_LINES: usize = 32;

/// Minimum edge samples that must survive outlier rejection.
const MIN_EDGE_SAMPLES: usize = 8;

/// Samples farther than this fraction of the image dimension from the
/// per-edge median are discarded before the line fit.
const OUTLIER_FRACTION: f64 = 0.12;

#[derive(Clone, Copy)]
enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

/// A fitted edge line. Near-vertical edges are parameterized as
/// x = slope * y + offset, near-horizontal ones as y = slope * x + offset.
#[derive(Clone, Copy)]
struct EdgeLine {
    slope: f64,
    offset: f64,
}

/// Locate the outer quadrilateral of the barcode. Returns the eight corner
/// coordinates (x0, y0, ..., x3, y3) in scan order TL, TR, BR, BL.
pub(crate) fn find_borders(matrix: &BinaryMatrix) -> Result<[i32; 8], DecodeError> {
    let left = fit_edge(matrix, Edge::Left)?;
    let right = fit_edge(matrix, Edge::Right)?;
    let top = fit_edge(matrix, Edge::Top)?;
    let bottom = fit_edge(matrix, Edge::Bottom)?;

    let tl = intersect(left, top)?;
    let tr = intersect(right, top)?;
    let br = intersect(right, bottom)?;
    let bl = intersect(left, bottom)?;

    validate_quad(matrix, [tl, tr, br, bl])
}

/// March one edge's scan lines and least-squares fit the transition points.
fn fit_edge(matrix: &BinaryMatrix, edge: Edge) -> Result<EdgeLine, DecodeError> {
    let (width, height) = (matrix.width(), matrix.height());
    // The perpendicular axis is sampled over its central 80%.
    let span = match edge {
        Edge::Left | Edge::Right => height,
        Edge::Top | Edge::Bottom => width,
    };
    let start = span / 10;
    let end = span * 9 / 10;
    let step = ((end - start) / SCAN_LINES).max(1);

    let mut samples: Vec<(f64, f64)> = Vec::with_capacity(SCAN_LINES);
    let mut line = start;
    while line < end {
        if let Some(hit) = march(matrix, edge, line) {
            // Stored as (independent, dependent) for the fit below.
            samples.push((line as f64, hit as f64));
        }
        line += step;
    }

    let limit = match edge {
        Edge::Left | Edge::Right => width as f64 * OUTLIER_FRACTION,
        Edge::Top | Edge::Bottom => height as f64 * OUTLIER_FRACTION,
    };
    reject_outliers(&mut samples, limit);
    if samples.len() < MIN_EDGE_SAMPLES {
        return Err(DecodeError::BorderNotFound("too few edge transitions"));
    }
    fit_line(&samples).ok_or(DecodeError::BorderNotFound("degenerate edge fit"))
}

/// Walk a single scan line inward. Returns the coordinate (x for vertical
/// edges, y for horizontal ones) of the first bright-to-dark transition with
/// a dark run of at least two pixels.
fn march(matrix: &BinaryMatrix, edge: Edge, line: usize) -> Option<usize> {
    let (width, height) = (matrix.width(), matrix.height());
    let positions: Box<dyn Iterator<Item = usize>> = match edge {
        Edge::Left => Box::new(0..width / 2),
        Edge::Right => Box::new((width / 2..width).rev()),
        Edge::Top => Box::new(0..height / 2),
        Edge::Bottom => Box::new((height / 2..height).rev()),
    };

    let probe = |p: usize| match edge {
        Edge::Left | Edge::Right => matrix.get(p, line),
        Edge::Top | Edge::Bottom => matrix.get(line, p),
    };
    let neighbor = |p: usize| match edge {
        Edge::Left | Edge::Top => p + 1,
        Edge::Right | Edge::Bottom => p.saturating_sub(1),
    };

    let mut seen_background = false;
    for p in positions {
        if probe(p) == 1 {
            seen_background = true;
        } else if seen_background && probe(neighbor(p)) == 0 {
            return Some(p);
        }
    }
    None
}

/// Drop samples whose dependent coordinate strays too far from the median.
fn reject_outliers(samples: &mut Vec<(f64, f64)>, limit: f64) {
    if samples.is_empty() {
        return;
    }
    let mut values: Vec<f64> = samples.iter().map(|&(_, v)| v).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let median = values[values.len() / 2];
    samples.retain(|&(_, v)| (v - median).abs() <= limit);
}

/// Ordinary least squares of dependent on independent coordinate.
fn fit_line(samples: &[(f64, f64)]) -> Option<EdgeLine> {
    let n = samples.len() as f64;
    let sum_i: f64 = samples.iter().map(|&(i, _)| i).sum();
    let sum_d: f64 = samples.iter().map(|&(_, d)| d).sum();
    let sum_ii: f64 = samples.iter().map(|&(i, _)| i * i).sum();
    let sum_id: f64 = samples.iter().map(|&(i, d)| i * d).sum();
    let denom = n * sum_ii - sum_i * sum_i;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_id - sum_i * sum_d) / denom;
    let offset = (sum_d - slope * sum_i) / n;
    Some(EdgeLine { slope, offset })
}

/// Intersect a near-vertical line (x = a*y + b) with a near-horizontal one
/// (y = c*x + d).
fn intersect(vertical: EdgeLine, horizontal: EdgeLine) -> Result<(f64, f64), DecodeError> {
    let denom = 1.0 - vertical.slope * horizontal.slope;
    if denom.abs() < 1e-6 {
        return Err(DecodeError::BorderNotFound("parallel edge lines"));
    }
    let x = (vertical.slope * horizontal.offset + vertical.offset) / denom;
    let y = horizontal.slope * x + horizontal.offset;
    Ok((x, y))
}

/// Reject corners outside the image or forming a non-convex / degenerate
/// quadrilateral, then round into the borders array.
fn validate_quad(
    matrix: &BinaryMatrix,
    corners: [(f64, f64); 4],
) -> Result<[i32; 8], DecodeError> {
    let (width, height) = (matrix.width() as f64, matrix.height() as f64);
    const SLACK: f64 = 2.0;
    for &(x, y) in &corners {
        if !(-SLACK..width + SLACK).contains(&x) || !(-SLACK..height + SLACK).contains(&y) {
            return Err(DecodeError::BorderNotFound("corner outside frame"));
        }
    }

    // Convexity: all z-components of consecutive edge cross products agree.
    let mut sign = 0i32;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
        if cross.abs() < 1.0 {
            return Err(DecodeError::BorderNotFound("degenerate corner"));
        }
        let s = if cross > 0.0 { 1 } else { -1 };
        if sign == 0 {
            sign = s;
        } else if sign != s {
            return Err(DecodeError::BorderNotFound("non-convex quadrilateral"));
        }
    }

    let mut borders = [0i32; 8];
    for (i, &(x, y)) in corners.iter().enumerate() {
        borders[2 * i] = x.round().clamp(0.0, width - 1.0) as i32;
        borders[2 * i + 1] = y.round().clamp(0.0, height - 1.0) as i32;
    }
    Ok(borders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::LuminancePlane;

    /// Bright frame with an axis-aligned dark square from (x0, y0) to
    /// (x1, y1) exclusive, plus enough bright/dark mix to keep the
    /// thresholder bimodal.
    fn frame_with_square(
        width: usize,
        height: usize,
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
    ) -> BinaryMatrix {
        let mut pixels = vec![200u8; width * height];
        for y in y0..y1 {
            for x in x0..x1 {
                pixels[y * width + x] = 40;
            }
        }
        let plane = LuminancePlane::new(pixels, width, height).unwrap();
        BinaryMatrix::new(plane).unwrap()
    }

    #[test]
    fn finds_axis_aligned_square() {
        let matrix = frame_with_square(200, 160, 50, 40, 150, 120);
        let b = matrix.borders();
        // TL, TR, BR, BL within a couple of pixels of the square.
        assert!((b[0] - 50).abs() <= 2 && (b[1] - 40).abs() <= 2, "{b:?}");
        assert!((b[2] - 149).abs() <= 2 && (b[3] - 40).abs() <= 2, "{b:?}");
        assert!((b[4] - 149).abs() <= 2 && (b[5] - 119).abs() <= 2, "{b:?}");
        assert!((b[6] - 50).abs() <= 2 && (b[7] - 119).abs() <= 2, "{b:?}");
    }

    #[test]
    fn matrix_exposes_binarized_and_gray_reads() {
        let matrix = frame_with_square(200, 160, 50, 40, 150, 120);
        assert!(matrix.threshold() > 40 && matrix.threshold() < 200);
        // Inside the dark square.
        assert_eq!(matrix.get(100, 80), 0);
        assert_eq!(matrix.get_gray(100, 80), 40);
        assert!(matrix.pixel_equals(100, 80, 0));
        // Bright margin.
        assert_eq!(matrix.get(10, 10), 1);
        assert!(matrix.pixel_equals(10, 10, 1));
    }

    #[test]
    fn all_bright_frame_fails() {
        // No dark ring at all: thresholding already fails upstream.
        let plane = LuminancePlane::new(vec![200u8; 160 * 120], 160, 120).unwrap();
        assert!(BinaryMatrix::new(plane).is_err());
    }

    #[test]
    fn square_touching_no_scan_lines_fails() {
        // A sliver in the far corner is missed by the central scan window.
        let mut pixels = vec![200u8; 200 * 160];
        for y in 0..6 {
            for x in 0..6 {
                pixels[y * 200 + x] = 40;
            }
        }
        // Keep the histogram bimodal with a dark band in sampled rows.
        for x in 0..200 {
            pixels[32 * 200 + x] = 40;
        }
        let plane = LuminancePlane::new(pixels, 200, 160).unwrap();
        assert!(matches!(
            BinaryMatrix::new(plane),
            Err(DecodeError::BorderNotFound(_))
        ));
    }
}
