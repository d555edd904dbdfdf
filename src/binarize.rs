//! Luminance plane wrapper and global binarization.
//!
//! The threshold is estimated from a histogram of the frame's central region
//! only: the displayed barcode fills the middle of the frame, and pixels near
//! the frame edges are ambient clutter that would pollute the two modes the
//! valley search relies on.

use crate::border;
use crate::error::DecodeError;

/// Immutable 8-bit grayscale image, row-major, top-left origin.
pub struct LuminancePlane {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl LuminancePlane {
    /// Wrap a row-major luminance buffer. `pixels.len()` must equal
    /// `width * height`.
    pub fn new(pixels: Vec<u8>, width: usize, height: usize) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != width * height {
            return None;
        }
        Some(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Gray value at (x, y); coordinates are clamped to the plane.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.pixels[y * self.width + x]
    }
}

/// Binarized view of one frame: the luminance plane, the global threshold,
/// and the four detected barcode corners in scan order TL, TR, BR, BL as
/// (x0, y0, x1, y1, x2, y2, x3, y3).
///
/// Built once per frame and never mutated afterwards.
pub struct BinaryMatrix {
    plane: LuminancePlane,
    threshold: u8,
    borders: [i32; 8],
}

impl BinaryMatrix {
    /// Binarize a plane: estimate the threshold, then locate the barcode
    /// border. Either step failing drops the frame.
    pub fn new(plane: LuminancePlane) -> Result<Self, DecodeError> {
        let threshold = estimate_threshold(&plane)?;
        let mut matrix = Self {
            plane,
            threshold,
            borders: [0; 8],
        };
        matrix.borders = border::find_borders(&matrix)?;
        Ok(matrix)
    }

    /// 1 when the pixel is brighter than the threshold, else 0.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        (self.plane.get(x, y) > self.threshold) as u8
    }

    pub fn get_gray(&self, x: usize, y: usize) -> u8 {
        self.plane.get(x, y)
    }

    pub fn pixel_equals(&self, x: usize, y: usize, value: u8) -> bool {
        self.get(x, y) == value
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn borders(&self) -> &[i32; 8] {
        &self.borders
    }

    pub fn width(&self) -> usize {
        self.plane.width()
    }

    pub fn height(&self) -> usize {
        self.plane.height()
    }
}

/// Number of horizontal scan rows feeding the histogram.
const HISTOGRAM_ROWS: usize = 4;

/// Peaks closer than this many bins mean the image is effectively unimodal.
const MIN_PEAK_SEPARATION: i64 = 16;

/// Estimate the black/white threshold as the valley between the two dominant
/// histogram modes of the central region (central 60% of each of four rows
/// at heights h/5, 2h/5, 3h/5, 4h/5).
pub fn estimate_threshold(plane: &LuminancePlane) -> Result<u8, DecodeError> {
    let mut counts = [0u32; 256];
    let x_start = plane.width() / 5;
    let x_end = plane.width() * 4 / 5;
    for i in 1..=HISTOGRAM_ROWS {
        let y = plane.height() * i / 5;
        for x in x_start..x_end {
            counts[plane.get(x, y) as usize] += 1;
        }
    }

    let first_peak = counts
        .iter()
        .enumerate()
        .max_by_key(|&(_, &c)| c)
        .map(|(x, _)| x as i64)
        .unwrap_or(0);
    let first_count = counts[first_peak as usize] as u64;

    // Second mode: tall and far from the first. A score of zero means no
    // other bin is occupied at all.
    let mut second_peak = 0i64;
    let mut second_score = 0u64;
    for (x, &c) in counts.iter().enumerate() {
        let distance = x as i64 - first_peak;
        let score = c as u64 * (distance * distance) as u64;
        if score > second_score {
            second_score = score;
            second_peak = x as i64;
        }
    }
    if second_score == 0 || (second_peak - first_peak).abs() <= MIN_PEAK_SEPARATION {
        return Err(DecodeError::ThresholdUnresolvable);
    }

    let (low, high) = if first_peak < second_peak {
        (first_peak, second_peak)
    } else {
        (second_peak, first_peak)
    };

    // Valley search rewards depth and leans toward the darker mode.
    let mut valley = (low + high) / 2;
    let mut valley_score = 0u64;
    for x in (low + 1)..high {
        let from_low = (x - low) as u64;
        let to_high = (high - x) as u64;
        let depth = first_count - counts[x as usize] as u64;
        let score = from_low * to_high * to_high * depth;
        if score > valley_score {
            valley_score = score;
            valley = x;
        }
    }
    Ok(valley as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_plane(value: u8, width: usize, height: usize) -> LuminancePlane {
        LuminancePlane::new(vec![value; width * height], width, height).unwrap()
    }

    #[test]
    fn constant_image_has_no_threshold() {
        let plane = flat_plane(128, 120, 90);
        assert_eq!(
            estimate_threshold(&plane),
            Err(DecodeError::ThresholdUnresolvable)
        );
    }

    #[test]
    fn close_modes_have_no_threshold() {
        // Two modes ten bins apart: inside the minimum separation.
        let mut pixels = vec![100u8; 120 * 90];
        for (i, p) in pixels.iter_mut().enumerate() {
            if i % 2 == 0 {
                *p = 110;
            }
        }
        let plane = LuminancePlane::new(pixels, 120, 90).unwrap();
        assert_eq!(
            estimate_threshold(&plane),
            Err(DecodeError::ThresholdUnresolvable)
        );
    }

    #[test]
    fn bimodal_image_thresholds_between_modes() {
        // 60% of columns at 30, 40% at 210, independent of the sampled
        // window. The valley formula biases toward the darker mode.
        let width = 200;
        let height = 100;
        let mut pixels = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                pixels[y * width + x] = if x % 5 < 3 { 30 } else { 210 };
            }
        }
        let plane = LuminancePlane::new(pixels, width, height).unwrap();
        let threshold = estimate_threshold(&plane).unwrap();
        assert!(threshold > 30 && threshold < 210, "threshold {threshold}");
        assert!(
            (60..=150).contains(&threshold),
            "valley unexpectedly far from the dark mode: {threshold}"
        );
    }

    #[test]
    fn plane_rejects_mismatched_buffer() {
        assert!(LuminancePlane::new(vec![0; 10], 3, 4).is_none());
        assert!(LuminancePlane::new(vec![0; 12], 3, 4).is_some());
    }

    #[test]
    fn plane_clamps_out_of_range_reads() {
        let plane = flat_plane(9, 4, 4);
        assert_eq!(plane.get(1000, 1000), 9);
    }
}
