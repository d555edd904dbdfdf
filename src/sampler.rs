//! Logical-grid sampling through the perspective transform.
//!
//! Sample points sit at cell centers (cx + 0.5, cy + 0.5) in barcode cell
//! coordinates, offset by the border-ring width. Each row of points is
//! projected as one batch, floored to integer pixel addresses, and read from
//! the binary matrix. Callers must only request cells inside the payload
//! region; outside it the read returns whatever the luminance plane holds.

use crate::binarize::BinaryMatrix;
use crate::perspective::PerspectiveTransform;

/// Dense single-bit matrix, row-major, MSB-first within each byte with no
/// per-row padding: `to_bytes` is the wire packing when width*height is a
/// multiple of 8.
#[derive(Clone, Debug)]
pub struct BitGrid {
    width: usize,
    height: usize,
    bits: Vec<u8>,
}

impl BitGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![0u8; (width * height + 7) / 8],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        let index = y * self.width + x;
        (self.bits[index / 8] >> (7 - index % 8)) & 1
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        let index = y * self.width + x;
        let mask = 1u8 << (7 - index % 8);
        if value != 0 {
            self.bits[index / 8] |= mask;
        } else {
            self.bits[index / 8] &= !mask;
        }
    }

    /// The packed bit buffer, MSB-first.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.clone()
    }
}

/// Samples logical cells of one frame's barcode.
pub struct GridSampler<'a> {
    matrix: &'a BinaryMatrix,
    transform: PerspectiveTransform,
    /// Ring width in cells: offset from the outer barcode corner to the
    /// content region origin.
    offset: f64,
}

impl<'a> GridSampler<'a> {
    pub fn new(matrix: &'a BinaryMatrix, transform: PerspectiveTransform, offset: f64) -> Self {
        Self {
            matrix,
            transform,
            offset,
        }
    }

    /// Sample one content row of `dim_x` cells into bits.
    pub fn sample_row(&self, dim_x: usize, row: usize) -> Vec<u8> {
        let mut points = Vec::with_capacity(dim_x * 2);
        let y = self.offset + row as f64 + 0.5;
        for cx in 0..dim_x {
            points.push(self.offset + cx as f64 + 0.5);
            points.push(y);
        }
        self.transform.transform_points(&mut points);

        points
            .chunks_exact(2)
            .map(|pair| {
                let x = pair[0].floor().max(0.0) as usize;
                let y = pair[1].floor().max(0.0) as usize;
                self.matrix.get(x, y)
            })
            .collect()
    }

    /// Sample the full `dim_x` x `dim_y` content region.
    pub fn sample_grid(&self, dim_x: usize, dim_y: usize) -> BitGrid {
        let mut grid = BitGrid::new(dim_x, dim_y);
        for row in 0..dim_y {
            for (cx, bit) in self.sample_row(dim_x, row).into_iter().enumerate() {
                grid.set(cx, row, bit);
            }
        }
        grid
    }
}

/// How cells carry data. The basic barcode is black/white, one bit per cell;
/// color and shift-code variants belong to an extension layer and would slot
/// in here.
pub trait CellModulation {
    fn bits_per_cell(&self) -> u32;

    /// Sample a content region and pack it MSB-first into bytes.
    fn sample_region(&self, sampler: &GridSampler<'_>, dim_x: usize, dim_y: usize) -> Vec<u8>;
}

/// One bit per cell: bright cell = 1, dark cell = 0.
pub struct BlackWhiteModulation;

impl CellModulation for BlackWhiteModulation {
    fn bits_per_cell(&self) -> u32 {
        1
    }

    fn sample_region(&self, sampler: &GridSampler<'_>, dim_x: usize, dim_y: usize) -> Vec<u8> {
        sampler.sample_grid(dim_x, dim_y).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::LuminancePlane;
    use crate::perspective::Quad;

    const CELL_PX: usize = 8;
    const RING_CELLS: usize = 1;
    const CONTENT_CELLS: usize = 8;

    /// Render a 10x10-cell barcode (1-cell dark ring, 8x8 checkerboard
    /// content) at pixel (20, 20), 8 px per cell.
    fn checkerboard_matrix() -> BinaryMatrix {
        let (width, height) = (120, 120);
        let mut pixels = vec![200u8; width * height];
        let total_cells = CONTENT_CELLS + 2 * RING_CELLS;
        for cy in 0..total_cells {
            for cx in 0..total_cells {
                let on_ring = cx < RING_CELLS
                    || cy < RING_CELLS
                    || cx >= total_cells - RING_CELLS
                    || cy >= total_cells - RING_CELLS;
                let bright = if on_ring {
                    false
                } else {
                    (cx - RING_CELLS + cy - RING_CELLS) % 2 == 0
                };
                let value = if bright { 200 } else { 40 };
                for py in 0..CELL_PX {
                    for px in 0..CELL_PX {
                        let x = 20 + cx * CELL_PX + px;
                        let y = 20 + cy * CELL_PX + py;
                        pixels[y * width + x] = value;
                    }
                }
            }
        }
        BinaryMatrix::new(LuminancePlane::new(pixels, width, height).unwrap()).unwrap()
    }

    fn logical_quad(total_cells: usize) -> Quad {
        let side = total_cells as f64;
        [(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)]
    }

    #[test]
    fn samples_checkerboard_content() {
        let matrix = checkerboard_matrix();
        let total_cells = CONTENT_CELLS + 2 * RING_CELLS;
        let pixel_quad: Quad = [(20.0, 20.0), (100.0, 20.0), (100.0, 100.0), (20.0, 100.0)];
        let transform =
            PerspectiveTransform::quad_to_quad(&logical_quad(total_cells), &pixel_quad).unwrap();
        let sampler = GridSampler::new(&matrix, transform, RING_CELLS as f64);
        let grid = sampler.sample_grid(CONTENT_CELLS, CONTENT_CELLS);
        for cy in 0..CONTENT_CELLS {
            for cx in 0..CONTENT_CELLS {
                let expected = ((cx + cy) % 2 == 0) as u8;
                assert_eq!(grid.get(cx, cy), expected, "cell ({cx}, {cy})");
            }
        }
    }

    #[test]
    fn row_and_grid_sampling_agree() {
        let matrix = checkerboard_matrix();
        let total_cells = CONTENT_CELLS + 2 * RING_CELLS;
        let pixel_quad: Quad = [(20.0, 20.0), (100.0, 20.0), (100.0, 100.0), (20.0, 100.0)];
        let transform =
            PerspectiveTransform::quad_to_quad(&logical_quad(total_cells), &pixel_quad).unwrap();
        let sampler = GridSampler::new(&matrix, transform, RING_CELLS as f64);
        let grid = sampler.sample_grid(CONTENT_CELLS, CONTENT_CELLS);
        for row in 0..CONTENT_CELLS {
            let bits = sampler.sample_row(CONTENT_CELLS, row);
            for (cx, &bit) in bits.iter().enumerate() {
                assert_eq!(grid.get(cx, row), bit);
            }
        }
    }

    #[test]
    fn bit_grid_packs_msb_first() {
        let mut grid = BitGrid::new(8, 2);
        grid.set(0, 0, 1);
        grid.set(7, 0, 1);
        grid.set(1, 1, 1);
        assert_eq!(grid.to_bytes(), vec![0b1000_0001, 0b0100_0000]);
        assert_eq!(grid.get(0, 0), 1);
        assert_eq!(grid.get(1, 0), 0);
    }
}
