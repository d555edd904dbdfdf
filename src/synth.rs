//! Synthetic barcode frames.
//!
//! Renders encoding packets into the same wire layout the receiver samples:
//! black outer ring, two vary rings, then the content grid of header +
//! packet + Reed-Solomon parity. Drives the demo binary and the end-to-end
//! tests without a camera in the loop.

use rand::Rng;
use raptorq::{Encoder, ObjectTransmissionInformation};

use crate::config::{BarcodeGeometry, CodecParams, FrameLayout, ReceiverConfig};
use crate::fountain::EncodingSymbol;
use crate::frame::Frame;
use crate::header::{self, HEADER_BYTES};
use crate::reed_solomon;

const DEFAULT_CELL_PX: usize = 4;
const DEFAULT_MARGIN_PX: usize = 24;
const DARK: u8 = 30;
const LIGHT: u8 = 220;

pub struct BarcodeSynthesizer {
    geometry: BarcodeGeometry,
    codec: CodecParams,
    layout: FrameLayout,
    cell_px: usize,
    margin_px: usize,
}

impl BarcodeSynthesizer {
    pub fn new(config: &ReceiverConfig) -> Self {
        Self {
            geometry: config.geometry,
            codec: config.codec,
            layout: config.layout(),
            cell_px: DEFAULT_CELL_PX,
            margin_px: DEFAULT_MARGIN_PX,
        }
    }

    pub fn with_cell_px(mut self, cell_px: usize) -> Self {
        self.cell_px = cell_px.max(2);
        self
    }

    /// Rendered frame side in pixels.
    pub fn frame_side(&self) -> usize {
        self.geometry.bar_code_width() * self.cell_px + 2 * self.margin_px
    }

    /// RaptorQ-encode `data` into source packets plus `repair_per_block`
    /// repair packets per source block.
    pub fn packetize(&self, data: &[u8], repair_per_block: u32) -> Vec<EncodingSymbol> {
        let config = ObjectTransmissionInformation::new(
            data.len() as u64,
            self.layout.symbol_size as u16,
            self.codec.source_blocks,
            1,
            1,
        );
        let encoder = Encoder::new(data, config);
        encoder
            .get_encoded_packets(repair_per_block)
            .into_iter()
            .map(|packet| {
                EncodingSymbol::parse(
                    &packet.serialize(),
                    self.layout.symbol_size,
                    self.codec.source_blocks,
                )
                .expect("encoder emits well-formed packets")
            })
            .collect()
    }

    /// Assemble one frame's content bytes: header, packet, parity blocks.
    pub fn content_bytes(&self, file_byte_length: u32, symbol: &EncodingSymbol) -> Vec<u8> {
        assert_eq!(symbol.payload.len(), self.layout.symbol_size);
        let mut content = Vec::with_capacity(self.layout.content_bytes);
        content.extend_from_slice(&header::pack(file_byte_length));
        content.extend_from_slice(&symbol.to_bytes());
        debug_assert_eq!(content.len(), HEADER_BYTES + self.layout.packet_bytes);
        for i in 0..self.codec.ec_num {
            let start = HEADER_BYTES + i * self.layout.chunk_data_bytes;
            let chunk = &content[start..start + self.layout.chunk_data_bytes];
            let parity = reed_solomon::parity(chunk, self.codec.ec_byte_num);
            content.extend(parity);
        }
        debug_assert_eq!(content.len(), self.layout.content_bytes);
        content
    }

    /// Render one packet as a full barcode frame. With `invert_payload` the
    /// polarity of every non-header content cell is flipped, producing the
    /// frame a transmitter sends for the reverse reading.
    pub fn render_frame(
        &self,
        file_byte_length: u32,
        symbol: &EncodingSymbol,
        invert_payload: bool,
    ) -> Frame {
        let mut content = self.content_bytes(file_byte_length, symbol);
        if invert_payload {
            for byte in content.iter_mut().skip(HEADER_BYTES) {
                *byte = !*byte;
            }
        }
        self.render_content(&content)
    }

    /// Frame a transmitter shows between files: zero announced length over a
    /// bright filler payload.
    pub fn idle_frame(&self) -> Frame {
        let symbol = EncodingSymbol {
            source_block_number: 0,
            encoding_symbol_id: 0,
            payload: vec![0xFF; self.layout.symbol_size],
        };
        self.render_frame(0, &symbol, false)
    }

    /// Featureless mid-gray frame; fails thresholding.
    pub fn blank_frame(&self) -> Frame {
        let side = self.frame_side();
        Frame::new(vec![128u8; side * side], side, side).expect("square frame")
    }

    /// Add +-`amplitude` uniform luminance noise to every pixel.
    pub fn add_noise<R: Rng>(&self, frame: &mut Frame, rng: &mut R, amplitude: u8) {
        let amplitude = amplitude as i16;
        for pixel in frame.pixels.iter_mut() {
            let jitter = rng.gen_range(-amplitude..=amplitude);
            *pixel = (*pixel as i16 + jitter).clamp(0, 255) as u8;
        }
    }

    /// Invert the rendered pixels of one content cell, simulating a cell
    /// misread for the Reed-Solomon stage to repair.
    pub fn flip_content_cell(&self, frame: &mut Frame, cx: usize, cy: usize) {
        let ring = self.geometry.ring_width();
        let base_x = self.margin_px + (ring + cx) * self.cell_px;
        let base_y = self.margin_px + (ring + cy) * self.cell_px;
        for py in 0..self.cell_px {
            for px in 0..self.cell_px {
                let index = (base_y + py) * frame.width + base_x + px;
                frame.pixels[index] = if frame.pixels[index] > 128 { DARK } else { LIGHT };
            }
        }
    }

    fn render_content(&self, content: &[u8]) -> Frame {
        let cells = self.geometry.bar_code_width();
        let side = self.frame_side();
        let mut pixels = vec![LIGHT; side * side];

        let black = self.geometry.frame_black_length;
        let vary = self.geometry.frame_vary_length;
        let vary_two = self.geometry.frame_vary_two_length;
        let content_side = self.geometry.content_length;

        for gy in 0..cells {
            for gx in 0..cells {
                let edge_distance = gx.min(gy).min(cells - 1 - gx).min(cells - 1 - gy);
                let bright = if edge_distance < black {
                    false
                } else if edge_distance < black + vary {
                    (gx + gy) % 2 == 0
                } else if edge_distance < black + vary + vary_two {
                    true
                } else {
                    let cx = gx - black - vary - vary_two;
                    let cy = gy - black - vary - vary_two;
                    let bit_index = cy * content_side + cx;
                    (content[bit_index / 8] >> (7 - bit_index % 8)) & 1 == 1
                };
                let value = if bright { LIGHT } else { DARK };
                for py in 0..self.cell_px {
                    for px in 0..self.cell_px {
                        let x = self.margin_px + gx * self.cell_px + px;
                        let y = self.margin_px + gy * self.cell_px + py;
                        pixels[y * side + x] = value;
                    }
                }
            }
        }
        Frame::new(pixels, side, side).expect("square frame")
    }
}
