//! Pipeline driver: frames in, file bytes out.
//!
//! A single worker pulls frames from the queue and walks each one through
//! binarize -> locate -> perspective -> header -> payload -> Reed-Solomon ->
//! fountain. Per-frame failures are logged and the frame is dropped; the
//! fountain code across frames is the recovery strategy. The driver owns the
//! only cross-frame state, the fountain decoder.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};

use crate::binarize::BinaryMatrix;
use crate::config::{FrameLayout, ReceiverConfig};
use crate::error::DecodeError;
use crate::fountain::{EncodingSymbol, FountainDecoder};
use crate::frame::{Frame, FrameQueue};
use crate::header::{self, HeaderRecord, HEADER_BYTES};
use crate::perspective::{PerspectiveTransform, Quad};
use crate::sampler::{BlackWhiteModulation, CellModulation, GridSampler};

/// Per-frame progress numbers handed to the UI callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Frames pulled from the queue so far.
    pub current_index: u64,
    /// Most recent frame that contributed at least one packet.
    pub last_success_index: u64,
    /// Producer-announced total frame count; 0 when unknown (live capture).
    pub frame_total: u64,
    /// Encoding packets accepted by the fountain decoder.
    pub processed_count: u64,
}

/// UI-facing callbacks, fired once per frame plus on phase changes. They
/// have no back-edge into decoding.
pub trait ProgressSink {
    fn frame_processed(&mut self, update: &ProgressUpdate);
    fn status(&mut self, message: &str);
}

/// Progress sink that forwards to the log.
#[derive(Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn frame_processed(&mut self, update: &ProgressUpdate) {
        log::debug!(
            "frame {}/{}: last success {}, {} packets",
            update.current_index,
            update.frame_total,
            update.last_success_index,
            update.processed_count
        );
    }

    fn status(&mut self, message: &str) {
        log::info!("{}", message);
    }
}

/// Byte sink invoked exactly once on completion.
pub trait FileSink {
    fn write_file(&mut self, bytes: &[u8], filename: &str) -> Result<()>;
}

/// Writes the received file into a directory.
pub struct SaveToDirectory {
    dir: PathBuf,
}

impl SaveToDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileSink for SaveToDirectory {
    fn write_file(&mut self, bytes: &[u8], filename: &str) -> Result<()> {
        let path = self.dir.join(filename);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Keeps the received bytes in memory; used by the demo and tests.
#[derive(Default)]
pub struct MemorySink {
    pub received: Option<(Vec<u8>, String)>,
}

impl FileSink for MemorySink {
    fn write_file(&mut self, bytes: &[u8], filename: &str) -> Result<()> {
        self.received = Some((bytes.to_vec(), filename.to_string()));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitingHeader,
    Accumulating,
    Complete,
}

/// Outcome of a completed reception.
#[derive(Clone, Debug)]
pub struct ReceiveSummary {
    pub file_byte_length: usize,
    pub sha1_hex: String,
    pub frames_seen: u64,
    pub packets_accepted: u64,
}

/// The receiver state machine. Owns the fountain decoder for the duration
/// of one file reception; everything else is per-frame and scoped to one
/// loop iteration.
pub struct Receiver {
    config: ReceiverConfig,
    layout: FrameLayout,
    modulation: BlackWhiteModulation,
    phase: Phase,
    decoder: Option<FountainDecoder>,
    header: Option<HeaderRecord>,
    output_name: String,
    frame_total: u64,
    frames_seen: u64,
    last_success_index: u64,
    packets_accepted: u64,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            modulation: BlackWhiteModulation,
            phase: Phase::AwaitingHeader,
            decoder: None,
            header: None,
            output_name: "received.bin".to_string(),
            frame_total: 0,
            frames_seen: 0,
            last_success_index: 0,
            packets_accepted: 0,
        }
    }

    /// Name handed to the file sink on completion.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// Announce the producer's total frame count, when it is known.
    pub fn set_frame_total(&mut self, total: u64) {
        self.frame_total = total;
    }

    /// Consume frames until the file reconstructs or the queue interrupts.
    /// Returns `None` when interrupted before completion; the partial state
    /// is discarded with the receiver.
    pub fn run(
        &mut self,
        queue: &FrameQueue,
        progress: &mut dyn ProgressSink,
        sink: &mut dyn FileSink,
    ) -> Result<Option<ReceiveSummary>> {
        loop {
            let frame = match queue.recv() {
                Ok(frame) => frame,
                Err(DecodeError::Interrupted) => {
                    log::info!("frame queue interrupted; stopping after {} frames", self.frames_seen);
                    return Ok(None);
                }
                Err(other) => unreachable!("queue only interrupts: {other}"),
            };
            self.frames_seen += 1;

            let was_awaiting = self.phase == Phase::AwaitingHeader;
            match self.process_frame(frame) {
                Ok(packets) if packets > 0 => {
                    self.last_success_index = self.frames_seen;
                }
                Ok(_) => {}
                Err(error) => {
                    log::debug!("frame {} dropped: {}", self.frames_seen, error);
                }
            }
            if was_awaiting {
                if let Some(header) = self.header {
                    progress.status(&format!(
                        "transfer of {} bytes announced",
                        header.file_byte_length
                    ));
                }
            }

            progress.frame_processed(&ProgressUpdate {
                current_index: self.frames_seen,
                last_success_index: self.last_success_index,
                frame_total: self.frame_total,
                processed_count: self.packets_accepted,
            });

            if self.phase == Phase::Complete {
                return self.finalize(progress, sink).map(Some);
            }
        }
    }

    /// Decode a single frame; returns the number of packets it contributed.
    fn process_frame(&mut self, frame: Frame) -> Result<usize, DecodeError> {
        let matrix = BinaryMatrix::new(frame.into_plane())?;
        let transform = self.border_transform(&matrix)?;
        let ring = self.config.geometry.ring_width() as f64;
        let sampler = GridSampler::new(&matrix, transform, ring);

        let record = self.read_header(&sampler)?;
        if record.file_byte_length == 0 {
            return Err(DecodeError::HeaderNotReady);
        }
        match self.header {
            None => {
                self.decoder = Some(FountainDecoder::new(
                    record.file_byte_length as u64,
                    self.layout.symbol_size as u16,
                    self.config.codec.source_blocks,
                ));
                self.header = Some(record);
                self.phase = Phase::Accumulating;
                log::info!(
                    "header locked: {} bytes, symbol size {}, {} source block(s)",
                    record.file_byte_length,
                    self.layout.symbol_size,
                    self.config.codec.source_blocks
                );
            }
            Some(known) if known.file_byte_length != record.file_byte_length => {
                log::warn!(
                    "frame announces {} bytes but the transfer locked {}; frame ignored",
                    record.file_byte_length,
                    known.file_byte_length
                );
                return Ok(0);
            }
            Some(_) => {}
        }

        let side = self.config.geometry.content_length;
        let content = self.modulation.sample_region(&sampler, side, side);

        // Two readings per frame: normal polarity and payload-inverted.
        let mut packets = 0usize;
        for reverse in [false, true] {
            let decoder = self.decoder.as_mut().expect("decoder initialized with header");
            if decoder.is_complete() {
                break;
            }
            let reading = if reverse {
                invert_payload(&content)
            } else {
                content.clone()
            };
            match self.decode_reading(reading) {
                Ok(symbol) => {
                    let decoder = self.decoder.as_mut().expect("decoder initialized with header");
                    if decoder.put(&symbol) {
                        packets += 1;
                        self.packets_accepted += 1;
                    }
                }
                Err(error) => {
                    log::debug!("reading (reverse={}) dropped: {}", reverse, error);
                }
            }
        }

        if self
            .decoder
            .as_ref()
            .map(|d| d.is_complete())
            .unwrap_or(false)
        {
            self.phase = Phase::Complete;
        }
        Ok(packets)
    }

    /// Build the transform from barcode cell coordinates to pixels. The
    /// detected borders address the outermost black pixels, so the far edges
    /// are widened by one pixel to cover the full ring.
    fn border_transform(&self, matrix: &BinaryMatrix) -> Result<PerspectiveTransform, DecodeError> {
        let b = matrix.borders();
        let width = self.config.geometry.bar_code_width() as f64;
        let logical: Quad = [(0.0, 0.0), (width, 0.0), (width, width), (0.0, width)];
        let pixels: Quad = [
            (b[0] as f64, b[1] as f64),
            (b[2] as f64 + 1.0, b[3] as f64),
            (b[4] as f64 + 1.0, b[5] as f64 + 1.0),
            (b[6] as f64, b[7] as f64 + 1.0),
        ];
        PerspectiveTransform::quad_to_quad(&logical, &pixels)
            .ok_or(DecodeError::BorderNotFound("degenerate corner geometry"))
    }

    /// Sample just enough leading rows to assemble the 40-bit header.
    fn read_header(&self, sampler: &GridSampler<'_>) -> Result<HeaderRecord, DecodeError> {
        let side = self.config.geometry.content_length;
        let mut bits = Vec::with_capacity(HEADER_BYTES * 8);
        let mut row = 0usize;
        while bits.len() < HEADER_BYTES * 8 {
            bits.extend(sampler.sample_row(side, row));
            row += 1;
        }
        let mut bytes = [0u8; HEADER_BYTES];
        for (i, bit) in bits.iter().take(HEADER_BYTES * 8).enumerate() {
            bytes[i / 8] |= bit << (7 - i % 8);
        }
        header::parse(&bytes)
    }

    /// Reed-Solomon correct one reading and parse its encoding packet.
    fn decode_reading(&self, mut content: Vec<u8>) -> Result<EncodingSymbol, DecodeError> {
        let layout = &self.layout;
        let parity_start = HEADER_BYTES + layout.packet_bytes;
        let chunk = layout.chunk_data_bytes;
        let ec_bytes = self.config.codec.ec_byte_num;

        for i in 0..self.config.codec.ec_num {
            let data_start = HEADER_BYTES + i * chunk;
            let parity_block = parity_start + i * ec_bytes;
            let mut codeword = Vec::with_capacity(chunk + ec_bytes);
            codeword.extend_from_slice(&content[data_start..data_start + chunk]);
            codeword.extend_from_slice(&content[parity_block..parity_block + ec_bytes]);
            let corrected = crate::reed_solomon::decode(&mut codeword, ec_bytes, &[])?;
            if corrected > 0 {
                log::trace!("codeword {} corrected {} symbols", i, corrected);
            }
            content[data_start..data_start + chunk].copy_from_slice(&codeword[..chunk]);
        }

        EncodingSymbol::parse(
            &content[HEADER_BYTES..parity_start],
            layout.symbol_size,
            self.config.codec.source_blocks,
        )
    }

    /// Hash, report, and hand the reconstructed bytes to the sink.
    fn finalize(
        &mut self,
        progress: &mut dyn ProgressSink,
        sink: &mut dyn FileSink,
    ) -> Result<ReceiveSummary> {
        let decoder = self.decoder.as_ref().expect("complete phase has a decoder");
        let bytes = decoder.data_bytes().expect("complete phase has data");
        let digest = Sha1::digest(bytes);
        let sha1_hex = hex::encode(digest);
        progress.status(&format!(
            "transfer complete: {} bytes in {} frames, sha1={}",
            bytes.len(),
            self.frames_seen,
            sha1_hex
        ));
        sink.write_file(bytes, &self.output_name)?;
        Ok(ReceiveSummary {
            file_byte_length: bytes.len(),
            sha1_hex,
            frames_seen: self.frames_seen,
            packets_accepted: self.packets_accepted,
        })
    }
}

/// Flip every payload cell, leaving the 40 header bits untouched. The
/// transmitter alternates polarity so one frame can carry two independent
/// readings.
fn invert_payload(content: &[u8]) -> Vec<u8> {
    let mut flipped = content.to_vec();
    for byte in flipped.iter_mut().skip(HEADER_BYTES) {
        *byte = !*byte;
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_payload_preserves_header() {
        let content: Vec<u8> = (0..16).collect();
        let flipped = invert_payload(&content);
        assert_eq!(&flipped[..HEADER_BYTES], &content[..HEADER_BYTES]);
        for i in HEADER_BYTES..content.len() {
            assert_eq!(flipped[i], !content[i]);
        }
        assert_eq!(invert_payload(&flipped), content);
    }

    #[test]
    fn memory_sink_captures_output() {
        let mut sink = MemorySink::default();
        sink.write_file(&[1, 2, 3], "out.bin").unwrap();
        let (bytes, name) = sink.received.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(name, "out.bin");
    }

    #[test]
    fn save_to_directory_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SaveToDirectory::new(dir.path());
        sink.write_file(b"payload", "file.bin").unwrap();
        let written = std::fs::read(dir.path().join("file.bin")).unwrap();
        assert_eq!(written, b"payload");
    }
}
