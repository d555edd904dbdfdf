//! Framelink: screen-to-camera file transfer, receive side.
//!
//! A transmitter plays a sequence of 2-D barcodes on a screen; a camera
//! films it; this crate turns the captured luminance frames back into the
//! original file.
//!
//! # Architecture
//!
//! Per frame, in order:
//!
//! 1. **Binarize** (`binarize`): global threshold from the central-region
//!    histogram; fails fast on frames with no barcode contrast.
//! 2. **Locate** (`border`): find the four corners of the outer black ring.
//! 3. **Project** (`perspective`, `sampler`): map the logical cell grid
//!    through a quad-to-quad transform and sample cell centers.
//! 4. **Decode** (`header`, `reed_solomon`): check the 40-bit length header,
//!    then correct the payload with Reed-Solomon over GF(2^8).
//! 5. **Accumulate** (`fountain`): feed the recovered encoding packet to the
//!    RaptorQ decoder; any sufficient subset of frames reconstructs the file.
//!
//! The driver (`pipeline`) runs those stages as a single consumer of a
//! bounded frame queue (`frame`), drops failing frames, and on completion
//! verifies the bytes with SHA-1 and hands them to the file sink. A frame is
//! never retried; the fountain code across frames is the recovery strategy.
//!
//! `synth` renders conformant barcode frames for the demo binary and the
//! integration tests.

pub mod binarize;
pub mod border;
pub mod config;
pub mod error;
pub mod fountain;
pub mod frame;
pub mod galois;
pub mod header;
pub mod perspective;
pub mod pipeline;
pub mod reed_solomon;
pub mod sampler;
pub mod synth;

pub use binarize::{BinaryMatrix, LuminancePlane};
pub use config::{BarcodeGeometry, CodecParams, FrameLayout, ReceiverConfig};
pub use error::DecodeError;
pub use fountain::{EncodingSymbol, FountainDecoder, SourceBlockState};
pub use frame::{Frame, FrameQueue};
pub use header::HeaderRecord;
pub use perspective::PerspectiveTransform;
pub use pipeline::{
    FileSink, LogProgress, MemorySink, ProgressSink, ProgressUpdate, ReceiveSummary, Receiver,
    SaveToDirectory,
};
pub use sampler::{BitGrid, BlackWhiteModulation, CellModulation, GridSampler};
pub use synth::BarcodeSynthesizer;
