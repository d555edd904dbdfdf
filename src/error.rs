//! Per-frame decode failures.
//!
//! Every variant except `Interrupted` is transient: the driver logs it,
//! drops the frame (or the single reading, for the Reed-Solomon and fountain
//! kinds) and pulls the next frame. Retry is implicit in consuming more
//! frames; nothing is retried in place.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The central-region luminance histogram has no usable second mode.
    #[error("no usable threshold: luminance histogram is effectively unimodal")]
    ThresholdUnresolvable,

    /// Fewer than four corners could be isolated in the binarized image.
    #[error("barcode border not found: {0}")]
    BorderNotFound(&'static str),

    /// The 5-byte header failed its CRC-8 check.
    #[error("header checksum mismatch: stored {stored:#04x}, computed {computed:#04x}")]
    HeaderCrcMismatch { stored: u8, computed: u8 },

    /// The header decoded cleanly but announced a zero file length. The
    /// screen is between transmissions; the frame is dropped and retried.
    #[error("header announces no file yet")]
    HeaderNotReady,

    /// The error locator degree disagreed with its root count, or roots fell
    /// outside the codeword, or more errata than parity can carry.
    #[error("reed-solomon codeword uncorrectable")]
    ReedSolomonUncorrectable,

    /// A successfully corrected payload did not parse as an encoding packet.
    #[error("fountain packet malformed: {0}")]
    FountainPacketMalformed(&'static str),

    /// The frame queue was closed while the driver was blocked on it.
    #[error("frame queue interrupted")]
    Interrupted,
}
