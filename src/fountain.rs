//! RaptorQ fountain decoding across frames.
//!
//! Each successfully corrected frame payload carries one encoding packet: a
//! 4-byte payload id (source block number, 24-bit encoding symbol id, both
//! big-endian) followed by exactly `symbol_size` bytes of symbol data. The
//! adapter validates and routes packets into the RFC 6330 decoder and keeps
//! per-source-block bookkeeping for progress reporting. Packets commute, so
//! arrival order never matters.

use std::collections::BTreeMap;

use raptorq::{Decoder, EncodingPacket, ObjectTransmissionInformation, PayloadId};

use crate::error::DecodeError;

/// Payload id bytes preceding the symbol data in each packet.
pub const PACKET_HEADER_BYTES: usize = 4;

/// One parsed encoding packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodingSymbol {
    pub source_block_number: u8,
    pub encoding_symbol_id: u32,
    pub payload: Vec<u8>,
}

impl EncodingSymbol {
    /// Parse a packet region: payload id then symbol data.
    pub fn parse(
        bytes: &[u8],
        symbol_size: usize,
        source_blocks: u8,
    ) -> Result<Self, DecodeError> {
        if bytes.len() < PACKET_HEADER_BYTES {
            return Err(DecodeError::FountainPacketMalformed("packet shorter than its header"));
        }
        let source_block_number = bytes[0];
        let encoding_symbol_id =
            u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);
        let payload = &bytes[PACKET_HEADER_BYTES..];
        if payload.len() != symbol_size {
            return Err(DecodeError::FountainPacketMalformed("symbol size mismatch"));
        }
        if source_block_number >= source_blocks {
            return Err(DecodeError::FountainPacketMalformed("source block out of range"));
        }
        Ok(Self {
            source_block_number,
            encoding_symbol_id,
            payload: payload.to_vec(),
        })
    }

    /// Wire form: payload id then symbol data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let esi = self.encoding_symbol_id.to_be_bytes();
        let mut out = Vec::with_capacity(PACKET_HEADER_BYTES + self.payload.len());
        out.push(self.source_block_number);
        out.extend_from_slice(&esi[1..4]);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Received-symbol bookkeeping for one source block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceBlockState {
    pub block: u8,
    pub symbols_received: u64,
}

/// Accumulates encoding packets until the transmitted object reconstructs.
///
/// The only pipeline object that survives across frames; created once the
/// header announces the transfer length.
pub struct FountainDecoder {
    decoder: Decoder,
    symbol_size: usize,
    source_blocks: u8,
    received: BTreeMap<u8, u64>,
    result: Option<Vec<u8>>,
}

impl FountainDecoder {
    pub fn new(transfer_length: u64, symbol_size: u16, source_blocks: u8) -> Self {
        let config = ObjectTransmissionInformation::new(
            transfer_length,
            symbol_size,
            source_blocks,
            1,
            1,
        );
        Self {
            decoder: Decoder::new(config),
            symbol_size: symbol_size as usize,
            source_blocks,
            received: BTreeMap::new(),
            result: None,
        }
    }

    pub fn symbol_size(&self) -> usize {
        self.symbol_size
    }

    pub fn source_blocks(&self) -> u8 {
        self.source_blocks
    }

    /// Feed one packet. Returns false when the packet was not added to the
    /// system of equations (already complete).
    pub fn put(&mut self, symbol: &EncodingSymbol) -> bool {
        if self.result.is_some() {
            return false;
        }
        *self.received.entry(symbol.source_block_number).or_insert(0) += 1;
        let packet = EncodingPacket::new(
            PayloadId::new(symbol.source_block_number, symbol.encoding_symbol_id),
            symbol.payload.clone(),
        );
        if let Some(bytes) = self.decoder.decode(packet) {
            self.result = Some(bytes);
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// The reconstructed object, once complete.
    pub fn data_bytes(&self) -> Option<&[u8]> {
        self.result.as_deref()
    }

    pub fn source_block_states(&self) -> Vec<SourceBlockState> {
        self.received
            .iter()
            .map(|(&block, &symbols_received)| SourceBlockState {
                block,
                symbols_received,
            })
            .collect()
    }
}
