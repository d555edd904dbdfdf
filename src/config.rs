use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::fountain::PACKET_HEADER_BYTES;
use crate::header::HEADER_BYTES;

const DEFAULT_BORDER_LENGTH: usize = 2;
const DEFAULT_PADDING_LENGTH: usize = 2;
const DEFAULT_META_LENGTH: usize = 1;
const DEFAULT_MAIN_WIDTH: usize = 40;
const DEFAULT_MAIN_HEIGHT: usize = 40;
const DEFAULT_FPS: u32 = 15;
const DEFAULT_DISTANCE: u32 = 30;
const DEFAULT_EC_NUM: usize = 5;
const DEFAULT_EC_BYTE_NUM: usize = 8;
const DEFAULT_SOURCE_BLOCKS: u8 = 1;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReceiverConfigFile {
    border_length: Option<usize>,
    padding_length: Option<usize>,
    meta_length: Option<usize>,
    main_width: Option<usize>,
    main_height: Option<usize>,
    fps: Option<u32>,
    distance: Option<u32>,
    /// Free-form codec hints: ecNum, ecByteNum, ecLength, sourceBlocks,
    /// queueCapacity. Unrecognized keys are ignored.
    hints: Option<HashMap<String, String>>,
}

/// Border-ring widths and content grid size, in cells. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeGeometry {
    /// Outermost solid black ring.
    pub frame_black_length: usize,
    /// First varying ring inside the black one.
    pub frame_vary_length: usize,
    /// Second varying ring.
    pub frame_vary_two_length: usize,
    /// Side of the square payload grid.
    pub content_length: usize,
}

impl BarcodeGeometry {
    /// Cells from the outer corner to the content region origin.
    pub fn ring_width(&self) -> usize {
        self.frame_black_length + self.frame_vary_length + self.frame_vary_two_length
    }

    /// Full barcode side in cells.
    pub fn bar_code_width(&self) -> usize {
        2 * self.ring_width() + self.content_length
    }

    /// Content region size in bytes.
    pub fn content_bytes(&self) -> usize {
        self.content_length * self.content_length / 8
    }
}

/// Reed-Solomon and fountain parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    /// Number of RS codewords per frame.
    pub ec_num: usize,
    /// Parity symbols per codeword.
    pub ec_byte_num: usize,
    /// RaptorQ source blocks.
    pub source_blocks: u8,
}

impl CodecParams {
    /// Parity block length in bits.
    pub fn ec_length(&self) -> usize {
        8 * self.ec_byte_num
    }

    /// Total parity bytes per frame.
    pub fn parity_bytes(&self) -> usize {
        self.ec_num * self.ec_byte_num
    }
}

/// Byte layout of one frame's content region, derived from geometry and
/// codec parameters and fixed for the whole reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub content_bytes: usize,
    /// Packet region (payload id + symbol) between header and parity.
    pub packet_bytes: usize,
    /// Data bytes per RS codeword.
    pub chunk_data_bytes: usize,
    pub parity_bytes: usize,
    /// RaptorQ symbol bytes carried per packet.
    pub symbol_size: usize,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub geometry: BarcodeGeometry,
    pub codec: CodecParams,
    /// Producer-side capture rate; the core pipeline does not read it.
    pub fps: u32,
    /// Nominal screen-to-camera distance hint; passed through to capture.
    pub distance: u32,
    pub queue_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            geometry: BarcodeGeometry {
                frame_black_length: DEFAULT_BORDER_LENGTH,
                frame_vary_length: DEFAULT_PADDING_LENGTH,
                frame_vary_two_length: DEFAULT_META_LENGTH,
                content_length: DEFAULT_MAIN_WIDTH,
            },
            codec: CodecParams {
                ec_num: DEFAULT_EC_NUM,
                ec_byte_num: DEFAULT_EC_BYTE_NUM,
                source_blocks: DEFAULT_SOURCE_BLOCKS,
            },
            fps: DEFAULT_FPS,
            distance: DEFAULT_DISTANCE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ReceiverConfig {
    /// Load from the file named by `FRAMELINK_CONFIG` (JSON or TOML, chosen
    /// by extension and sniffed without one), apply `FRAMELINK_*` env
    /// overrides, then validate. Any failure is fatal to the receiver.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMELINK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path instead of the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ReceiverConfigFile) -> Result<Self> {
        let hints = file.hints.unwrap_or_default();
        let geometry = BarcodeGeometry {
            frame_black_length: file.border_length.unwrap_or(DEFAULT_BORDER_LENGTH),
            frame_vary_length: file.padding_length.unwrap_or(DEFAULT_PADDING_LENGTH),
            frame_vary_two_length: file.meta_length.unwrap_or(DEFAULT_META_LENGTH),
            content_length: match (file.main_width, file.main_height) {
                (Some(w), Some(h)) if w != h => {
                    return Err(anyhow!(
                        "mainWidth ({}) and mainHeight ({}) must be equal: the content region is square",
                        w,
                        h
                    ));
                }
                (Some(w), _) => w,
                (None, Some(h)) => h,
                (None, None) => DEFAULT_MAIN_WIDTH,
            },
        };
        let codec = CodecParams {
            ec_num: hint_value(&hints, "ecNum")?.unwrap_or(DEFAULT_EC_NUM),
            ec_byte_num: hint_value(&hints, "ecByteNum")?.unwrap_or(DEFAULT_EC_BYTE_NUM),
            source_blocks: hint_value(&hints, "sourceBlocks")?.unwrap_or(DEFAULT_SOURCE_BLOCKS),
        };
        if let Some(ec_length) = hint_value::<usize>(&hints, "ecLength")? {
            if ec_length != codec.ec_length() {
                return Err(anyhow!(
                    "hint ecLength ({}) conflicts with ecByteNum ({}): expected {}",
                    ec_length,
                    codec.ec_byte_num,
                    codec.ec_length()
                ));
            }
        }
        Ok(Self {
            geometry,
            codec,
            fps: file.fps.unwrap_or(DEFAULT_FPS),
            distance: file.distance.unwrap_or(DEFAULT_DISTANCE),
            queue_capacity: hint_value(&hints, "queueCapacity")?
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(fps) = env_value("FRAMELINK_FPS")? {
            self.fps = fps;
        }
        if let Some(capacity) = env_value("FRAMELINK_QUEUE_CAPACITY")? {
            self.queue_capacity = capacity;
        }
        if let Some(ec_num) = env_value("FRAMELINK_EC_NUM")? {
            self.codec.ec_num = ec_num;
        }
        if let Some(ec_byte_num) = env_value("FRAMELINK_EC_BYTE_NUM")? {
            self.codec.ec_byte_num = ec_byte_num;
        }
        if let Some(source_blocks) = env_value("FRAMELINK_SOURCE_BLOCKS")? {
            self.codec.source_blocks = source_blocks;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let g = &self.geometry;
        if g.frame_black_length == 0 {
            return Err(anyhow!("borderLength must be at least one cell"));
        }
        if g.content_length == 0 || (g.content_length * g.content_length) % 8 != 0 {
            return Err(anyhow!(
                "content region of {0}x{0} cells does not pack into whole bytes",
                g.content_length
            ));
        }
        if self.codec.ec_num == 0 || self.codec.ec_byte_num == 0 {
            return Err(anyhow!("ecNum and ecByteNum must be non-zero"));
        }
        if self.codec.source_blocks == 0 {
            return Err(anyhow!("sourceBlocks must be non-zero"));
        }
        if self.fps == 0 {
            return Err(anyhow!("fps must be non-zero"));
        }
        // The layout must leave room for an actual symbol.
        let content_bytes = g.content_bytes();
        let overhead = HEADER_BYTES + PACKET_HEADER_BYTES + self.codec.parity_bytes();
        if content_bytes <= overhead {
            return Err(anyhow!(
                "content region of {} bytes cannot hold {} bytes of header and parity",
                content_bytes,
                overhead
            ));
        }
        let packet_bytes = content_bytes - HEADER_BYTES - self.codec.parity_bytes();
        if packet_bytes % self.codec.ec_num != 0 {
            return Err(anyhow!(
                "packet region of {} bytes does not split into {} equal codewords",
                packet_bytes,
                self.codec.ec_num
            ));
        }
        let codeword = packet_bytes / self.codec.ec_num + self.codec.ec_byte_num;
        if codeword > 255 {
            return Err(anyhow!(
                "codeword of {} symbols exceeds the GF(2^8) limit of 255",
                codeword
            ));
        }
        let symbol_size = packet_bytes - PACKET_HEADER_BYTES;
        if symbol_size > u16::MAX as usize {
            return Err(anyhow!("symbol size {} exceeds the RaptorQ limit", symbol_size));
        }
        Ok(())
    }

    /// Byte layout of the content region. Call after `validate`.
    pub fn layout(&self) -> FrameLayout {
        let content_bytes = self.geometry.content_bytes();
        let parity_bytes = self.codec.parity_bytes();
        let packet_bytes = content_bytes - HEADER_BYTES - parity_bytes;
        FrameLayout {
            content_bytes,
            packet_bytes,
            chunk_data_bytes: packet_bytes / self.codec.ec_num,
            parity_bytes,
            symbol_size: packet_bytes - PACKET_HEADER_BYTES,
        }
    }
}

fn hint_value<T: std::str::FromStr>(hints: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match hints.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("hint {} has unparsable value '{}'", key, raw)),
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has unparsable value '{}'", name, raw)),
    }
}

fn read_config_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;

    let cfg = if path.extension().map(|e| e == "toml").unwrap_or(false) {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid TOML config file {}: {}", path.display(), e))?
    } else if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid JSON config file {}: {}", path.display(), e))?
    } else {
        match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(json_err) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(toml_err) => {
                    return Err(anyhow!(
                        "invalid config file {} (tried JSON and TOML): json error: {}; toml error: {}",
                        path.display(),
                        json_err,
                        toml_err
                    ));
                }
            },
        }
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse_json(json: &str) -> Result<ReceiverConfig> {
        let file: ReceiverConfigFile = serde_json::from_str(json).unwrap();
        let cfg = ReceiverConfig::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[test]
    fn defaults_validate_and_lay_out() {
        let cfg = ReceiverConfig::default();
        cfg.validate().unwrap();
        let layout = cfg.layout();
        // 40x40 cells, 5 codewords of 8 parity bytes.
        assert_eq!(layout.content_bytes, 200);
        assert_eq!(layout.parity_bytes, 40);
        assert_eq!(layout.packet_bytes, 155);
        assert_eq!(layout.chunk_data_bytes, 31);
        assert_eq!(layout.symbol_size, 151);
    }

    #[test]
    fn reads_camel_case_keys_and_hints() {
        let cfg = parse_json(
            r#"{
                "borderLength": 3,
                "paddingLength": 1,
                "metaLength": 1,
                "mainWidth": 40,
                "mainHeight": 40,
                "fps": 30,
                "distance": 50,
                "hints": {"ecNum": "5", "ecByteNum": "8", "sourceBlocks": "2"}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.geometry.frame_black_length, 3);
        assert_eq!(cfg.geometry.bar_code_width(), 50);
        assert_eq!(cfg.codec.source_blocks, 2);
        assert_eq!(cfg.fps, 30);
    }

    #[test]
    fn rejects_rectangular_content_region() {
        let err = parse_json(r#"{"mainWidth": 40, "mainHeight": 48}"#).unwrap_err();
        assert!(err.to_string().contains("must be equal"));
    }

    #[test]
    fn rejects_conflicting_ec_length_hint() {
        let err = parse_json(r#"{"hints": {"ecByteNum": "8", "ecLength": "72"}}"#).unwrap_err();
        assert!(err.to_string().contains("ecLength"));
    }

    #[test]
    fn rejects_unsplittable_packet_region() {
        // 155-byte packet region does not divide into 7 codewords.
        let err = parse_json(r#"{"hints": {"ecNum": "7"}}"#).unwrap_err();
        assert!(err.to_string().contains("equal codewords"));
    }

    #[test]
    fn rejects_parity_heavier_than_content() {
        let err = parse_json(r#"{"mainWidth": 8, "mainHeight": 8}"#).unwrap_err();
        assert!(err.to_string().contains("cannot hold"));
    }

    #[test]
    fn loads_toml_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("receiver.toml");
        std::fs::write(&path, "mainWidth = 40\nmainHeight = 40\nfps = 20\n").unwrap();
        let cfg = ReceiverConfig::load_from(&path).unwrap();
        assert_eq!(cfg.fps, 20);
    }

    #[test]
    fn loads_json_without_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("receiver");
        std::fs::write(&path, r#"{"fps": 24}"#).unwrap();
        let cfg = ReceiverConfig::load_from(&path).unwrap();
        assert_eq!(cfg.fps, 24);
    }
}
