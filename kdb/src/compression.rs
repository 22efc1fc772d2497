//! Value compression shared by the network-backed adapters.
//!
//! Two codecs exist: [`IdentityCompressor`] passes values through, and
//! [`ThresholdCompressor`] zstd-compresses values of at least `threshold`
//! bytes. Compressed values are zstd frames and are recognised on read by the
//! frame's magic number, so stores written with different thresholds (or no
//! compression at all) stay readable.

use crate::errors::{ErrorKind, KdbError, KdbResult};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Leading bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown compression mode {0:?}")]
    UnknownMode(String),
    #[error("compression threshold must not be negative, got {0}")]
    NegativeThreshold(i64),
    #[error("malformed compressed value: {0}")]
    Malformed(#[source] std::io::Error),
}

impl From<CodecError> for KdbError {
    fn from(err: CodecError) -> Self {
        let kind = match err {
            CodecError::UnknownMode(_) | CodecError::NegativeThreshold(_) => {
                ErrorKind::InvalidConfiguration
            }
            CodecError::Malformed(_) => ErrorKind::Encoding,
        };
        KdbError::new_with_cause(&err.to_string(), kind, err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    None,
    Zstd,
}

impl FromStr for CompressionMode {
    type Err = CodecError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "" | "none" => Ok(CompressionMode::None),
            "zstd" => Ok(CompressionMode::Zstd),
            other => Err(CodecError::UnknownMode(other.to_string())),
        }
    }
}

/// Value codec of a store instance. The configuration is fixed at
/// construction.
pub trait Compressor: Send + Sync + Debug {
    fn compress(&self, data: &[u8]) -> Vec<u8>;

    fn decompress(&self, data: &[u8]) -> KdbResult<Vec<u8>>;

    fn mode(&self) -> CompressionMode;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decompress(&self, data: &[u8]) -> KdbResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn mode(&self) -> CompressionMode {
        CompressionMode::None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdCompressor {
    threshold: usize,
    level: i32,
}

impl ThresholdCompressor {
    pub fn new(threshold: usize) -> ThresholdCompressor {
        ThresholdCompressor {
            threshold,
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Compressor for ThresholdCompressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        // a small raw value that looks like a frame is compressed anyway, so
        // reads never mistake it for one
        if data.len() < self.threshold && !is_frame(data) {
            return data.to_vec();
        }
        match zstd::stream::encode_all(data, self.level) {
            Ok(compressed) => compressed,
            Err(err) => {
                log::error!("Failed to compress value of {} bytes: {}", data.len(), err);
                data.to_vec()
            }
        }
    }

    fn decompress(&self, data: &[u8]) -> KdbResult<Vec<u8>> {
        decode(data)
    }

    fn mode(&self) -> CompressionMode {
        CompressionMode::Zstd
    }
}

fn is_frame(data: &[u8]) -> bool {
    data.starts_with(&ZSTD_MAGIC)
}

fn decode(data: &[u8]) -> KdbResult<Vec<u8>> {
    if !is_frame(data) {
        return Ok(data.to_vec());
    }
    zstd::stream::decode_all(data).map_err(|err| CodecError::Malformed(err).into())
}

/// Builds the codec for a mode name and threshold as found in a connection
/// string.
pub fn new_compressor(mode: &str, threshold: i64) -> KdbResult<Arc<dyn Compressor>> {
    if threshold < 0 {
        return Err(CodecError::NegativeThreshold(threshold).into());
    }
    match mode.parse::<CompressionMode>()? {
        CompressionMode::None => Ok(Arc::new(IdentityCompressor)),
        CompressionMode::Zstd => Ok(Arc::new(ThresholdCompressor::new(threshold as usize))),
    }
}
