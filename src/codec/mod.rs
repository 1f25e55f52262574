//! Codec adapters for the closed algorithm set of the v3.1 container.
//!
//! Every block names its codec with a `(code, level)` byte pair in the
//! index (see `block.rs`).  The set is finite and version-gated, so it is
//! expressed as the tagged variant [`Algorithm`] rather than open
//! polymorphism; `from_wire` / `code` / `level_byte` are the (de)serializer
//! for that pair.
//!
//! Zstd compressors are reusable and expensive to set up at high levels,
//! so each worker thread keeps a cache keyed by level.  LZ4 payloads embed
//! the uncompressed length (`compress_prepend_size`), which keeps blocks
//! self-delimiting even after a length-changing preprocessing pass.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{algorithm} (level {level}) compression failed: {message}")]
    Compression {
        algorithm: &'static str,
        level: i32,
        message: String,
    },
    #[error("{algorithm} (level {level}) decompression failed: {message}")]
    Decompression {
        algorithm: &'static str,
        level: i32,
        message: String,
    },
    #[error("unknown algorithm code 0x{code:02X}")]
    UnknownAlgorithm { code: u8 },
    #[error("level byte 0x{level:02X} is invalid for algorithm code 0x{code:02X}")]
    InvalidLevel { code: u8, level: u8 },
}

// ── Algorithm codes (on-disk) ────────────────────────────────────────────────

pub const ALGO_STORED: u8 = 0x00;
pub const ALGO_LZ4_FAST: u8 = 0x01;
pub const ALGO_LZ4_HC: u8 = 0x02;
pub const ALGO_ZSTD_FAST: u8 = 0x03;
pub const ALGO_ZSTD_BALANCED: u8 = 0x04;
pub const ALGO_ZSTD_HIGH: u8 = 0x05;
pub const ALGO_ZSTD_MAX: u8 = 0x06;
pub const ALGO_HYBRID: u8 = 0x07;
/// Reserved; never emitted and rejected on read.
pub const ALGO_ADAPTIVE: u8 = 0x08;

/// The closed set of per-block compression algorithms.
///
/// `Hybrid(lz4_level, zstd_level)` applies LZ4-HC first and Zstd to the
/// LZ4 output; decoding runs the two inverses in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Stored,
    Lz4Fast,
    Lz4Hc(u8),
    Zstd(i32),
    Hybrid(u8, i32),
}

impl Algorithm {
    /// The algorithm code byte written to the block index.
    pub fn code(&self) -> u8 {
        match *self {
            Algorithm::Stored => ALGO_STORED,
            Algorithm::Lz4Fast => ALGO_LZ4_FAST,
            Algorithm::Lz4Hc(_) => ALGO_LZ4_HC,
            Algorithm::Zstd(level) => match level {
                ..=3 => ALGO_ZSTD_FAST,
                4..=9 => ALGO_ZSTD_BALANCED,
                10..=19 => ALGO_ZSTD_HIGH,
                _ => ALGO_ZSTD_MAX,
            },
            Algorithm::Hybrid(_, _) => ALGO_HYBRID,
        }
    }

    /// The level byte written to the block index.  For hybrid blocks the
    /// high nibble carries the LZ4-HC level and the low nibble an index
    /// into the Zstd level table (0→15, 1→19, 2→22).
    pub fn level_byte(&self) -> u8 {
        match *self {
            Algorithm::Stored | Algorithm::Lz4Fast => 0,
            Algorithm::Lz4Hc(level) => level,
            Algorithm::Zstd(level) => level as u8,
            Algorithm::Hybrid(lz4_level, zstd_level) => {
                let zstd_index = match zstd_level {
                    15 => 0,
                    19 => 1,
                    _ => 2,
                };
                (lz4_level << 4) | zstd_index
            }
        }
    }

    /// Reconstruct an algorithm from its on-disk `(code, level)` pair.
    pub fn from_wire(code: u8, level: u8) -> Result<Algorithm, CodecError> {
        match code {
            ALGO_STORED => Ok(Algorithm::Stored),
            ALGO_LZ4_FAST => Ok(Algorithm::Lz4Fast),
            ALGO_LZ4_HC => {
                if level == 0 || level > 12 {
                    return Err(CodecError::InvalidLevel { code, level });
                }
                Ok(Algorithm::Lz4Hc(level))
            }
            ALGO_ZSTD_FAST | ALGO_ZSTD_BALANCED | ALGO_ZSTD_HIGH | ALGO_ZSTD_MAX => {
                let range = match code {
                    ALGO_ZSTD_FAST => 1..=3,
                    ALGO_ZSTD_BALANCED => 4..=9,
                    ALGO_ZSTD_HIGH => 10..=19,
                    _ => 20..=22,
                };
                if !range.contains(&level) {
                    return Err(CodecError::InvalidLevel { code, level });
                }
                Ok(Algorithm::Zstd(level as i32))
            }
            ALGO_HYBRID => {
                let lz4_level = level >> 4;
                if lz4_level == 0 || lz4_level > 12 {
                    return Err(CodecError::InvalidLevel { code, level });
                }
                let zstd_level = match level & 0x0F {
                    0 => 15,
                    1 => 19,
                    2 => 22,
                    _ => return Err(CodecError::InvalidLevel { code, level }),
                };
                Ok(Algorithm::Hybrid(lz4_level, zstd_level))
            }
            other => Err(CodecError::UnknownAlgorithm { code: other }),
        }
    }

    /// Human-readable name, used in metadata histograms and `info` output.
    pub fn name(&self) -> &'static str {
        match self.code() {
            ALGO_STORED => "stored",
            ALGO_LZ4_FAST => "lz4-fast",
            ALGO_LZ4_HC => "lz4-hc",
            ALGO_ZSTD_FAST => "zstd-fast",
            ALGO_ZSTD_BALANCED => "zstd-balanced",
            ALGO_ZSTD_HIGH => "zstd-high",
            ALGO_ZSTD_MAX => "zstd-max",
            _ => "hybrid",
        }
    }
}

// ── Thread-local Zstd compressor cache ───────────────────────────────────────

thread_local! {
    static ZSTD_COMPRESSORS: RefCell<HashMap<i32, zstd::bulk::Compressor<'static>>> =
        RefCell::new(HashMap::new());
}

fn zstd_compress(level: i32, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    ZSTD_COMPRESSORS.with(|cell| {
        let mut cache = cell.borrow_mut();
        let compressor = match cache.entry(level) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(
                zstd::bulk::Compressor::new(level).map_err(|e| CodecError::Compression {
                    algorithm: "zstd",
                    level,
                    message: e.to_string(),
                })?,
            ),
        };
        compressor.compress(data).map_err(|e| CodecError::Compression {
            algorithm: "zstd",
            level,
            message: e.to_string(),
        })
    })
}

fn zstd_decompress(level: i32, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::decode_all(data).map_err(|e| CodecError::Decompression {
        algorithm: "zstd",
        level,
        message: e.to_string(),
    })
}

fn lz4_decompress(level: i32, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    lz4_flex::decompress_size_prepended(data).map_err(|e| CodecError::Decompression {
        algorithm: "lz4",
        level,
        message: e.to_string(),
    })
}

// ── Compression dispatch ─────────────────────────────────────────────────────

/// Compress `data` with the given algorithm.  `Stored` is a copy.
pub fn compress(algorithm: Algorithm, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    match algorithm {
        Algorithm::Stored => Ok(data.to_vec()),
        Algorithm::Lz4Fast | Algorithm::Lz4Hc(_) => Ok(lz4_flex::compress_prepend_size(data)),
        Algorithm::Zstd(level) => zstd_compress(level, data),
        Algorithm::Hybrid(_, zstd_level) => {
            let first_pass = lz4_flex::compress_prepend_size(data);
            zstd_compress(zstd_level, &first_pass)
        }
    }
}

/// Decompress a payload produced by [`compress`].  `original_len` is the
/// size of the fully decoded block; each codec carries its own framing,
/// so the value is advisory here and enforced by the block pipeline.
pub fn decompress(
    algorithm: Algorithm,
    data: &[u8],
    original_len: usize,
) -> Result<Vec<u8>, CodecError> {
    let _ = original_len;
    match algorithm {
        Algorithm::Stored => Ok(data.to_vec()),
        Algorithm::Lz4Fast => lz4_decompress(0, data),
        Algorithm::Lz4Hc(level) => lz4_decompress(level as i32, data),
        Algorithm::Zstd(level) => zstd_decompress(level, data),
        Algorithm::Hybrid(lz4_level, zstd_level) => {
            let first_pass = zstd_decompress(zstd_level, data)?;
            lz4_decompress(lz4_level as i32, &first_pass)
        }
    }
}
