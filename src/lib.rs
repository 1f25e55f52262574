//! Adaptive block compression for the `.tzp` v3.1 container format.
//!
//! The engine analyzes an input, partitions it into content-sized blocks,
//! picks a codec (and optional reversible preprocessing) per block,
//! compresses the blocks in parallel, and writes a self-describing file
//! with per-block CRC32s and a truncated whole-file SHA-256.
//! Decompression restores the input byte for byte and verifies both
//! integrity levels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod analyzer;
pub mod block;
pub mod codec;
pub mod error;
pub mod header;
pub mod metadata;
pub mod planner;
pub mod preprocess;
pub mod reader;
pub mod strategy;
pub mod writer;

pub use analyzer::{analyze, AnalysisReport, ContentClass};
pub use codec::Algorithm;
pub use error::TzpError;
pub use reader::{decompress_bytes, decompress_file, read_info, ArchiveInfo, DecompressionSummary};
pub use strategy::Profile;
pub use writer::{compress_bytes, compress_file, CompressOptions, CompressionSummary};

/// Cooperative cancellation signal, checked between blocks.  Cloning
/// shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
