//! Container parsing, validation, and decompression.
//!
//! Opening is validation-first, mirroring the write order: header, then
//! metadata, then the block index (checked against the layout invariants
//! before any payload byte is touched), then the payload region.  Blocks
//! decode in parallel; the global hash is checked only after the output
//! is reassembled in block order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::block::{self, BlockRecord, FLAG_KNOWN_MASK, INDEX_ENTRY_SIZE};
use crate::codec::ALGO_STORED;
use crate::error::TzpError;
use crate::header::{FileHeader, HEADER_SIZE};
use crate::metadata::Metadata;
use crate::writer::{build_pool, global_hash, worker_count, write_atomically};
use crate::CancelToken;

/// Everything knowable about a container without touching the payload.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub header: FileHeader,
    pub metadata: Metadata,
    pub entries: Vec<BlockRecord>,
    /// File offset where the payload region begins.
    pub payload_start: u64,
}

impl ArchiveInfo {
    /// Block count per algorithm name, recomputed from the index.
    pub fn algorithm_histogram(&self) -> BTreeMap<&'static str, u32> {
        let mut histogram = BTreeMap::new();
        for entry in &self.entries {
            if let Ok(algorithm) = entry.algorithm() {
                *histogram.entry(algorithm.name()).or_insert(0) += 1;
            }
        }
        histogram
    }
}

#[derive(Debug, Clone)]
pub struct DecompressionSummary {
    pub original_len: u64,
    pub compressed_len: u64,
    pub block_count: u32,
    pub elapsed_secs: f64,
}

// ── Parsing & validation ─────────────────────────────────────────────────────

/// Parse and validate the header, metadata, and block index of a
/// container image.
pub fn parse(data: &[u8]) -> Result<ArchiveInfo, TzpError> {
    if data.len() < HEADER_SIZE {
        return Err(TzpError::UnsupportedFormat(format!(
            "file is {} bytes, smaller than the {HEADER_SIZE}-byte header",
            data.len()
        )));
    }
    let header = FileHeader::read(&data[..HEADER_SIZE])?;

    let metadata_end = HEADER_SIZE + header.metadata_len as usize;
    if data.len() < metadata_end {
        return Err(TzpError::CorruptMetadata(
            "metadata section extends past end of file".into(),
        ));
    }
    let metadata = Metadata::from_bytes(&data[HEADER_SIZE..metadata_end])
        .map_err(|e| TzpError::CorruptMetadata(e.to_string()))?;

    let index_len = header.block_count as usize * INDEX_ENTRY_SIZE;
    let index_end = metadata_end + index_len;
    if data.len() < index_end {
        return Err(TzpError::MalformedIndex(
            "block index extends past end of file".into(),
        ));
    }
    let mut entries = Vec::with_capacity(header.block_count as usize);
    for chunk in data[metadata_end..index_end].chunks_exact(INDEX_ENTRY_SIZE) {
        entries.push(BlockRecord::read(chunk)?);
    }

    validate_index(&header, &entries, (data.len() - index_end) as u64)?;

    Ok(ArchiveInfo {
        header,
        metadata,
        entries,
        payload_start: index_end as u64,
    })
}

/// Enforce the index invariants: contiguous, strictly ordered payload
/// offsets; sizes that sum to the header's original length; in-range
/// algorithm codes and flag bits; stored blocks verbatim and unflagged.
fn validate_index(
    header: &FileHeader,
    entries: &[BlockRecord],
    payload_region_len: u64,
) -> Result<(), TzpError> {
    let mut expected_offset = 0u64;
    let mut total_original = 0u64;

    for (index, entry) in entries.iter().enumerate() {
        if entry.payload_offset != expected_offset {
            return Err(TzpError::MalformedIndex(format!(
                "block {index}: payload offset {} should be {expected_offset}",
                entry.payload_offset
            )));
        }
        if entry.flags & !FLAG_KNOWN_MASK != 0 {
            return Err(TzpError::MalformedIndex(format!(
                "block {index}: reserved flag bits set: 0x{:04X}",
                entry.flags
            )));
        }
        entry
            .algorithm()
            .map_err(|e| TzpError::MalformedIndex(format!("block {index}: {e}")))?;
        let hybrid_flag = entry.flags & crate::block::FLAG_HYBRID != 0;
        if hybrid_flag != (entry.algorithm_code == crate::codec::ALGO_HYBRID) {
            return Err(TzpError::MalformedIndex(format!(
                "block {index}: multi-pass flag disagrees with algorithm 0x{:02X}",
                entry.algorithm_code
            )));
        }
        if entry.algorithm_code == ALGO_STORED {
            if entry.compressed_size != entry.original_size {
                return Err(TzpError::MalformedIndex(format!(
                    "block {index}: stored block sizes differ ({} vs {})",
                    entry.compressed_size, entry.original_size
                )));
            }
            if entry.flags != 0 || entry.level != 0 {
                return Err(TzpError::MalformedIndex(format!(
                    "block {index}: stored block carries flags 0x{:04X} level {}",
                    entry.flags, entry.level
                )));
            }
        }
        expected_offset += entry.compressed_size as u64;
        total_original += entry.original_size as u64;
    }

    if total_original != header.original_len {
        return Err(TzpError::MalformedIndex(format!(
            "block sizes sum to {total_original}, header says {}",
            header.original_len
        )));
    }
    if expected_offset != payload_region_len {
        return Err(TzpError::MalformedIndex(format!(
            "payload region is {payload_region_len} bytes, index describes {expected_offset}"
        )));
    }
    Ok(())
}

// ── Decompression ────────────────────────────────────────────────────────────

/// Decompress a container image from memory, verifying every block CRC
/// and the global hash.
pub fn decompress_bytes(
    data: &[u8],
    threads: usize,
    cancel: &CancelToken,
) -> Result<Vec<u8>, TzpError> {
    let info = parse(data)?;
    decode_payload(&info, data, threads, cancel)
}

fn decode_payload(
    info: &ArchiveInfo,
    data: &[u8],
    threads: usize,
    cancel: &CancelToken,
) -> Result<Vec<u8>, TzpError> {
    let payload = &data[info.payload_start as usize..];

    let workers = worker_count(threads, info.entries.len());
    let pool = build_pool(workers)?;
    debug!(workers, blocks = info.entries.len(), "decoding blocks");

    let blocks: Vec<Vec<u8>> = pool.install(|| {
        info.entries
            .par_iter()
            .enumerate()
            .map(|(index, entry)| {
                if cancel.is_cancelled() {
                    return Err(TzpError::Cancelled);
                }
                let start = entry.payload_offset as usize;
                let end = start + entry.compressed_size as usize;
                block::decode_block(index, entry, &payload[start..end])
            })
            .collect::<Result<_, _>>()
    })?;

    let mut out = Vec::with_capacity(info.header.original_len as usize);
    for decoded in &blocks {
        out.extend_from_slice(decoded);
    }

    if global_hash(&out) != info.header.global_hash {
        return Err(TzpError::GlobalChecksumMismatch);
    }
    Ok(out)
}

/// Decompress a container file to `output` (temp file + rename).
pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    threads: usize,
    cancel: &CancelToken,
) -> Result<DecompressionSummary, TzpError> {
    let start = Instant::now();
    let data = fs::read(input.as_ref())?;
    let info = parse(&data)?;
    let decoded = decode_payload(&info, &data, threads, cancel)?;
    write_atomically(output.as_ref(), &decoded)?;

    let summary = DecompressionSummary {
        original_len: decoded.len() as u64,
        compressed_len: data.len() as u64,
        block_count: info.header.block_count,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        original = summary.original_len,
        compressed = summary.compressed_len,
        "decompression finished"
    );
    Ok(summary)
}

/// Read header, metadata, and index of a file without decompressing.
pub fn read_info<P: AsRef<Path>>(path: P) -> Result<ArchiveInfo, TzpError> {
    let data = fs::read(path.as_ref())?;
    parse(&data)
}
