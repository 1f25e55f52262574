//! The compression orchestrator.
//!
//! Single-threaded control flow: analyze once, build the block plan,
//! hash the input, then fan the blocks out across a dedicated rayon pool.
//! Workers own their input slice and return an owned [`EncodedBlock`];
//! the ordered `collect` is the slot table, so the output bytes never
//! depend on completion order.  Files are written to a temporary path in
//! the destination directory and renamed into place on success, so a
//! failed or cancelled run leaves nothing behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::analyzer::{self, AnalysisReport};
use crate::block::{self, BlockRecord, EncodedBlock, FLAG_DELTA, FLAG_HYBRID, FLAG_RLE};
use crate::error::TzpError;
use crate::header::{
    FileHeader, GF_ADAPTIVE_BLOCKS, GF_ANALYZED, GF_MULTI_PASS, GF_PATTERN_OPTIMIZED,
    GF_PREPROCESSED, HEADER_SIZE,
};
use crate::metadata::Metadata;
use crate::planner::{self, BlockPlan};
use crate::strategy::{self, Profile};
use crate::CancelToken;

/// Knobs for a compression run.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    pub profile: Profile,
    /// Worker threads; 0 picks `min(block_count, logical CPUs)`.
    pub threads: usize,
    /// Filename hint forwarded to the analyzer's extension checks.
    pub filename_hint: Option<String>,
}

/// What a compression run did, for reporting.
#[derive(Debug, Clone)]
pub struct CompressionSummary {
    pub original_len: u64,
    pub compressed_len: u64,
    pub block_count: u32,
    pub base_block_size: u32,
    pub analysis: AnalysisReport,
    /// Block count per algorithm name.
    pub algorithms: BTreeMap<String, u32>,
    pub elapsed_secs: f64,
}

impl CompressionSummary {
    /// Compressed-to-original size ratio; 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.original_len == 0 {
            1.0
        } else {
            self.compressed_len as f64 / self.original_len as f64
        }
    }
}

/// First 8 bytes of SHA-256 over the whole input.
pub(crate) fn global_hash(data: &[u8]) -> [u8; 8] {
    let digest = Sha256::digest(data);
    let mut hash = [0u8; 8];
    hash.copy_from_slice(&digest[..8]);
    hash
}

pub(crate) fn worker_count(requested: usize, block_count: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        block_count.clamp(1, num_cpus::get())
    }
}

pub(crate) fn build_pool(threads: usize) -> Result<rayon::ThreadPool, TzpError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| TzpError::Io(std::io::Error::other(e)))
}

/// Compress `input` into a complete container image in memory.
pub fn compress_bytes(
    input: &[u8],
    options: &CompressOptions,
    cancel: &CancelToken,
) -> Result<(Vec<u8>, CompressionSummary), TzpError> {
    let start = Instant::now();

    let report = analyzer::analyze(input, options.filename_hint.as_deref());
    let plan = planner::plan(input, &report);
    info!(
        class = report.content_class.name(),
        entropy = report.entropy,
        blocks = plan.spans.len(),
        block_size = plan.base_block_size,
        "input analyzed"
    );

    let hash = global_hash(input);
    let encoded = compress_plan(input, &plan, &report, options, cancel)?;

    // Assign payload offsets in block order.
    let mut records: Vec<BlockRecord> = Vec::with_capacity(encoded.len());
    let mut payload_offset = 0u64;
    for encoded_block in &encoded {
        records.push(encoded_block.record(payload_offset));
        payload_offset += encoded_block.payload.len() as u64;
    }

    let mut algorithms: BTreeMap<String, u32> = BTreeMap::new();
    for encoded_block in &encoded {
        *algorithms
            .entry(encoded_block.algorithm.name().to_string())
            .or_insert(0) += 1;
    }

    let metadata = Metadata {
        profile: options.profile.name().to_string(),
        analysis: report.clone(),
        algorithms: algorithms.clone(),
    };
    let metadata_bytes = metadata
        .to_bytes()
        .map_err(|e| TzpError::CorruptMetadata(e.to_string()))?;

    let header = FileHeader {
        flags: global_flags(&plan, &records),
        original_len: input.len() as u64,
        block_count: records.len() as u32,
        base_block_size: plan.base_block_size as u32,
        global_hash: hash,
        metadata_len: metadata_bytes.len() as u32,
    };

    let payload_len: usize = encoded.iter().map(|b| b.payload.len()).sum();
    let mut out = Vec::with_capacity(
        HEADER_SIZE + metadata_bytes.len() + records.len() * block::INDEX_ENTRY_SIZE + payload_len,
    );
    header.write(&mut out)?;
    out.extend_from_slice(&metadata_bytes);
    for record in &records {
        record.write(&mut out)?;
    }
    for encoded_block in &encoded {
        out.extend_from_slice(&encoded_block.payload);
    }

    let summary = CompressionSummary {
        original_len: input.len() as u64,
        compressed_len: out.len() as u64,
        block_count: records.len() as u32,
        base_block_size: plan.base_block_size as u32,
        analysis: report,
        algorithms,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        original = summary.original_len,
        compressed = summary.compressed_len,
        ratio = summary.ratio(),
        "compression finished"
    );
    Ok((out, summary))
}

/// Fan the planned blocks out over the worker pool.  The ordered collect
/// doubles as the result slot table.
fn compress_plan(
    input: &[u8],
    plan: &BlockPlan,
    report: &AnalysisReport,
    options: &CompressOptions,
    cancel: &CancelToken,
) -> Result<Vec<EncodedBlock>, TzpError> {
    if plan.spans.is_empty() {
        return Ok(Vec::new());
    }

    let workers = worker_count(options.threads, plan.spans.len());
    let pool = build_pool(workers)?;
    debug!(workers, "dispatching blocks");

    pool.install(|| {
        plan.spans
            .par_iter()
            .enumerate()
            .map(|(index, span)| {
                if cancel.is_cancelled() {
                    return Err(TzpError::Cancelled);
                }
                let data = &input[span.offset..span.offset + span.length];
                let strategy = strategy::select(data, report, options.profile);
                let encoded = block::encode_block(data, &strategy);
                debug!(
                    index,
                    algorithm = encoded.algorithm.name(),
                    original = span.length,
                    compressed = encoded.payload.len(),
                    "block encoded"
                );
                Ok(encoded)
            })
            .collect()
    })
}

fn global_flags(plan: &BlockPlan, records: &[BlockRecord]) -> u16 {
    let mut flags = GF_ANALYZED | GF_ADAPTIVE_BLOCKS;
    if records.iter().any(|r| r.flags & (FLAG_DELTA | FLAG_RLE) != 0) {
        flags |= GF_PREPROCESSED;
    }
    if records.iter().any(|r| r.flags & FLAG_HYBRID != 0) {
        flags |= GF_MULTI_PASS;
    }
    if plan.boundaries_adjusted {
        flags |= GF_PATTERN_OPTIMIZED;
    }
    flags
}

/// Compress a file on disk.  The output appears atomically: bytes go to a
/// temporary sibling first and are renamed over `output` at the end.
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &CompressOptions,
    cancel: &CancelToken,
) -> Result<CompressionSummary, TzpError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let data = fs::read(input)?;
    let mut options = options.clone();
    if options.filename_hint.is_none() {
        options.filename_hint = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }

    let (bytes, summary) = compress_bytes(&data, &options, cancel)?;
    write_atomically(output, &bytes)?;
    Ok(summary)
}

pub(crate) fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), TzpError> {
    let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(output).map_err(|e| TzpError::Io(e.error))?;
    Ok(())
}
