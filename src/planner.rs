//! Adaptive block partitioning.
//!
//! The planner turns the global [`AnalysisReport`] into a base block size
//! and a gapless, non-overlapping cover of `[0, len)`.  For structured
//! text, internal boundaries are nudged within a ±B/16 window onto the
//! nearest line feed (else `}` / `]`) so blocks tend to end on record
//! boundaries.  Identical input and report always produce the identical
//! plan.

use crate::analyzer::{AnalysisReport, ContentClass};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * 1024;

/// Smallest base block size; also the whole-file size gate below which
/// nothing larger is worth considering.
pub const MIN_BLOCK_SIZE: usize = 64 * KIB;
pub const MAX_BLOCK_SIZE: usize = 8 * MIB;
const DEFAULT_BLOCK_SIZE: usize = 4 * MIB;

/// One planned block: a half-open byte range of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub offset: usize,
    pub length: usize,
}

/// The full partition of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    pub base_block_size: usize,
    pub spans: Vec<BlockSpan>,
    /// True when at least one boundary was snapped to a separator.
    pub boundaries_adjusted: bool,
}

/// Base block size for the given input length and analysis.
pub fn base_block_size(total_len: usize, report: &AnalysisReport) -> usize {
    use ContentClass::*;
    if total_len < MIN_BLOCK_SIZE
        || matches!(report.content_class, Compressed | Media)
    {
        MIN_BLOCK_SIZE
    } else if report.content_class == Repetitive {
        MAX_BLOCK_SIZE
    } else if report.content_class == StructuredText {
        2 * MIB
    } else if report.compressibility_estimate >= 0.7 {
        MAX_BLOCK_SIZE
    } else if matches!(report.content_class, Text | SourceCode) {
        MIB
    } else if report.content_class == Binary && report.compressibility_estimate < 0.3 {
        MIB
    } else {
        DEFAULT_BLOCK_SIZE
    }
}

/// Partition `data` into blocks according to `report`.
pub fn plan(data: &[u8], report: &AnalysisReport) -> BlockPlan {
    let base = base_block_size(data.len(), report);
    if data.is_empty() {
        return BlockPlan {
            base_block_size: base,
            spans: Vec::new(),
            boundaries_adjusted: false,
        };
    }

    // Internal boundaries at multiples of the base size, then optionally
    // snapped; the terminal boundary is always data.len().
    let mut boundaries: Vec<usize> = Vec::new();
    let mut adjusted = false;
    let snap_radius = base / 16;
    let mut cursor = base;
    let mut prev = 0usize;
    while cursor < data.len() {
        let boundary = if report.content_class == ContentClass::StructuredText {
            let snapped = snap_boundary(data, cursor, snap_radius, prev);
            if snapped != cursor {
                adjusted = true;
            }
            snapped
        } else {
            cursor
        };
        boundaries.push(boundary);
        prev = boundary;
        cursor += base;
    }
    boundaries.push(data.len());

    let mut spans = Vec::with_capacity(boundaries.len());
    let mut start = 0usize;
    for boundary in boundaries {
        spans.push(BlockSpan {
            offset: start,
            length: boundary - start,
        });
        start = boundary;
    }

    BlockPlan {
        base_block_size: base,
        spans,
        boundaries_adjusted: adjusted,
    }
}

/// Snap one internal boundary to the nearest LF within the window, else
/// the nearest `}` / `]`.  The matched byte stays with the left block.
/// Falls back to the original position when no separator exists or the
/// move would collide with the previous boundary.
fn snap_boundary(data: &[u8], boundary: usize, radius: usize, prev: usize) -> usize {
    let lo = boundary.saturating_sub(radius).max(prev + 1).min(data.len() - 1);
    let hi = (boundary + radius).min(data.len() - 1);
    if lo > hi {
        return boundary;
    }

    let window = &data[lo..=hi];
    let nearest = |wanted: &[u8]| -> Option<usize> {
        window
            .iter()
            .enumerate()
            .filter(|&(_, byte)| wanted.contains(byte))
            .map(|(i, _)| lo + i)
            .min_by_key(|pos| pos.abs_diff(boundary))
    };

    let hit = nearest(&[b'\n']).or_else(|| nearest(&[b'}', b']']));
    match hit {
        Some(pos) if pos + 1 > prev && pos + 1 < data.len() => pos + 1,
        _ => boundary,
    }
}
