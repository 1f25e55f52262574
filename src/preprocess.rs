//! Reversible byte transforms applied before the codec.
//!
//! Two transforms exist: delta encoding over 4-byte little-endian words
//! (for numeric sequences whose differences are more regular than the raw
//! values) and a framed run-length encoding (for blocks dominated by one
//! byte value).  Both are total: `inverse(forward(x)) == x` for every byte
//! string, including lengths that are not a multiple of the word size.
//!
//! The RLE wire format is a sequence of self-delimiting frames:
//!
//! ```text
//! LIT frame: 0x00 <u16 LE count> <count raw bytes>
//! RUN frame: 0x01 <u16 LE count> <byte>
//! ```
//!
//! Runs shorter than 4 bytes are folded into literal frames; the maximum
//! count per frame is 65535.

/// Which transform a block uses.  At most one per block; the block-flag
/// bits are assigned in `block.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    Delta,
    Rle,
}

const WORD: usize = 4;
/// Runs below this length cost more as a RUN frame than as literals.
const MIN_RUN: usize = 4;
const MAX_FRAME: usize = u16::MAX as usize;

// ── Eligibility ──────────────────────────────────────────────────────────────

/// Delta applies when the block reads as 4-byte little-endian words whose
/// successive differences vary strictly 4x less than the words themselves.
/// Constant blocks fail the strict inequality (0 < 0) and fall through to
/// RLE.
pub fn delta_applicable(data: &[u8]) -> bool {
    if data.len() < 4 * WORD {
        return false;
    }
    let words: Vec<f64> = data
        .chunks_exact(WORD)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]) as f64)
        .collect();
    let diffs: Vec<f64> = words.windows(2).map(|pair| pair[1] - pair[0]).collect();
    4.0 * variance(&diffs) < variance(&words)
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// RLE applies when a single byte value accounts for at least 30% of the
/// block.  Takes the caller's byte histogram to avoid a second scan.
pub fn rle_applicable(histogram: &[u64; 256], len: usize) -> bool {
    if len == 0 {
        return false;
    }
    let max = histogram.iter().copied().max().unwrap_or(0);
    max * 10 >= len as u64 * 3
}

/// Pick the transform for a block, if any.  Delta wins when both qualify.
pub fn choose(data: &[u8], histogram: &[u64; 256]) -> Option<Preprocess> {
    if delta_applicable(data) {
        Some(Preprocess::Delta)
    } else if rle_applicable(histogram, data.len()) {
        Some(Preprocess::Rle)
    } else {
        None
    }
}

// ── Delta ────────────────────────────────────────────────────────────────────

/// Rewrite 4-byte LE words as wrapping differences from the previous word.
/// The first word and any trailing non-word bytes pass through unchanged,
/// so the output length equals the input length.
pub fn delta_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev: u32 = 0;
    let mut chunks = data.chunks_exact(WORD);
    for (i, chunk) in chunks.by_ref().enumerate() {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let encoded = if i == 0 { word } else { word.wrapping_sub(prev) };
        out.extend_from_slice(&encoded.to_le_bytes());
        prev = word;
    }
    out.extend_from_slice(chunks.remainder());
    out
}

/// Inverse of [`delta_encode`]: running wrapping sum over the words.
pub fn delta_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev: u32 = 0;
    let mut chunks = data.chunks_exact(WORD);
    for (i, chunk) in chunks.by_ref().enumerate() {
        let encoded = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let word = if i == 0 { encoded } else { encoded.wrapping_add(prev) };
        out.extend_from_slice(&word.to_le_bytes());
        prev = word;
    }
    out.extend_from_slice(chunks.remainder());
    out
}

// ── Run-length ───────────────────────────────────────────────────────────────

pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(data.len() / 4 + 16);
    let mut i = 0usize;

    while i < data.len() {
        let run_byte = data[i];
        let mut run_len = 1usize;
        while i + run_len < data.len() && data[i + run_len] == run_byte && run_len < MAX_FRAME {
            run_len += 1;
        }

        if run_len >= MIN_RUN {
            out.push(0x01);
            out.extend_from_slice(&(run_len as u16).to_le_bytes());
            out.push(run_byte);
            i += run_len;
        } else {
            // Accumulate literals until the next long run or frame limit.
            let lit_start = i;
            let mut lit_len = 0usize;
            while i < data.len() && lit_len < MAX_FRAME {
                let byte = data[i];
                let mut peek = 0usize;
                while i + peek < data.len() && data[i + peek] == byte && peek < MIN_RUN {
                    peek += 1;
                }
                if peek >= MIN_RUN {
                    break;
                }
                lit_len += 1;
                i += 1;
            }
            out.push(0x00);
            out.extend_from_slice(&(lit_len as u16).to_le_bytes());
            out.extend_from_slice(&data[lit_start..lit_start + lit_len]);
        }
    }
    out
}

/// Decode a buffer produced by [`rle_encode`].  Returns `None` when the
/// frame structure is violated (truncated frame, unknown frame type).
pub fn rle_decode(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < data.len() {
        let frame_type = data[i];
        i += 1;
        if i + 2 > data.len() {
            return None;
        }
        let count = u16::from_le_bytes([data[i], data[i + 1]]) as usize;
        i += 2;

        match frame_type {
            0x00 => {
                if i + count > data.len() {
                    return None;
                }
                out.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            0x01 => {
                if i >= data.len() {
                    return None;
                }
                let byte = data[i];
                i += 1;
                out.extend(std::iter::repeat(byte).take(count));
            }
            _ => return None,
        }
    }
    Some(out)
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

pub fn forward(transform: Preprocess, data: &[u8]) -> Vec<u8> {
    match transform {
        Preprocess::Delta => delta_encode(data),
        Preprocess::Rle => rle_encode(data),
    }
}

pub fn inverse(transform: Preprocess, data: &[u8]) -> Option<Vec<u8>> {
    match transform {
        Preprocess::Delta => Some(delta_decode(data)),
        Preprocess::Rle => rle_decode(data),
    }
}
