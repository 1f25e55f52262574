//! Content analysis: entropy, pattern metrics, and content classification.
//!
//! The analyzer is a pure function over a byte slice plus an optional
//! filename hint.  It never fails: empty or pathological input yields a
//! conservative report.  Large inputs are sampled deterministically
//! (first + middle + last 16 KiB), so the report for a given input is
//! always the same.
//!
//! The resulting [`AnalysisReport`] drives block sizing and strategy
//! selection, and is serialized verbatim into the container's metadata
//! section.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Inputs up to this size are analyzed whole; larger inputs are sampled.
pub const SAMPLE_THRESHOLD: usize = 64 * 1024;
const SAMPLE_SEGMENT: usize = 16 * 1024;

const PATTERN_WINDOWS: [usize; 3] = [4, 8, 16];
const REPETITION_WINDOWS: [usize; 2] = [32, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    Text,
    StructuredText,
    SourceCode,
    Binary,
    Executable,
    Media,
    Compressed,
    Repetitive,
    Unknown,
}

impl ContentClass {
    pub fn name(&self) -> &'static str {
        match self {
            ContentClass::Text => "text",
            ContentClass::StructuredText => "structured_text",
            ContentClass::SourceCode => "source_code",
            ContentClass::Binary => "binary",
            ContentClass::Executable => "executable",
            ContentClass::Media => "media",
            ContentClass::Compressed => "compressed",
            ContentClass::Repetitive => "repetitive",
            ContentClass::Unknown => "unknown",
        }
    }
}

/// One-shot analysis of an input, computed before partitioning and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisReport {
    /// Shannon entropy of the sample, bits per byte, in [0, 8].
    pub entropy: f64,
    /// Mean repeated-window ratio over window sizes 4/8/16, in [0, 1].
    pub pattern_density: f64,
    /// Mean fraction of 32/64-byte windows seen earlier in the sample.
    pub repetition_factor: f64,
    pub content_class: ContentClass,
    /// Blended estimate in [0, 1]; higher means better expected ratios.
    pub compressibility_estimate: f64,
    /// Bytes actually inspected (input length, or the sample size).
    pub sample_size_bytes: u64,
}

impl AnalysisReport {
    /// Report used when there is nothing to measure.
    fn conservative() -> Self {
        AnalysisReport {
            entropy: 0.0,
            pattern_density: 0.0,
            repetition_factor: 0.0,
            content_class: ContentClass::Unknown,
            compressibility_estimate: 0.0,
            sample_size_bytes: 0,
        }
    }
}

// ── Histogram helpers (shared with the strategy selector) ────────────────────

pub(crate) fn byte_histogram(data: &[u8]) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }
    histogram
}

pub(crate) fn entropy_from_histogram(histogram: &[u64; 256], len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let total = len as f64;
    let mut entropy = 0.0;
    for &count in histogram {
        if count > 0 {
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Shannon entropy of a byte slice, in [0, 8].
pub fn shannon_entropy(data: &[u8]) -> f64 {
    entropy_from_histogram(&byte_histogram(data), data.len())
}

// ── Analysis ─────────────────────────────────────────────────────────────────

/// Analyze `data`, optionally biased by a filename hint for the
/// extension-based class checks.
pub fn analyze(data: &[u8], filename: Option<&str>) -> AnalysisReport {
    if data.is_empty() {
        return AnalysisReport::conservative();
    }

    let sample = sample_of(data);
    let entropy = shannon_entropy(&sample);
    let pattern_density = pattern_density(&sample);
    let repetition_factor = repetition_factor(&sample);
    let content_class = classify(&sample, filename, entropy, repetition_factor);
    let compressibility_estimate =
        ((8.0 - entropy) / 8.0 * 0.7 + pattern_density * 0.2 + repetition_factor * 0.1)
            .clamp(0.0, 1.0);

    AnalysisReport {
        entropy,
        pattern_density,
        repetition_factor,
        content_class,
        compressibility_estimate,
        sample_size_bytes: sample.len() as u64,
    }
}

/// Whole input below the threshold; otherwise first, middle, and last
/// 16 KiB concatenated.
fn sample_of(data: &[u8]) -> Vec<u8> {
    if data.len() <= SAMPLE_THRESHOLD {
        return data.to_vec();
    }
    let mut sample = Vec::with_capacity(3 * SAMPLE_SEGMENT);
    sample.extend_from_slice(&data[..SAMPLE_SEGMENT]);
    let middle = data.len() / 2 - SAMPLE_SEGMENT / 2;
    sample.extend_from_slice(&data[middle..middle + SAMPLE_SEGMENT]);
    sample.extend_from_slice(&data[data.len() - SAMPLE_SEGMENT..]);
    sample
}

fn pattern_density(sample: &[u8]) -> f64 {
    let mut total = 0.0;
    for window in PATTERN_WINDOWS {
        total += repeated_window_ratio(sample, window);
    }
    total / PATTERN_WINDOWS.len() as f64
}

/// Ratio of windows occurring at least twice to distinct windows, step 1.
fn repeated_window_ratio(sample: &[u8], window: usize) -> f64 {
    if sample.len() < window {
        return 0.0;
    }
    let mut counts: HashMap<&[u8], u32> = HashMap::new();
    for view in sample.windows(window) {
        *counts.entry(view).or_insert(0) += 1;
    }
    let distinct = counts.len();
    if distinct == 0 {
        return 0.0;
    }
    let repeated = counts.values().filter(|&&count| count >= 2).count();
    (repeated as f64 / distinct as f64).min(1.0)
}

fn repetition_factor(sample: &[u8]) -> f64 {
    let mut total = 0.0;
    for window in REPETITION_WINDOWS {
        total += seen_before_fraction(sample, window);
    }
    total / REPETITION_WINDOWS.len() as f64
}

/// Fraction of sliding windows whose content already occurred earlier.
fn seen_before_fraction(sample: &[u8], window: usize) -> f64 {
    if sample.len() < window {
        return 0.0;
    }
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut matches = 0usize;
    let mut windows = 0usize;
    for view in sample.windows(window) {
        windows += 1;
        if !seen.insert(view) {
            matches += 1;
        }
    }
    matches as f64 / windows as f64
}

// ── Classification ───────────────────────────────────────────────────────────

const MEDIA_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "mp3", "mp4", "avi"];
const ARCHIVE_EXTENSIONS: [&str; 6] = ["zip", "gz", "xz", "7z", "bz2", "zst"];
const EXECUTABLE_EXTENSIONS: [&str; 3] = ["exe", "dll", "so"];

const SOURCE_KEYWORDS: [&str; 12] = [
    "fn ", "let ", "struct ", "impl ", "class ", "def ", "function ", "var ", "const ",
    "import ", "include ", "return ",
];

fn classify(
    sample: &[u8],
    filename: Option<&str>,
    entropy: f64,
    repetition_factor: f64,
) -> ContentClass {
    if entropy >= 7.5 {
        return ContentClass::Compressed;
    }
    if let Some(class) = class_from_extension(filename) {
        return class;
    }
    if let Some(class) = class_from_magic(sample) {
        return class;
    }
    // Degenerate near-constant inputs decode as valid UTF-8 all too often;
    // settle them before the text branch.
    if entropy < 2.0 && repetition_factor >= 0.5 {
        return ContentClass::Repetitive;
    }
    if let Ok(text) = std::str::from_utf8(sample) {
        return classify_text(text);
    }
    if repetition_factor >= 0.5 {
        return ContentClass::Repetitive;
    }
    ContentClass::Binary
}

fn class_from_extension(filename: Option<&str>) -> Option<ContentClass> {
    let name = filename?.to_ascii_lowercase();
    let extension = name.rsplit('.').next()?;
    if MEDIA_EXTENSIONS.contains(&extension) {
        Some(ContentClass::Media)
    } else if ARCHIVE_EXTENSIONS.contains(&extension) {
        Some(ContentClass::Compressed)
    } else if EXECUTABLE_EXTENSIONS.contains(&extension) {
        Some(ContentClass::Executable)
    } else {
        None
    }
}

/// Well-known magic numbers of media, archive, and executable formats,
/// matched against the first 8 bytes.
fn class_from_magic(sample: &[u8]) -> Option<ContentClass> {
    const MAGICS: &[(&[u8], ContentClass)] = &[
        (&[0xFF, 0xD8, 0xFF], ContentClass::Media),            // JPEG
        (&[0x89, b'P', b'N', b'G'], ContentClass::Media),      // PNG
        (b"GIF8", ContentClass::Media),                        // GIF
        (b"PK\x03\x04", ContentClass::Compressed),             // ZIP
        (&[0x1F, 0x8B], ContentClass::Compressed),             // gzip
        (&[0xFD, b'7', b'z', b'X', b'Z', 0x00], ContentClass::Compressed), // xz
        (&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C], ContentClass::Compressed), // 7z
        (b"BZh", ContentClass::Compressed),                    // bzip2
        (&[0x28, 0xB5, 0x2F, 0xFD], ContentClass::Compressed), // zstd
        (b"MZ", ContentClass::Executable),                     // PE
        (&[0x7F, b'E', b'L', b'F'], ContentClass::Executable), // ELF
        (&[0xFE, 0xED, 0xFA], ContentClass::Executable),       // Mach-O BE
        (&[0xCF, 0xFA, 0xED, 0xFE], ContentClass::Executable), // Mach-O LE
    ];

    let head = &sample[..sample.len().min(8)];
    MAGICS
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
        .map(|&(_, class)| class)
}

fn classify_text(text: &str) -> ContentClass {
    if is_structured_text(text) {
        ContentClass::StructuredText
    } else if is_source_code(text) {
        ContentClass::SourceCode
    } else {
        ContentClass::Text
    }
}

/// A sample that parses as one JSON value, or whose punctuation is at
/// least 80% JSON-structural characters, counts as structured text.
fn is_structured_text(text: &str) -> bool {
    if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
        return true;
    }
    let mut candidates = 0usize;
    let mut structural = 0usize;
    for c in text.chars() {
        if c.is_alphanumeric() || c.is_whitespace() {
            continue;
        }
        candidates += 1;
        if matches!(c, '{' | '}' | '[' | ']' | '"' | ':' | ',') {
            structural += 1;
        }
    }
    candidates >= 16 && structural * 5 >= candidates * 4
}

fn is_source_code(text: &str) -> bool {
    let keywords = SOURCE_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count();
    if keywords >= 2 {
        return true;
    }
    let semicolons = text.bytes().filter(|&b| b == b';').count();
    let lines = text.bytes().filter(|&b| b == b'\n').count() + 1;
    semicolons as f64 / lines as f64 > 0.3
}
