//! Per-block strategy selection: profile + analysis → (preprocess, codec).

use std::fmt;
use std::str::FromStr;

use crate::analyzer::{byte_histogram, entropy_from_histogram, AnalysisReport, ContentClass};
use crate::codec::Algorithm;
use crate::preprocess::{self, Preprocess};

/// User-selected speed/ratio preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Lightning,
    Fast,
    #[default]
    Balanced,
    High,
    Max,
}

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::Lightning,
        Profile::Fast,
        Profile::Balanced,
        Profile::High,
        Profile::Max,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Lightning => "lightning",
            Profile::Fast => "fast",
            Profile::Balanced => "balanced",
            Profile::High => "high",
            Profile::Max => "max",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::ALL
            .into_iter()
            .find(|profile| profile.name() == s)
            .ok_or_else(|| {
                format!("unknown profile '{s}' (expected lightning, fast, balanced, high, or max)")
            })
    }
}

/// What one block will be run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStrategy {
    pub preprocess: Option<Preprocess>,
    pub algorithm: Algorithm,
}

/// Entropy at or above which a block is not worth compressing.
pub const STORE_ENTROPY_THRESHOLD: f64 = 7.5;

/// Choose the strategy for one block from its own bytes plus the global
/// analysis.  The rules run in order; the first match wins.
pub fn select(block: &[u8], report: &AnalysisReport, profile: Profile) -> BlockStrategy {
    use ContentClass::*;

    let histogram = byte_histogram(block);
    let local_entropy = entropy_from_histogram(&histogram, block.len());

    let incompressible = local_entropy >= STORE_ENTROPY_THRESHOLD
        || matches!(report.content_class, Compressed | Media | Executable);

    let algorithm = if incompressible {
        Algorithm::Stored
    } else if matches!(report.content_class, Text | SourceCode | StructuredText)
        && matches!(profile, Profile::Lightning | Profile::Fast)
    {
        Algorithm::Lz4Fast
    } else if report.repetition_factor >= 0.5 && profile == Profile::Lightning {
        Algorithm::Lz4Hc(9)
    } else {
        match profile {
            Profile::Balanced => Algorithm::Zstd(6),
            Profile::High => Algorithm::Zstd(15),
            Profile::Max if report.compressibility_estimate >= 0.5 => Algorithm::Hybrid(9, 19),
            Profile::Max => Algorithm::Zstd(22),
            // Binary-ish content on the speed profiles.
            Profile::Lightning => Algorithm::Lz4Fast,
            Profile::Fast => Algorithm::Lz4Hc(9),
        }
    };

    let preprocess = if algorithm == Algorithm::Stored {
        None
    } else {
        preprocess::choose(block, &histogram)
    };

    BlockStrategy {
        preprocess,
        algorithm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;

    fn report(class: ContentClass, repetition: f64, compressibility: f64) -> AnalysisReport {
        AnalysisReport {
            entropy: 4.0,
            pattern_density: 0.3,
            repetition_factor: repetition,
            content_class: class,
            compressibility_estimate: compressibility,
            sample_size_bytes: 1024,
        }
    }

    #[test]
    fn profile_parsing() {
        assert_eq!("balanced".parse::<Profile>().unwrap(), Profile::Balanced);
        assert_eq!("max".parse::<Profile>().unwrap(), Profile::Max);
        assert!("turbo".parse::<Profile>().is_err());
    }

    #[test]
    fn high_entropy_blocks_are_stored() {
        let mut state = 1u64;
        let noise: Vec<u8> = std::iter::repeat_with(|| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state & 0xFF) as u8
        })
        .take(64 * 1024)
        .collect();
        let strategy = select(&noise, &report(ContentClass::Binary, 0.0, 0.1), Profile::Max);
        assert_eq!(strategy.algorithm, Algorithm::Stored);
        assert_eq!(strategy.preprocess, None);
    }

    #[test]
    fn incompressible_classes_are_stored_regardless_of_content() {
        let data = vec![0u8; 4096];
        for class in [
            ContentClass::Compressed,
            ContentClass::Media,
            ContentClass::Executable,
        ] {
            let strategy = select(&data, &report(class, 0.0, 0.1), Profile::Balanced);
            assert_eq!(strategy.algorithm, Algorithm::Stored, "{class:?}");
            assert_eq!(strategy.preprocess, None);
        }
    }

    #[test]
    fn fast_profiles_use_lz4_on_textual_content() {
        let data = b"plain text ".repeat(400);
        for class in [
            ContentClass::Text,
            ContentClass::SourceCode,
            ContentClass::StructuredText,
        ] {
            for profile in [Profile::Lightning, Profile::Fast] {
                let strategy = select(&data, &report(class, 0.0, 0.5), profile);
                assert_eq!(strategy.algorithm, Algorithm::Lz4Fast);
            }
        }
    }

    #[test]
    fn lightning_uses_lz4_hc_on_repetitive_input() {
        let data = b"pattern ".repeat(512);
        let strategy = select(
            &data,
            &report(ContentClass::Repetitive, 0.8, 0.9),
            Profile::Lightning,
        );
        assert_eq!(strategy.algorithm, Algorithm::Lz4Hc(9));
    }

    #[test]
    fn mid_profiles_map_to_zstd_levels() {
        let data = b"some binary-ish content".repeat(100);
        let base = report(ContentClass::Binary, 0.0, 0.4);
        assert_eq!(
            select(&data, &base, Profile::Balanced).algorithm,
            Algorithm::Zstd(6)
        );
        assert_eq!(
            select(&data, &base, Profile::High).algorithm,
            Algorithm::Zstd(15)
        );
        assert_eq!(
            select(&data, &base, Profile::Max).algorithm,
            Algorithm::Zstd(22)
        );
    }

    #[test]
    fn max_profile_goes_hybrid_on_compressible_input() {
        let data = b"abcd".repeat(1024);
        let strategy = select(
            &data,
            &report(ContentClass::Binary, 0.2, 0.6),
            Profile::Max,
        );
        assert_eq!(strategy.algorithm, Algorithm::Hybrid(9, 19));
    }

    #[test]
    fn speed_profiles_fall_back_on_binary_content() {
        let data = b"\x01\x02\x03\x04 irregular ".repeat(200);
        let base = report(ContentClass::Binary, 0.1, 0.4);
        assert_eq!(
            select(&data, &base, Profile::Lightning).algorithm,
            Algorithm::Lz4Fast
        );
        assert_eq!(
            select(&data, &base, Profile::Fast).algorithm,
            Algorithm::Lz4Hc(9)
        );
    }

    #[test]
    fn preprocess_follows_block_shape() {
        let constant = vec![b'A'; 2048];
        let strategy = select(
            &constant,
            &report(ContentClass::Repetitive, 0.9, 0.9),
            Profile::Balanced,
        );
        assert_eq!(strategy.preprocess, Some(Preprocess::Rle));

        let counters: Vec<u8> = (0u32..4096).flat_map(|v| v.to_le_bytes()).collect();
        let strategy = select(
            &counters,
            &report(ContentClass::Binary, 0.1, 0.5),
            Profile::Balanced,
        );
        assert_eq!(strategy.preprocess, Some(Preprocess::Delta));
    }

    #[test]
    fn end_to_end_selection_from_real_analysis() {
        let data = vec![b'A'; 1024];
        let report = analyze(&data, None);
        let strategy = select(&data, &report, Profile::Balanced);
        assert_eq!(strategy.algorithm, Algorithm::Zstd(6));
        assert_eq!(strategy.preprocess, Some(Preprocess::Rle));
    }
}
