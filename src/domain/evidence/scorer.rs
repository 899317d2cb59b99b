//! Frame quality and confidence scoring.
//!
//! Quality is a capture-time gate in [0, 1] built from brightness closeness
//! to a mid-point target, normalized contrast, and normalized sharpness.
//! Confidence is the value that flows downstream into persisted evidence:
//! quality scaled by the textual specificity of the derived analysis string.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Frames below this quality are never forwarded into conversation context.
pub const REJECTION_THRESHOLD: f64 = 0.4;

/// Mid-point luma target; brightness contribution is 1 here, 0 at the
/// extremes.
const BRIGHTNESS_TARGET: f64 = 128.0;

/// Luma standard deviation that counts as full contrast.
const CONTRAST_NORMALIZER: f64 = 64.0;

/// Local gradient variance that counts as full sharpness.
const SHARPNESS_NORMALIZER: f64 = 900.0;

/// Where a captured observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Screen,
    Webcam,
    Upload,
}

/// Pre-extracted luma statistics for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Mean luma in [0, 255].
    pub mean_luma: f64,
    /// Luma standard deviation.
    pub luma_stddev: f64,
    /// Variance of local gradients.
    pub gradient_variance: f64,
}

impl FrameStats {
    fn is_well_formed(&self) -> bool {
        (0.0..=255.0).contains(&self.mean_luma)
            && self.luma_stddev.is_finite()
            && self.luma_stddev >= 0.0
            && self.gradient_variance.is_finite()
            && self.gradient_variance >= 0.0
    }
}

/// One captured observation, prior to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Reference to the raw payload (object key, data URI, ...).
    pub payload_ref: String,
    pub modality: Modality,
    /// Missing stats mean the payload could not be decoded.
    pub stats: Option<FrameStats>,
    /// Derived analysis text, when a downstream analyzer has run.
    pub analysis: Option<String>,
    pub captured_at: Timestamp,
}

/// Scores a frame's usability in [0, 1].
///
/// Malformed payloads score 0 — never an error, simply excluded from
/// selection by the threshold.
pub fn quality(frame: &Frame) -> f64 {
    let stats = match &frame.stats {
        Some(s) if s.is_well_formed() => s,
        _ => return 0.0,
    };

    let brightness = 1.0 - ((stats.mean_luma - BRIGHTNESS_TARGET) / BRIGHTNESS_TARGET).abs();
    let contrast = (stats.luma_stddev / CONTRAST_NORMALIZER).clamp(0.0, 1.0);
    let sharpness = (stats.gradient_variance / SHARPNESS_NORMALIZER).clamp(0.0, 1.0);

    ((brightness.clamp(0.0, 1.0) + contrast + sharpness) / 3.0).clamp(0.0, 1.0)
}

/// Textual specificity of an analysis string, in [0, 1].
///
/// Longer descriptions with more distinct words read as more specific.
pub fn specificity(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let length_part = (trimmed.len() as f64 / 240.0).min(1.0);
    let distinct_words = {
        let mut words: Vec<&str> = trimmed.split_whitespace().collect();
        words.sort_unstable();
        words.dedup();
        words.len()
    };
    let vocabulary_part = (distinct_words as f64 / 30.0).min(1.0);

    (length_part + vocabulary_part) / 2.0
}

/// Confidence in [0, 1] for downstream consumption.
///
/// A frame with no analysis keeps half its quality as confidence; a fully
/// specific analysis lets confidence reach quality.
pub fn confidence(frame: &Frame) -> f64 {
    let q = quality(frame);
    let s = frame.analysis.as_deref().map(specificity).unwrap_or(0.0);
    q * (0.5 + 0.5 * s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(mean_luma: f64, luma_stddev: f64, gradient_variance: f64) -> Frame {
        Frame {
            payload_ref: "frame-1".to_string(),
            modality: Modality::Webcam,
            stats: Some(FrameStats {
                mean_luma,
                luma_stddev,
                gradient_variance,
            }),
            analysis: None,
            captured_at: Timestamp::now(),
        }
    }

    mod quality_scoring {
        use super::*;

        #[test]
        fn ideal_frame_scores_one() {
            let f = frame(128.0, 64.0, 900.0);
            assert!((quality(&f) - 1.0).abs() < 1e-9);
        }

        #[test]
        fn black_frame_scores_zero_brightness() {
            let f = frame(0.0, 0.0, 0.0);
            assert_eq!(quality(&f), 0.0);
        }

        #[test]
        fn overblown_contrast_is_capped() {
            let capped = frame(128.0, 500.0, 900.0);
            let exact = frame(128.0, 64.0, 900.0);
            assert!((quality(&capped) - quality(&exact)).abs() < 1e-9);
        }

        #[test]
        fn malformed_payload_scores_zero() {
            let f = Frame {
                payload_ref: "broken".to_string(),
                modality: Modality::Upload,
                stats: None,
                analysis: None,
                captured_at: Timestamp::now(),
            };
            assert_eq!(quality(&f), 0.0);
        }

        #[test]
        fn nonsense_stats_score_zero() {
            assert_eq!(quality(&frame(400.0, 10.0, 10.0)), 0.0);
            assert_eq!(quality(&frame(128.0, f64::NAN, 10.0)), 0.0);
            assert_eq!(quality(&frame(128.0, -5.0, 10.0)), 0.0);
        }

        #[test]
        fn quality_stays_in_unit_interval() {
            for f in [
                frame(255.0, 1000.0, 100000.0),
                frame(0.0, 0.0, 0.0),
                frame(64.0, 32.0, 450.0),
            ] {
                let q = quality(&f);
                assert!((0.0..=1.0).contains(&q));
            }
        }
    }

    mod specificity_scoring {
        use super::*;

        #[test]
        fn empty_analysis_has_zero_specificity() {
            assert_eq!(specificity(""), 0.0);
            assert_eq!(specificity("   "), 0.0);
        }

        #[test]
        fn longer_richer_text_is_more_specific() {
            let vague = specificity("a screen");
            let detailed = specificity(
                "dashboard showing quarterly revenue chart with a visible dip in March, \
                 spreadsheet open on the right half, notification badge on the mail icon",
            );
            assert!(detailed > vague);
        }

        #[test]
        fn specificity_is_bounded() {
            let long = "word ".repeat(500);
            assert!(specificity(&long) <= 1.0);
        }
    }

    mod confidence_scoring {
        use super::*;

        #[test]
        fn confidence_without_analysis_is_half_quality() {
            let f = frame(128.0, 64.0, 900.0);
            assert!((confidence(&f) - 0.5).abs() < 1e-9);
        }

        #[test]
        fn specific_analysis_raises_confidence() {
            let mut bare = frame(128.0, 64.0, 900.0);
            let mut described = bare.clone();
            described.analysis = Some(
                "terminal window with failing test output, twelve assertion errors in \
                 the payments module, stack trace pointing at the retry handler"
                    .to_string(),
            );
            bare.analysis = Some("a window".to_string());

            assert!(confidence(&described) > confidence(&bare));
        }

        #[test]
        fn confidence_never_exceeds_quality() {
            let mut f = frame(100.0, 40.0, 500.0);
            f.analysis = Some("very detailed description ".repeat(30));
            assert!(confidence(&f) <= quality(&f) + 1e-9);
        }
    }

    proptest! {
        /// Dominance in all three components never lowers the score.
        #[test]
        fn quality_is_monotonic(
            luma_a in 0.0f64..=128.0,
            luma_gain in 0.0f64..=64.0,
            std_a in 0.0f64..=64.0,
            std_gain in 0.0f64..=32.0,
            grad_a in 0.0f64..=900.0,
            grad_gain in 0.0f64..=400.0,
        ) {
            // Frame B dominates frame A: closer to the brightness target,
            // more contrast, more sharpness.
            let a = frame(luma_a, std_a, grad_a);
            let b = frame(
                (luma_a + luma_gain).min(128.0),
                std_a + std_gain,
                grad_a + grad_gain,
            );
            prop_assert!(quality(&b) >= quality(&a) - 1e-12);
        }
    }
}
