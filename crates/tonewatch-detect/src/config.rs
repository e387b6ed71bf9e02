use serde::{Deserialize, Serialize};

/// Debounce and tolerance settings for one presence classifier.
///
/// Historical detector variants disagreed on these values (0.1 vs 2
/// semitones; 1, 2, or 10 confirming frames), so they are explicit
/// configuration with the observed combinations kept as named presets
/// rather than one inferred "correct" value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// `None` is wildcard mode: every nonzero frequency matches.
    pub target_freq: Option<f32>,
    /// Logarithmic matching window: `|log2(f/target)| * 12 < tolerance`.
    pub tolerance_semitones: f32,
    /// Consecutive matching observations required to confirm `Detected`.
    pub detect_threshold: u32,
    /// `Missing` is confirmed once the run of non-matching observations
    /// strictly exceeds this count.
    pub missing_threshold: u32,
}

impl ClassifierConfig {
    /// Device-polling variant: wide tolerance, long confirmation run.
    pub fn targeted(target_freq: f32) -> Self {
        Self {
            target_freq: Some(target_freq),
            tolerance_semitones: 2.0,
            detect_threshold: 10,
            missing_threshold: 1,
        }
    }

    /// Legacy logcat-driven variant: a tenth of a semitone.
    pub fn strict(target_freq: f32) -> Self {
        Self {
            tolerance_semitones: 0.1,
            ..Self::targeted(target_freq)
        }
    }

    /// Server-local variant: any nonzero frequency, single-frame confirm.
    pub fn wildcard() -> Self {
        Self {
            target_freq: None,
            tolerance_semitones: 2.0,
            detect_threshold: 1,
            missing_threshold: 0,
        }
    }

    /// Preset matching the given optional target, as the historical
    /// code picked its thresholds.
    pub fn for_target(target_freq: Option<f32>) -> Self {
        match target_freq {
            Some(f) => Self::targeted(f),
            None => Self::wildcard(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::wildcard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_historical_variants() {
        let t = ClassifierConfig::targeted(440.0);
        assert_eq!(t.detect_threshold, 10);
        assert_eq!(t.tolerance_semitones, 2.0);

        let s = ClassifierConfig::strict(440.0);
        assert_eq!(s.tolerance_semitones, 0.1);
        assert_eq!(s.detect_threshold, 10);

        let w = ClassifierConfig::wildcard();
        assert_eq!(w.target_freq, None);
        assert_eq!(w.detect_threshold, 1);
    }
}
