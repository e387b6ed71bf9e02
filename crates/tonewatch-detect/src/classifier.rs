//! Debounced presence classification.
//!
//! Shared by every frame source: a tolerance test plus two counters
//! turning noisy per-frame observations into discrete Detected/Missing
//! transitions. Never emits two consecutive events of the same kind,
//! except across an explicit `reset()`.

use chrono::NaiveDateTime;

use crate::config::ClassifierConfig;
use crate::types::{FrequencyObservation, ToneEvent, ToneEventKind};

pub struct PresenceClassifier {
    config: ClassifierConfig,
    event_counter: u32,
    miss_counter: u32,
    first_match: Option<NaiveDateTime>,
    last_emitted: Option<ToneEventKind>,
}

impl PresenceClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            event_counter: 0,
            miss_counter: 0,
            first_match: None,
            last_emitted: None,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn last_emitted(&self) -> Option<ToneEventKind> {
        self.last_emitted
    }

    pub fn event_counter(&self) -> u32 {
        self.event_counter
    }

    /// Tolerance test. Zero never matches; without a target every
    /// nonzero frequency matches.
    pub fn matches(&self, frequency_hz: f32) -> bool {
        if frequency_hz == 0.0 {
            return false;
        }
        match self.config.target_freq {
            None => true,
            Some(target) => {
                let diff_semitones = (frequency_hz / target).log2().abs() * 12.0;
                diff_semitones < self.config.tolerance_semitones
            }
        }
    }

    /// Feed one observation; returns a transition event when a debounce
    /// threshold is crossed.
    pub fn observe(&mut self, obs: &FrequencyObservation) -> Option<ToneEvent> {
        if self.matches(obs.frequency_hz) {
            self.miss_counter = 0;
            self.event_counter += 1;
            if self.event_counter == 1 {
                self.first_match = Some(obs.timestamp);
            }
            if self.event_counter >= self.config.detect_threshold
                && self.last_emitted != Some(ToneEventKind::Detected)
            {
                let timestamp = self.first_match.unwrap_or(obs.timestamp);
                self.last_emitted = Some(ToneEventKind::Detected);
                return Some(ToneEvent::new(ToneEventKind::Detected, timestamp));
            }
            None
        } else {
            self.event_counter = 0;
            self.first_match = None;
            self.miss_counter += 1;
            if self.miss_counter > self.config.missing_threshold
                && self.last_emitted != Some(ToneEventKind::Missing)
            {
                self.last_emitted = Some(ToneEventKind::Missing);
                return Some(ToneEvent::new(ToneEventKind::Missing, obs.timestamp));
            }
            None
        }
    }

    /// Clears counters and the last-emitted kind. The next confirmation
    /// may re-fire the same kind as before the reset; callers that rely
    /// on the re-delivery (a listener that was restarted mid-tone) need
    /// exactly that.
    pub fn reset(&mut self) {
        self.event_counter = 0;
        self.miss_counter = 0;
        self.first_match = None;
        self.last_emitted = None;
    }
}
