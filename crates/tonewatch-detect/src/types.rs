use std::sync::Arc;

use chrono::NaiveDateTime;

pub use tonewatch_audio::FrequencyObservation;

/// Debounce-confirmed presence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneEventKind {
    Detected,
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToneEvent {
    pub kind: ToneEventKind,
    /// For `Detected`, the timestamp of the first matching observation
    /// of the confirming run; for `Missing`, the confirming observation.
    pub timestamp: NaiveDateTime,
}

impl ToneEvent {
    pub fn new(kind: ToneEventKind, timestamp: NaiveDateTime) -> Self {
        Self { kind, timestamp }
    }
}

/// Synchronization event exposed to `wait_for_event` consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateEventKind {
    Active,
    Inactive,
    RisingEdge,
    FallingEdge,
}

impl StateEventKind {
    /// The level event corresponding to a tone event kind.
    pub fn level_for(kind: ToneEventKind) -> Self {
        match kind {
            ToneEventKind::Detected => Self::Active,
            ToneEventKind::Missing => Self::Inactive,
        }
    }

    /// The edge event corresponding to a transition *into* `kind`.
    pub fn edge_for(kind: ToneEventKind) -> Self {
        match kind {
            ToneEventKind::Detected => Self::RisingEdge,
            ToneEventKind::Missing => Self::FallingEdge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateEvent {
    pub kind: StateEventKind,
    /// `0` for level events; elapsed milliseconds between the two
    /// bounding tone events for edge events.
    pub value_ms: f64,
}

impl StateEvent {
    pub fn level(kind: StateEventKind) -> Self {
        Self { kind, value_ms: 0.0 }
    }

    pub fn edge(kind: StateEventKind, value_ms: f64) -> Self {
        Self { kind, value_ms }
    }
}

pub type ToneCallback = Arc<dyn Fn(ToneEvent) + Send + Sync>;
