use serde::{Deserialize, Serialize};

/// Stream parameters for a single audio command. Immutable once the
/// command has been pushed to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            channels: 1,
        }
    }
}

impl AudioSettings {
    /// Samples per frame for a frame length given in milliseconds.
    pub fn frame_size(&self, frame_ms: u32) -> usize {
        (self.sample_rate_hz as u64 * frame_ms as u64 / 1000) as usize
    }
}
