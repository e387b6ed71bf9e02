use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tonewatch_foundation::AudioSettings;

use crate::spectral::FrequencyObservation;

/// Receives one observation per analyzed frame.
pub type ObservationSink = Arc<dyn Fn(FrequencyObservation) + Send + Sync>;

/// Receives one raw frame of mono f32 samples.
pub type FrameSink = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Cooperative liveness flag carried by every command. `stop()` is the
/// only way a command's execution loop is asked to exit.
#[derive(Clone, Debug)]
pub struct CommandFlag(Arc<AtomicBool>);

impl CommandFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Default for CommandFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of work for the audio command worker. Exactly one command is
/// executing inside the worker at any instant.
pub enum AudioCommand {
    /// Phase-continuous sine playback on the local output device.
    Playback {
        settings: AudioSettings,
        target_freq: f32,
        active: CommandFlag,
    },
    /// Capture, frame, FFT, and report dominant-peak observations.
    ToneDetect {
        settings: AudioSettings,
        frame_ms: u32,
        /// FFT length; `0` means "use the frame size".
        nfft: usize,
        sink: ObservationSink,
        active: CommandFlag,
    },
    /// Capture and hand raw frames to the sink unanalyzed.
    RawRecord {
        settings: AudioSettings,
        frame_ms: u32,
        sink: FrameSink,
        active: CommandFlag,
    },
}

impl AudioCommand {
    pub fn playback(settings: AudioSettings, target_freq: f32) -> Self {
        Self::Playback {
            settings,
            target_freq,
            active: CommandFlag::new(),
        }
    }

    pub fn tone_detect(
        settings: AudioSettings,
        frame_ms: u32,
        nfft: usize,
        sink: ObservationSink,
    ) -> Self {
        Self::ToneDetect {
            settings,
            frame_ms,
            nfft,
            sink,
            active: CommandFlag::new(),
        }
    }

    pub fn raw_record(settings: AudioSettings, frame_ms: u32, sink: FrameSink) -> Self {
        Self::RawRecord {
            settings,
            frame_ms,
            sink,
            active: CommandFlag::new(),
        }
    }

    pub fn flag(&self) -> &CommandFlag {
        match self {
            Self::Playback { active, .. }
            | Self::ToneDetect { active, .. }
            | Self::RawRecord { active, .. } => active,
        }
    }

    pub fn stop(&self) {
        self.flag().stop();
    }

    pub fn reset(&self) {
        self.flag().reset();
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Playback { .. } => "playback",
            Self::ToneDetect { .. } => "tone-detect",
            Self::RawRecord { .. } => "raw-record",
        }
    }
}
