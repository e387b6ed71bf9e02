//! Session handle owning the audio command worker.
//!
//! Replaces a process-wide static: `init()` returns a value that every
//! subsequent operation is called on, and `finalize()` consumes the
//! worker so later calls fail with `SessionClosed` instead of being
//! silently ignored.

use std::time::Duration;

use tonewatch_foundation::{AudioError, AudioSettings};
use tonewatch_telemetry::WorkerStats;

use crate::command::{AudioCommand, FrameSink, ObservationSink};
use crate::worker::AudioCommandWorker;

/// Default detection framing, matching the historical server-side
/// configuration: 50 ms frames analyzed with a 2048-point FFT.
pub const DEFAULT_DETECT_FRAME_MS: u32 = 50;
pub const DEFAULT_DETECT_NFFT: usize = 2048;

pub struct AudioSession {
    worker: Option<AudioCommandWorker>,
    settings: AudioSettings,
}

impl AudioSession {
    pub fn init() -> Result<Self, AudioError> {
        Self::init_with(AudioSettings::default())
    }

    pub fn init_with(settings: AudioSettings) -> Result<Self, AudioError> {
        let worker = AudioCommandWorker::spawn()?;
        tracing::info!(
            sample_rate = settings.sample_rate_hz,
            channels = settings.channels,
            "Audio session initialized"
        );
        Ok(Self {
            worker: Some(worker),
            settings,
        })
    }

    pub fn settings(&self) -> AudioSettings {
        self.settings
    }

    pub fn stats(&self) -> Result<&WorkerStats, AudioError> {
        Ok(self.worker()?.stats())
    }

    /// Play a tone on the local output. Implicitly stops whatever
    /// command is currently running: the worker is single-flight.
    pub fn play_tone(&self, target_freq: f32) -> Result<(), AudioError> {
        let worker = self.worker()?;
        worker.stop_current();
        worker.push(AudioCommand::playback(self.settings, target_freq))
    }

    /// Start tone detection with the default framing.
    pub fn start_tone_detect(&self, sink: ObservationSink) -> Result<(), AudioError> {
        self.start_tone_detect_with(DEFAULT_DETECT_FRAME_MS, DEFAULT_DETECT_NFFT, sink)
    }

    pub fn start_tone_detect_with(
        &self,
        frame_ms: u32,
        nfft: usize,
        sink: ObservationSink,
    ) -> Result<(), AudioError> {
        Self::check_frame_ms(frame_ms)?;
        let worker = self.worker()?;
        worker.stop_current();
        worker.push(AudioCommand::tone_detect(self.settings, frame_ms, nfft, sink))
    }

    pub fn start_raw_record(&self, frame_ms: u32, sink: FrameSink) -> Result<(), AudioError> {
        Self::check_frame_ms(frame_ms)?;
        let worker = self.worker()?;
        worker.stop_current();
        worker.push(AudioCommand::raw_record(self.settings, frame_ms, sink))
    }

    fn check_frame_ms(frame_ms: u32) -> Result<(), AudioError> {
        if frame_ms == 0 {
            return Err(AudioError::InvalidCommand(
                "frame length must be at least 1 ms".into(),
            ));
        }
        Ok(())
    }

    /// Stop the current command without tearing the session down.
    pub fn stop_audio(&self) -> Result<(), AudioError> {
        self.worker()?.stop_current();
        Ok(())
    }

    /// Tear down the worker. The session is unusable afterwards.
    pub fn finalize(&mut self, timeout: Duration) -> Result<(), AudioError> {
        let worker = self.worker.take().ok_or(AudioError::SessionClosed)?;
        worker.join(timeout)
    }

    fn worker(&self) -> Result<&AudioCommandWorker, AudioError> {
        self.worker.as_ref().ok_or(AudioError::SessionClosed)
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join(Duration::from_secs(10)) {
                tracing::warn!("Audio session drop: {}", e);
            }
        }
    }
}
