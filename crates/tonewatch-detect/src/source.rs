//! Frame sources and the detection loop.
//!
//! One capability interface replaces the historical per-variant thread
//! hierarchy: local capture, device polling, and push delivery all
//! produce `FrequencyObservation`s through the same seam and feed one
//! shared `PresenceClassifier`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use tonewatch_audio::{AudioSession, FrequencyObservation};
use tonewatch_foundation::{AudioSettings, DetectError};
use tonewatch_telemetry::PollerMetrics;

use crate::classifier::PresenceClassifier;
use crate::poller::DumpRing;
use crate::types::ToneCallback;

pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), DetectError>;

    /// Blocks up to `timeout` for the next observation. `Ok(None)`
    /// means nothing arrived this cycle; errors are per-cycle and the
    /// caller is expected to log and continue.
    fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<FrequencyObservation>, DetectError>;

    fn stop(&mut self);
}

/// Feed side of a `PushSource`.
#[derive(Clone)]
pub struct PushHandle {
    tx: Sender<FrequencyObservation>,
}

impl PushHandle {
    /// Non-blocking; a full buffer drops the observation, mirroring the
    /// capture path's drop-on-full rule.
    pub fn push(&self, obs: FrequencyObservation) -> bool {
        match self.tx.try_send(obs) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Channel-fed source for app-broadcast style delivery and tests.
pub struct PushSource {
    rx: Receiver<FrequencyObservation>,
}

impl PushSource {
    pub fn with_capacity(cap: usize) -> (PushHandle, Self) {
        let (tx, rx) = bounded(cap);
        (PushHandle { tx }, Self { rx })
    }
}

impl FrameSource for PushSource {
    fn start(&mut self) -> Result<(), DetectError> {
        Ok(())
    }

    fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<FrequencyObservation>, DetectError> {
        match self.rx.recv_timeout(timeout) {
            Ok(obs) => Ok(Some(obs)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DetectError::SourceNotStarted),
        }
    }

    fn stop(&mut self) {}
}

/// Local capture: owns an audio session whose tone-detect command feeds
/// this source over a bounded channel.
pub struct LocalSpectralSource {
    settings: AudioSettings,
    frame_ms: u32,
    nfft: usize,
    session: Option<AudioSession>,
    rx: Option<Receiver<FrequencyObservation>>,
}

impl LocalSpectralSource {
    pub fn new(settings: AudioSettings, frame_ms: u32, nfft: usize) -> Self {
        Self {
            settings,
            frame_ms,
            nfft,
            session: None,
            rx: None,
        }
    }
}

impl FrameSource for LocalSpectralSource {
    fn start(&mut self) -> Result<(), DetectError> {
        let session = AudioSession::init_with(self.settings)
            .map_err(|e| DetectError::AudioSource(e.to_string()))?;
        let (tx, rx) = bounded::<FrequencyObservation>(256);
        session
            .start_tone_detect_with(
                self.frame_ms,
                self.nfft,
                Arc::new(move |obs| {
                    // Detection loop lagging: drop rather than block
                    let _ = tx.try_send(obs);
                }),
            )
            .map_err(|e| DetectError::AudioSource(e.to_string()))?;
        self.session = Some(session);
        self.rx = Some(rx);
        Ok(())
    }

    fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<FrequencyObservation>, DetectError> {
        let rx = self.rx.as_ref().ok_or(DetectError::SourceNotStarted)?;
        match rx.recv_timeout(timeout) {
            Ok(obs) => Ok(Some(obs)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DetectError::SourceNotStarted),
        }
    }

    fn stop(&mut self) {
        if let Some(session) = &self.session {
            let _ = session.stop_audio();
        }
        // Session drop joins the worker
        self.session = None;
        self.rx = None;
    }
}

const LOOP_POLL: Duration = Duration::from_millis(100);

/// Drive a source into a classifier until `stop` is set.
///
/// Per-cycle failures (parse, channel) are logged and skipped, the
/// same policy for every source implementation; classifier state is
/// only touched by successfully produced observations.
pub fn run_detection_loop(
    mut source: Box<dyn FrameSource>,
    mut classifier: PresenceClassifier,
    callback: ToneCallback,
    stop: Arc<AtomicBool>,
    metrics: Option<PollerMetrics>,
    dump: Option<DumpRing>,
) {
    if let Err(e) = source.start() {
        tracing::error!("Frame source failed to start: {}", e);
        return;
    }

    while !stop.load(Ordering::SeqCst) {
        match source.next_observation(LOOP_POLL) {
            Ok(Some(obs)) => {
                let started = Instant::now();
                if let Some(event) = classifier.observe(&obs) {
                    tracing::info!(
                        kind = ?event.kind,
                        timestamp = %tonewatch_foundation::timefmt::format_timestamp(event.timestamp),
                        "Tone event"
                    );
                    if let Some(d) = &dump {
                        d.push_to_dump(format!(
                            "the state has been changed to {:?} at {}",
                            event.kind,
                            tonewatch_foundation::timefmt::format_timestamp(event.timestamp)
                        ));
                    }
                    callback(event);
                }
                if let Some(m) = &metrics {
                    m.record_classify_time(started.elapsed());
                }
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("Observation cycle failed: {}", e);
                continue;
            }
        }
    }

    source.stop();
}
