//! Per-frequency detection registry.
//!
//! One worker thread and one independent classifier per tracked target
//! frequency; local capture and device polling are both driven through
//! the same detection loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tonewatch_audio::session::{DEFAULT_DETECT_FRAME_MS, DEFAULT_DETECT_NFFT};
use tonewatch_foundation::{AudioSettings, DetectError};
use tonewatch_telemetry::PollerMetrics;

use crate::channel::SharedChannel;
use crate::classifier::PresenceClassifier;
use crate::config::ClassifierConfig;
use crate::poller::{DevicePollSource, DumpRing, PollerConfig};
use crate::source::{run_detection_loop, FrameSource, LocalSpectralSource};
use crate::types::ToneCallback;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote endpoint for a device-polled detection.
#[derive(Clone)]
pub struct DeviceSpec {
    pub device_id: String,
    pub channel: SharedChannel,
    pub poller: PollerConfig,
}

impl DeviceSpec {
    pub fn new(device_id: impl Into<String>, channel: SharedChannel) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            poller: PollerConfig::default(),
        }
    }

    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }
}

struct DetectionWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    metrics: Option<PollerMetrics>,
    dump: Option<DumpRing>,
}

pub struct ToneDetector {
    settings: AudioSettings,
    workers: HashMap<String, DetectionWorker>,
}

impl ToneDetector {
    pub fn new() -> Self {
        Self::with_settings(AudioSettings::default())
    }

    pub fn with_settings(settings: AudioSettings) -> Self {
        Self {
            settings,
            workers: HashMap::new(),
        }
    }

    fn key(target_freq: Option<f32>) -> String {
        match target_freq {
            Some(f) => format!("{}Hz", f),
            None => "wildcard".to_string(),
        }
    }

    /// Start listening for a target frequency (or any tone, when
    /// `target_freq` is `None`) with preset thresholds. Local capture
    /// when `device` is `None`, device polling otherwise.
    pub fn start_listen(
        &mut self,
        target_freq: Option<f32>,
        callback: ToneCallback,
        device: Option<DeviceSpec>,
    ) -> Result<(), DetectError> {
        self.start_listen_with(ClassifierConfig::for_target(target_freq), callback, device)
    }

    /// Same, with explicit debounce/tolerance configuration.
    pub fn start_listen_with(
        &mut self,
        config: ClassifierConfig,
        callback: ToneCallback,
        device: Option<DeviceSpec>,
    ) -> Result<(), DetectError> {
        let key = Self::key(config.target_freq);

        // Re-listening on an active key replaces the previous worker
        if self.workers.contains_key(&key) {
            tracing::info!(key = %key, "Replacing active detection");
            self.stop_worker(&key)?;
        }

        let classifier = PresenceClassifier::new(config);
        let stop = Arc::new(AtomicBool::new(false));

        let (source, metrics, dump): (Box<dyn FrameSource>, _, _) = match device {
            Some(spec) => {
                let poller = DevicePollSource::new(spec.channel, spec.device_id, spec.poller);
                let metrics = poller.metrics();
                let dump = poller.dump_ring();
                (Box::new(poller), Some(metrics), Some(dump))
            }
            None => (
                Box::new(LocalSpectralSource::new(
                    self.settings,
                    DEFAULT_DETECT_FRAME_MS,
                    DEFAULT_DETECT_NFFT,
                )),
                None,
                None,
            ),
        };

        let handle = thread::Builder::new()
            .name(format!("tone-detect-{}", key))
            .spawn({
                let stop = stop.clone();
                let metrics = metrics.clone();
                let dump = dump.clone();
                move || run_detection_loop(source, classifier, callback, stop, metrics, dump)
            })
            .map_err(|e| DetectError::Fatal(format!("failed to spawn detection thread: {}", e)))?;

        tracing::info!(key = %key, "Detection started");
        self.workers.insert(
            key,
            DetectionWorker {
                stop,
                handle,
                metrics,
                dump,
            },
        );
        Ok(())
    }

    /// Stop one detection, or all of them when `target_freq` is `None`.
    pub fn stop_listen(&mut self, target_freq: Option<f32>) -> Result<(), DetectError> {
        match target_freq {
            Some(_) => {
                let key = Self::key(target_freq);
                if !self.workers.contains_key(&key) {
                    return Err(DetectError::NoSuchDetection { target: key });
                }
                self.stop_worker(&key)
            }
            None => {
                let keys: Vec<String> = self.workers.keys().cloned().collect();
                for key in keys {
                    self.stop_worker(&key)?;
                }
                Ok(())
            }
        }
    }

    /// Flush the forensic dump of a device-polled detection.
    pub fn dump(&self, target_freq: Option<f32>) -> Result<(), DetectError> {
        let key = Self::key(target_freq);
        let worker = self
            .workers
            .get(&key)
            .ok_or(DetectError::NoSuchDetection { target: key })?;
        if let Some(dump) = &worker.dump {
            dump.dump();
        }
        Ok(())
    }

    pub fn active_targets(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    fn stop_worker(&mut self, key: &str) -> Result<(), DetectError> {
        let Some(worker) = self.workers.remove(key) else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if worker.handle.is_finished() {
            let _ = worker.handle.join();
        } else {
            tracing::warn!(key = %key, "Detection thread did not exit within {:?}", STOP_JOIN_TIMEOUT);
        }

        if let Some(metrics) = &worker.metrics {
            tracing::info!(
                key = %key,
                channel_rtt_max_ms = metrics.channel_rtt_max_ms(),
                classify_max_ms = metrics.classify_max_ms(),
                "Detection stopped"
            );
        } else {
            tracing::info!(key = %key, "Detection stopped");
        }
        Ok(())
    }
}

impl Default for ToneDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ToneDetector {
    fn drop(&mut self) {
        let _ = self.stop_listen(None);
    }
}
