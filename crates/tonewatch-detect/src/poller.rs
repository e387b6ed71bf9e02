//! Device-side tone poller: derives frequency observations from a text
//! measurement periodically read off the device under test.
//!
//! Each poll cycle shells one read through the device channel, parses
//! the latest line, and reports it as if it were a locally captured
//! frame. Round-trip and processing latencies are tracked for
//! post-mortem logging, and a bounded dump ring keeps a forensic trail
//! of raw lines and decisions that is flushed on demand.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tonewatch_foundation::{timefmt, DetectError};
use tonewatch_telemetry::PollerMetrics;

use crate::channel::SharedChannel;
use crate::parse::parse_measurement_line;
use crate::source::FrameSource;
use crate::types::FrequencyObservation;

/// Lines kept in the rolling debug dump before the oldest are dropped.
const DUMP_CAP: usize = 512;

/// Substituted when the channel returns no comma-bearing text, so a
/// missing or empty measurement file reads as silence instead of
/// stalling the debounce.
const SILENCE_SENTINEL: &str = "0,-30";

/// Lock-guarded rolling debug log. Flushed on demand after a failure
/// rather than continuously.
#[derive(Clone)]
pub struct DumpRing {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl DumpRing {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(DUMP_CAP))),
        }
    }

    pub fn push_to_dump(&self, msg: impl Into<String>) {
        let mut ring = self.inner.lock();
        if ring.len() == DUMP_CAP {
            ring.pop_front();
        }
        ring.push_back(msg.into());
    }

    /// Flush the trail to the log and clear it.
    pub fn dump(&self) {
        let mut ring = self.inner.lock();
        tracing::info!("---------------- poller dump ----------------");
        for msg in ring.iter() {
            tracing::info!(target: "tonewatch::dump", "{:?}", msg);
        }
        tracing::info!("---------------------------------------------");
        ring.clear();
    }

    pub fn clear_dump(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }
}

impl Default for DumpRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote instrumentation protocol for one polled measurement stream.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Command reading the latest measurement line.
    pub read_cmd: Vec<String>,
    /// Instructs the instrumentation to begin emitting measurements.
    pub start_cmd: Option<Vec<String>>,
    /// Instructs it to cease.
    pub stop_cmd: Option<Vec<String>>,
    /// Periodic cleanup of the measurement artifact.
    pub purge_cmd: Option<Vec<String>>,
    /// Purge once every this many poll cycles.
    pub purge_every: u32,
    pub interval: Duration,
    pub channel_timeout: Duration,
}

impl PollerConfig {
    /// The record-prop protocol spoken by the on-device audio demo app.
    pub fn record_prop() -> Self {
        const PROP_FILE: &str = "sdcard/AudioFunctionsDemo-record-prop.txt";
        const INTENT: &str = "audio.htc.com.intent.";
        let strs = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            read_cmd: strs(&["cat", PROP_FILE]),
            start_cmd: Some(strs(&[
                "am", "broadcast", "-a", &format!("{}record.start", INTENT),
                "--ei", "spt_xmax", "1000",
            ])),
            stop_cmd: Some(strs(&["am", "broadcast", "-a", &format!("{}record.stop", INTENT)])),
            purge_cmd: Some(strs(&["rm", "-f", PROP_FILE])),
            purge_every: 10,
            interval: Duration::from_millis(10),
            channel_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::record_prop()
    }
}

pub struct DevicePollSource {
    channel: SharedChannel,
    device_id: String,
    config: PollerConfig,
    metrics: PollerMetrics,
    dump: DumpRing,
    tick: u32,
    last_freq: Option<f32>,
}

impl DevicePollSource {
    pub fn new(channel: SharedChannel, device_id: impl Into<String>, config: PollerConfig) -> Self {
        Self {
            channel,
            device_id: device_id.into(),
            config,
            metrics: PollerMetrics::new(),
            dump: DumpRing::new(),
            tick: 0,
            last_freq: None,
        }
    }

    pub fn metrics(&self) -> PollerMetrics {
        self.metrics.clone()
    }

    pub fn dump_ring(&self) -> DumpRing {
        self.dump.clone()
    }

    fn run_side_command(&self, cmd: &Option<Vec<String>>, what: &str) {
        if let Some(tokens) = cmd {
            let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
            match self
                .channel
                .execute(&tokens, &self.device_id, self.config.channel_timeout)
            {
                Ok(out) if out.is_failure() => {
                    tracing::warn!(stderr = %out.stderr, "{} command failed", what);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("{} command failed: {}", what, e),
            }
        }
    }

    /// One read of the measurement artifact, with RTT accounting.
    fn poll_line(&mut self) -> Result<String, DetectError> {
        let tokens: Vec<&str> = self.config.read_cmd.iter().map(String::as_str).collect();

        let started = Instant::now();
        let result = self
            .channel
            .execute(&tokens, &self.device_id, self.config.channel_timeout);
        let rtt = started.elapsed();
        self.metrics.record_channel_rtt(rtt);

        let output = result.inspect_err(|_| self.metrics.incr_channel_failures())?;
        if output.is_failure() {
            self.metrics.incr_channel_failures();
            return Err(DetectError::Channel {
                stderr: output.stderr.trim().to_string(),
            });
        }

        let raw = output
            .stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string();

        // Measurement gone or not yet written: read as silence
        let line = if !raw.contains(',') {
            format!("{} {}", timefmt::now_str(), SILENCE_SENTINEL)
        } else if raw.split_whitespace().count() < 3 {
            // Bare `freq,amp` pair: stamp it on arrival
            format!("{} {}", timefmt::now_str(), raw)
        } else {
            raw
        };

        self.dump.push_to_dump(format!(
            "{} (channel rtt: {:.1} ms)",
            line,
            rtt.as_secs_f64() * 1000.0
        ));
        Ok(line)
    }
}

impl FrameSource for DevicePollSource {
    fn start(&mut self) -> Result<(), DetectError> {
        self.run_side_command(&self.config.start_cmd.clone(), "instrumentation start");
        Ok(())
    }

    /// One poll cycle; the fixed poll interval is enforced here, so the
    /// `timeout` hint only caps the cycle's trailing sleep.
    fn next_observation(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<FrequencyObservation>, DetectError> {
        if self.tick == 0 {
            self.run_side_command(&self.config.purge_cmd.clone(), "measurement purge");
        }
        self.tick = (self.tick + 1) % self.config.purge_every.max(1);

        let cycle = (|| {
            let line = self.poll_line()?;
            let obs = parse_measurement_line(&line).inspect_err(|e| {
                self.metrics.incr_parse_failures();
                self.dump.push_to_dump(format!("unparseable line: {}", e));
            })?;
            self.metrics.incr_lines_polled();

            if self.last_freq != Some(obs.frequency_hz) {
                self.dump.push_to_dump(format!(
                    "the detected freq has been changed from {:?} to {} Hz",
                    self.last_freq, obs.frequency_hz
                ));
                self.last_freq = Some(obs.frequency_hz);
            }
            Ok(Some(obs))
        })();

        thread::sleep(self.config.interval.min(timeout));
        cycle
    }

    fn stop(&mut self) {
        self.run_side_command(&self.config.stop_cmd.clone(), "instrumentation stop");
        tracing::info!(
            device = %self.device_id,
            channel_rtt_max_ms = self.metrics.channel_rtt_max_ms(),
            classify_max_ms = self.metrics.classify_max_ms(),
            "Device poller stopped"
        );
    }
}
