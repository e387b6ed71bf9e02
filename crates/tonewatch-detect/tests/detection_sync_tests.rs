//! End-to-end detection and synchronization tests
//!
//! Tests cover:
//! - classifier → listener wiring (level + edge emission)
//! - debounced detect, debounced missing, and the falling edge
//!   carrying the millisecond gap between tone events
//! - device-polled pipeline over a scripted channel
//! - wait_for_event timing and sentinel behavior

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;

use tonewatch_detect::listener::WAIT_FAILED;
use tonewatch_detect::{
    run_detection_loop, ChannelOutput, ClassifierConfig, DetectionStateListener, DeviceChannel,
    DevicePollSource, DeviceSpec, FrequencyObservation, PollerConfig, PresenceClassifier,
    PushSource, StateEventKind, ToneCallback, ToneDetector, ToneEventKind,
};
use tonewatch_foundation::{timefmt, DetectError};

// --- Classifier → Listener wiring ---

fn obs_at(freq: f32, base: chrono::NaiveDateTime, offset_ms: i64) -> FrequencyObservation {
    FrequencyObservation {
        frequency_hz: freq,
        amplitude_db: -6.0,
        timestamp: base + ChronoDuration::milliseconds(offset_ms),
    }
}

#[test]
fn debounce_scenario_produces_level_then_edge() {
    // target 440 Hz, tolerance 2 semitones, detect threshold 10,
    // missing confirmed on the 2nd non-matching frame
    let mut classifier = PresenceClassifier::new(ClassifierConfig::targeted(440.0));
    let listener = Arc::new(DetectionStateListener::new());
    let t0 = timefmt::now();

    let mut deliver = |freq: f32, offset_ms: i64| {
        if let Some(event) = classifier.observe(&obs_at(freq, t0, offset_ms)) {
            listener.tone_detected_event_cb(event);
        }
    };

    let tones = [440.0, 438.0, 441.0, 440.0, 439.0, 440.0, 441.0, 438.0, 440.0, 440.0];
    for (i, freq) in tones.iter().enumerate() {
        deliver(*freq, i as i64 * 50);
    }
    // Tone drops; missing confirmed at the 2nd zero frame (offset 550)
    deliver(0.0, 500);
    deliver(0.0, 550);

    assert_eq!(
        listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
        0.0
    );
    assert_eq!(
        listener.wait_for_event(StateEventKind::Inactive, Duration::from_secs(1)),
        0.0
    );
    // Detected was stamped at the 1st matching frame (offset 0),
    // Missing at offset 550
    approx::assert_abs_diff_eq!(
        listener.wait_for_event(StateEventKind::FallingEdge, Duration::from_secs(1)),
        550.0
    );
}

#[test]
fn rising_edge_measures_gap_since_missing() {
    let mut classifier = PresenceClassifier::new(ClassifierConfig::wildcard());
    let listener = Arc::new(DetectionStateListener::new());
    let t0 = timefmt::now();

    for (freq, offset) in [(880.0, 0), (0.0, 100), (880.0, 2100)] {
        if let Some(event) = classifier.observe(&obs_at(freq, t0, offset)) {
            listener.tone_detected_event_cb(event);
        }
    }

    approx::assert_abs_diff_eq!(
        listener.wait_for_event(StateEventKind::RisingEdge, Duration::from_secs(1)),
        2000.0
    );
}

// --- Threaded pipeline over a push source ---

#[test]
fn push_pipeline_delivers_events_to_blocked_waiter() {
    let (handle, source) = PushSource::with_capacity(64);
    let listener = Arc::new(DetectionStateListener::new());
    let stop = Arc::new(AtomicBool::new(false));

    let cb_listener = listener.clone();
    let callback: ToneCallback = Arc::new(move |e| cb_listener.tone_detected_event_cb(e));
    let classifier = PresenceClassifier::new(ClassifierConfig::wildcard());

    let loop_stop = stop.clone();
    let worker = std::thread::spawn(move || {
        run_detection_loop(Box::new(source), classifier, callback, loop_stop, None, None);
    });

    // The waiter blocks first; the producer confirms afterwards
    let waiter = listener.clone();
    let wait_thread =
        std::thread::spawn(move || waiter.wait_for_event(StateEventKind::Active, Duration::from_secs(5)));

    std::thread::sleep(Duration::from_millis(150));
    handle.push(FrequencyObservation::now(440.0, -3.0));

    assert_eq!(wait_thread.join().unwrap(), 0.0);

    stop.store(true, Ordering::SeqCst);
    worker.join().unwrap();
}

// --- Device-polled pipeline ---

/// Channel whose measurement output the test flips at will.
struct SwitchableChannel {
    current: Mutex<String>,
}

impl SwitchableChannel {
    fn new(initial: &str) -> Self {
        Self {
            current: Mutex::new(initial.to_string()),
        }
    }

    fn set(&self, line: &str) {
        *self.current.lock() = line.to_string();
    }
}

impl DeviceChannel for SwitchableChannel {
    fn execute(
        &self,
        tokens: &[&str],
        _device_id: &str,
        _timeout: Duration,
    ) -> Result<ChannelOutput, DetectError> {
        // Side commands (start/stop/purge) produce no measurement
        let stdout = if tokens.first() == Some(&"cat") {
            self.current.lock().clone()
        } else {
            String::new()
        };
        Ok(ChannelOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

fn fast_poller() -> PollerConfig {
    PollerConfig {
        read_cmd: vec!["cat".into(), "prop.txt".into()],
        start_cmd: Some(vec!["start".into()]),
        stop_cmd: Some(vec!["stop".into()]),
        purge_cmd: None,
        purge_every: 10,
        interval: Duration::from_millis(1),
        channel_timeout: Duration::from_secs(1),
    }
}

#[test]
fn device_polled_tone_appearance_and_disappearance() {
    let channel = Arc::new(SwitchableChannel::new("no measurement yet"));
    let listener = Arc::new(DetectionStateListener::new());

    let cb_listener = listener.clone();
    let callback: ToneCallback = Arc::new(move |e| cb_listener.tone_detected_event_cb(e));

    let mut detector = ToneDetector::new();
    detector
        .start_listen_with(
            // Small thresholds keep the test fast; the debounce path is
            // exercised either way
            ClassifierConfig {
                target_freq: Some(440.0),
                tolerance_semitones: 2.0,
                detect_threshold: 3,
                missing_threshold: 1,
            },
            callback,
            Some(
                DeviceSpec::new("SERIAL1", channel.clone()).with_poller(fast_poller()),
            ),
        )
        .unwrap();

    assert_eq!(detector.active_targets(), vec!["440Hz".to_string()]);

    // Tone appears on the device
    channel.set("440.0,-12.0");
    assert_eq!(
        listener.wait_for_event(StateEventKind::Active, Duration::from_secs(5)),
        0.0
    );

    // Tone disappears: the file stops carrying a measurement, which the
    // poller degrades to the silence sentinel
    channel.set("gone");
    let falling = listener.wait_for_event(StateEventKind::FallingEdge, Duration::from_secs(5));
    assert!(falling >= 0.0, "expected a falling edge, got {}", falling);

    detector.stop_listen(Some(440.0)).unwrap();
    assert!(detector.active_targets().is_empty());
    listener.stop();
}

#[test]
fn legacy_epoch_lines_drive_detection() {
    let channel = Arc::new(SwitchableChannel::new("1709287530250, 440.0, active"));
    let events: Arc<Mutex<Vec<ToneEventKind>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = events.clone();
    let callback: ToneCallback = Arc::new(move |e| sink.lock().push(e.kind));

    let mut detector = ToneDetector::new();
    detector
        .start_listen_with(
            ClassifierConfig {
                target_freq: Some(440.0),
                tolerance_semitones: 2.0,
                detect_threshold: 2,
                missing_threshold: 1,
            },
            callback,
            Some(DeviceSpec::new("SERIAL1", channel.clone()).with_poller(fast_poller())),
        )
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while events.lock().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    channel.set("1709287531250, 440.0, inactive");
    let deadline = Instant::now() + Duration::from_secs(5);
    while events.lock().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    detector.stop_listen(None).unwrap();
    let got = events.lock().clone();
    assert!(got.len() >= 2, "expected detected+missing, got {:?}", got);
    assert_eq!(got[0], ToneEventKind::Detected);
    assert_eq!(got[1], ToneEventKind::Missing);
}

#[test]
fn poller_metrics_survive_for_post_mortem() {
    let channel = Arc::new(SwitchableChannel::new("440.0,-12.0"));
    let mut source = DevicePollSource::new(channel, "SERIAL1", fast_poller());
    let metrics = source.metrics();

    use tonewatch_detect::FrameSource;
    source.start().unwrap();
    for _ in 0..5 {
        source.next_observation(Duration::from_millis(50)).unwrap();
    }
    source.stop();

    assert_eq!(metrics.lines_polled.load(Ordering::Relaxed), 5);
    assert_eq!(metrics.parse_failures.load(Ordering::Relaxed), 0);
    assert_eq!(metrics.channel_failures.load(Ordering::Relaxed), 0);
}

// --- wait_for_event timing ---

#[test]
fn wait_timeout_is_within_one_polling_slice() {
    let listener = DetectionStateListener::new();
    let requested = Duration::from_millis(500);
    let started = Instant::now();
    assert_eq!(
        listener.wait_for_event(StateEventKind::RisingEdge, requested),
        WAIT_FAILED
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= requested);
    assert!(
        elapsed < requested + Duration::from_millis(150),
        "overshoot: {:?}",
        elapsed
    );
}

#[test]
fn reset_redelivery_unblocks_late_subscriber() {
    let listener = Arc::new(DetectionStateListener::new());
    listener.tone_detected_event_cb(tonewatch_detect::ToneEvent::new(
        ToneEventKind::Detected,
        timefmt::now(),
    ));
    // The original level event is consumed by an early waiter
    assert_eq!(
        listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
        0.0
    );

    listener.reset();

    // A consumer that was not listening at delivery time still sees the
    // device's current state
    assert_eq!(
        listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
        0.0
    );
}
