//! Detection state listener: converts the tone event stream into level
//! and edge synchronization events that test code can block on.
//!
//! The queue and the edge-computation baseline (`current_event`) share
//! one lock; the "is the current level already satisfied" check and the
//! queue drain happen under that same lock, which is what closes the
//! lost-wakeup race between two consecutive `wait_for_event` calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use tonewatch_foundation::timefmt;

use crate::types::{StateEvent, StateEventKind, ToneEvent};

const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Sentinel returned when the wait times out or the listener stops.
pub const WAIT_FAILED: f64 = -1.0;

#[derive(Default)]
struct ListenerInner {
    queue: VecDeque<StateEvent>,
    /// Most recently delivered tone event; baseline for edge deltas and
    /// for the current-level fast path.
    current_event: Option<ToneEvent>,
}

pub struct DetectionStateListener {
    name: Option<String>,
    inner: Mutex<ListenerInner>,
    cond: Condvar,
    stop_request: AtomicBool,
}

impl DetectionStateListener {
    pub fn new() -> Self {
        Self::named(None)
    }

    pub fn named(name: Option<String>) -> Self {
        Self {
            name,
            inner: Mutex::new(ListenerInner::default()),
            cond: Condvar::new(),
            stop_request: AtomicBool::new(false),
        }
    }

    fn tag(&self) -> String {
        match &self.name {
            Some(n) => format!("DetectionStateListener::{}", n),
            None => "DetectionStateListener".to_string(),
        }
    }

    /// Entry point for the producer side: one call per tone event.
    pub fn tone_detected_event_cb(&self, event: ToneEvent) {
        tracing::debug!(
            listener = %self.tag(),
            kind = ?event.kind,
            timestamp = %timefmt::format_timestamp(event.timestamp),
            "tone_detected_event_cb"
        );

        let mut inner = self.inner.lock();

        let level = StateEventKind::level_for(event.kind);
        inner.queue.push_back(StateEvent::level(level));

        if let Some(current) = &inner.current_event {
            if current.kind != event.kind {
                let edge = StateEventKind::edge_for(event.kind);
                let elapsed_ms = timefmt::delta_ms(current.timestamp, event.timestamp);
                inner.queue.push_back(StateEvent::edge(edge, elapsed_ms));
            }
        }

        inner.current_event = Some(event);
        drop(inner);
        self.cond.notify_all();
    }

    /// Block until a state event of the requested kind is observed.
    ///
    /// Returns the event's `value_ms`; `0` when the queue is empty but
    /// the current level already satisfies a level request; -1 on stop
    /// or timeout. Events of other kinds encountered along the way are
    /// consumed and discarded.
    pub fn wait_for_event(&self, kind: StateEventKind, timeout: Duration) -> f64 {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            if self.stop_request.load(Ordering::SeqCst) {
                return WAIT_FAILED;
            }

            while let Some(ev) = inner.queue.pop_front() {
                tracing::debug!(listener = %self.tag(), event = ?ev, "get event");
                if ev.kind == kind {
                    return ev.value_ms;
                }
            }

            // Queue is transiently empty: the requested level event may
            // already have been consumed by an earlier wait. Same lock
            // as the drain above, so no event can slip in between.
            if let Some(current) = &inner.current_event {
                if StateEventKind::level_for(current.kind) == kind {
                    tracing::debug!(
                        listener = %self.tag(),
                        "current state already fits the waited event"
                    );
                    return 0.0;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return WAIT_FAILED;
            }
            let slice = WAIT_SLICE.min(deadline - now);
            self.cond.wait_for(&mut inner, slice);
        }
    }

    /// Drop queued events but keep the edge baseline; re-enqueue the
    /// current level so a consumer that subscribed late still observes
    /// the state the device is in right now.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        if let Some(current) = &inner.current_event {
            let level = StateEventKind::level_for(current.kind);
            tracing::debug!(
                listener = %self.tag(),
                "reset and resend the event ({:?}, 0)",
                level
            );
            inner.queue.push_back(StateEvent::level(level));
        }
        drop(inner);
        self.cond.notify_all();
    }

    /// Drop queued events and the edge baseline.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.current_event = None;
    }

    /// Unblocks every waiter within one wait slice.
    pub fn stop(&self) {
        self.stop_request.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }

    pub fn current_event(&self) -> Option<ToneEvent> {
        self.inner.lock().current_event.clone()
    }
}

impl Default for DetectionStateListener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToneEventKind;
    use chrono::Duration as ChronoDuration;

    fn tone(kind: ToneEventKind, base: chrono::NaiveDateTime, offset_ms: i64) -> ToneEvent {
        ToneEvent::new(kind, base + ChronoDuration::milliseconds(offset_ms))
    }

    #[test]
    fn level_then_edge_sequence() {
        let listener = DetectionStateListener::new();
        let t0 = timefmt::now();

        listener.tone_detected_event_cb(tone(ToneEventKind::Detected, t0, 0));
        listener.tone_detected_event_cb(tone(ToneEventKind::Missing, t0, 750));

        let active = listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1));
        assert_eq!(active, 0.0);
        let inactive = listener.wait_for_event(StateEventKind::Inactive, Duration::from_secs(1));
        assert_eq!(inactive, 0.0);
        let falling =
            listener.wait_for_event(StateEventKind::FallingEdge, Duration::from_secs(1));
        assert_eq!(falling, 750.0);
    }

    #[test]
    fn first_event_emits_no_edge() {
        let listener = DetectionStateListener::new();
        listener.tone_detected_event_cb(ToneEvent::new(ToneEventKind::Detected, timefmt::now()));
        // Only the level event is queued
        assert_eq!(
            listener.wait_for_event(StateEventKind::RisingEdge, Duration::from_millis(200)),
            WAIT_FAILED
        );
    }

    #[test]
    fn same_kind_event_repeats_level_without_edge() {
        let listener = DetectionStateListener::new();
        let t0 = timefmt::now();
        listener.tone_detected_event_cb(tone(ToneEventKind::Detected, t0, 0));
        listener.tone_detected_event_cb(tone(ToneEventKind::Detected, t0, 100));

        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
            0.0
        );
        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
            0.0
        );
        assert_eq!(
            listener.wait_for_event(StateEventKind::RisingEdge, Duration::from_millis(150)),
            WAIT_FAILED
        );
    }

    #[test]
    fn satisfied_level_returns_zero_without_blocking() {
        let listener = DetectionStateListener::new();
        listener.tone_detected_event_cb(ToneEvent::new(ToneEventKind::Detected, timefmt::now()));

        // Drain the queued Active event
        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
            0.0
        );

        // Queue is now empty, but the current level still satisfies the
        // request; this must not block for the full timeout.
        let started = Instant::now();
        let got = listener.wait_for_event(StateEventKind::Active, Duration::from_secs(5));
        assert_eq!(got, 0.0);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn timeout_returns_sentinel_within_one_slice() {
        let listener = DetectionStateListener::new();
        let started = Instant::now();
        let got = listener.wait_for_event(StateEventKind::Active, Duration::from_millis(300));
        assert_eq!(got, WAIT_FAILED);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(450), "took {:?}", elapsed);
    }

    #[test]
    fn stop_unblocks_waiter() {
        let listener = std::sync::Arc::new(DetectionStateListener::new());
        let waiter = listener.clone();
        let handle = std::thread::spawn(move || {
            waiter.wait_for_event(StateEventKind::Active, Duration::from_secs(30))
        });
        std::thread::sleep(Duration::from_millis(50));
        listener.stop();
        let got = handle.join().unwrap();
        assert_eq!(got, WAIT_FAILED);
    }

    #[test]
    fn reset_resends_current_level_and_keeps_baseline() {
        let listener = DetectionStateListener::new();
        let t0 = timefmt::now();
        listener.tone_detected_event_cb(tone(ToneEventKind::Detected, t0, 0));
        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
            0.0
        );

        listener.reset();
        // The level event is re-delivered for late subscribers
        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_secs(1)),
            0.0
        );

        // The baseline survived the reset: the next opposite event
        // still produces an edge with the full delta.
        listener.tone_detected_event_cb(tone(ToneEventKind::Missing, t0, 1200));
        assert_eq!(
            listener.wait_for_event(StateEventKind::FallingEdge, Duration::from_secs(1)),
            1200.0
        );
    }

    #[test]
    fn clear_drops_baseline() {
        let listener = DetectionStateListener::new();
        listener.tone_detected_event_cb(ToneEvent::new(ToneEventKind::Detected, timefmt::now()));
        listener.clear();
        assert!(listener.current_event().is_none());
        assert_eq!(
            listener.wait_for_event(StateEventKind::Active, Duration::from_millis(200)),
            WAIT_FAILED
        );
    }
}
