//! Single-flight audio command worker.
//!
//! One dedicated thread owns the local audio device and executes at most
//! one command at a time from a queue, polling with a short timeout so a
//! stop request is observed promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use tonewatch_foundation::AudioError;
use tonewatch_telemetry::WorkerStats;

use crate::command::{AudioCommand, CommandFlag};
use crate::{playback, record};

const DEQUEUE_POLL: Duration = Duration::from_millis(100);
const JOIN_POLL: Duration = Duration::from_millis(10);

pub struct AudioCommandWorker {
    tx: Sender<AudioCommand>,
    stop_request: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CommandFlag>>>,
    stats: WorkerStats,
    handle: JoinHandle<()>,
}

impl AudioCommandWorker {
    pub fn spawn() -> Result<Self, AudioError> {
        let (tx, rx) = unbounded::<AudioCommand>();
        let stop_request = Arc::new(AtomicBool::new(false));
        let current = Arc::new(Mutex::new(None::<CommandFlag>));
        let stats = WorkerStats::new();

        let handle = thread::Builder::new()
            .name("audio-command-worker".to_string())
            .spawn({
                let stop_request = stop_request.clone();
                let current = current.clone();
                let stats = stats.clone();
                move || worker_loop(rx, stop_request, current, stats)
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn worker thread: {}", e)))?;

        Ok(Self {
            tx,
            stop_request,
            current,
            stats,
            handle,
        })
    }

    /// Enqueue a command. Fails once the worker has been joined.
    pub fn push(&self, cmd: AudioCommand) -> Result<(), AudioError> {
        if self.stop_request.load(Ordering::SeqCst) {
            return Err(AudioError::InvalidCommand(
                "worker is no longer accepting commands".into(),
            ));
        }
        self.tx
            .send(cmd)
            .map_err(|_| AudioError::InvalidCommand("worker queue is disconnected".into()))
    }

    /// Clear the current command's active flag, if any. The command's
    /// execution loop exits at its next flag check.
    pub fn stop_current(&self) {
        if let Some(flag) = self.current.lock().as_ref() {
            flag.stop();
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Stop the current command, request worker shutdown, and wait for
    /// the thread to exit. A blocked native audio call can stall this
    /// past `timeout`, in which case `JoinTimeout` is returned and the
    /// thread is left detached.
    pub fn join(self, timeout: Duration) -> Result<(), AudioError> {
        self.stop_current();
        self.stop_request.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                return Err(AudioError::JoinTimeout { timeout });
            }
            thread::sleep(JOIN_POLL);
        }
        self.handle
            .join()
            .map_err(|_| AudioError::Fatal("worker thread panicked".into()))
    }
}

fn worker_loop(
    rx: Receiver<AudioCommand>,
    stop_request: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CommandFlag>>>,
    stats: WorkerStats,
) {
    tracing::info!("Audio command worker started");

    while !stop_request.load(Ordering::SeqCst) {
        match rx.recv_timeout(DEQUEUE_POLL) {
            Ok(cmd) => {
                *current.lock() = Some(cmd.flag().clone());
                tracing::debug!(command = cmd.name(), "Executing audio command");
                WorkerStats::incr(&stats.commands_executed);

                if let Err(e) = execute(cmd, &stats) {
                    tracing::error!("Audio command failed: {}", e);
                }

                *current.lock() = None;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("Audio command worker shutting down");
}

fn execute(cmd: AudioCommand, stats: &WorkerStats) -> Result<(), AudioError> {
    match cmd {
        AudioCommand::Playback {
            settings,
            target_freq,
            active,
        } => playback::run_playback(settings, target_freq, &active),
        AudioCommand::ToneDetect {
            settings,
            frame_ms,
            nfft,
            sink,
            active,
        } => record::run_tone_detect(settings, frame_ms, nfft, sink, &active, stats),
        AudioCommand::RawRecord {
            settings,
            frame_ms,
            sink,
            active,
        } => record::run_raw_record(settings, frame_ms, sink, &active, stats),
    }
}
