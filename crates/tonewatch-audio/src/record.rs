//! Record-side command execution.
//!
//! The real-time capture callback only converts the hardware sample
//! format to mono f32 and hands the chunk over a bounded channel; all
//! framing and FFT work happens on the worker thread. The callback never
//! blocks: when the channel is full the chunk is dropped and counted.

use std::collections::VecDeque;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use tonewatch_foundation::{AudioError, AudioSettings};
use tonewatch_telemetry::WorkerStats;

use crate::command::{CommandFlag, FrameSink, ObservationSink};
use crate::spectral::SpectralToneDetector;

/// Capacity of the callback-to-worker chunk channel.
const CHUNK_CHANNEL_CAP: usize = 64;
const DRAIN_POLL: Duration = Duration::from_millis(100);

pub fn run_tone_detect(
    settings: AudioSettings,
    frame_ms: u32,
    nfft: usize,
    sink: ObservationSink,
    active: &CommandFlag,
    stats: &WorkerStats,
) -> Result<(), AudioError> {
    let (tx, rx) = bounded::<Vec<f32>>(CHUNK_CHANNEL_CAP);
    let stream = build_input_stream(&settings, tx, stats.clone())?;
    stream.play()?;

    let mut detector = SpectralToneDetector::new(settings.sample_rate_hz, frame_ms, nfft);
    tracing::info!(
        frame_size = detector.frame_size(),
        nfft = detector.nfft(),
        "Tone detection started"
    );

    while active.is_active() {
        match rx.recv_timeout(DRAIN_POLL) {
            Ok(chunk) => {
                for obs in detector.push_samples(&chunk) {
                    WorkerStats::incr(&stats.frames_processed);
                    WorkerStats::incr(&stats.observations_emitted);
                    sink(obs);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    tracing::info!("Tone detection stopped");
    Ok(())
}

pub fn run_raw_record(
    settings: AudioSettings,
    frame_ms: u32,
    sink: FrameSink,
    active: &CommandFlag,
    stats: &WorkerStats,
) -> Result<(), AudioError> {
    let (tx, rx) = bounded::<Vec<f32>>(CHUNK_CHANNEL_CAP);
    let stream = build_input_stream(&settings, tx, stats.clone())?;
    stream.play()?;

    let frame_size = settings.frame_size(frame_ms).max(1);
    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(frame_size * 4);
    let mut frame = vec![0.0f32; frame_size];
    tracing::info!(frame_size, "Raw recording started");

    while active.is_active() {
        match rx.recv_timeout(DRAIN_POLL) {
            Ok(chunk) => {
                buffer.extend(chunk);
                while buffer.len() >= frame_size {
                    for slot in frame.iter_mut() {
                        // Length checked above, pop cannot fail
                        *slot = buffer.pop_front().unwrap_or(0.0);
                    }
                    WorkerStats::incr(&stats.frames_processed);
                    sink(&frame);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stream);
    tracing::info!("Raw recording stopped");
    Ok(())
}

fn build_input_stream(
    settings: &AudioSettings,
    tx: Sender<Vec<f32>>,
    stats: WorkerStats,
) -> Result<Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::DeviceNotFound { name: None })?;
    let sample_format = device.default_input_config()?.sample_format();

    let config = StreamConfig {
        channels: settings.channels,
        sample_rate: cpal::SampleRate(settings.sample_rate_hz),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("Audio input stream error: {}", err);
    };

    let channels = settings.channels as usize;

    let hand_off = move |chunk: Vec<f32>| {
        match tx.try_send(chunk) {
            Ok(()) => WorkerStats::incr(&stats.chunks_captured),
            // Consumer is behind; dropping is the non-blocking choice
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                WorkerStats::incr(&stats.chunks_dropped);
            }
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &_| {
                hand_off(mono_f32(data, channels));
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &_| {
                let chunk: Vec<f32> = data
                    .iter()
                    .step_by(channels)
                    .map(|&s| s as f32 / 32768.0)
                    .collect();
                hand_off(chunk);
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &_| {
                let chunk: Vec<f32> = data
                    .iter()
                    .step_by(channels)
                    .map(|&s| (s as i32 - 32768) as f32 / 32768.0)
                    .collect();
                hand_off(chunk);
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    Ok(stream)
}

/// First channel of an interleaved buffer.
fn mono_f32(data: &[f32], channels: usize) -> Vec<f32> {
    data.iter().step_by(channels).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_extracts_first_channel() {
        let interleaved = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        assert_eq!(mono_f32(&interleaved, 2), vec![1.0, 2.0, 3.0]);
        assert_eq!(mono_f32(&interleaved, 1).len(), 6);
    }
}
