//! Tone playback command execution: a phase-continuous sine written to
//! every output channel until the command's active flag is cleared.

use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use tonewatch_foundation::{AudioError, AudioSettings};

use crate::command::CommandFlag;

const IDLE_SLICE: Duration = Duration::from_millis(100);
const AMPLITUDE: f32 = 0.99;

pub fn run_playback(
    settings: AudioSettings,
    target_freq: f32,
    active: &CommandFlag,
) -> Result<(), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::DeviceNotFound { name: None })?;
    let sample_format = device.default_output_config()?.sample_format();

    let config = StreamConfig {
        channels: settings.channels,
        sample_rate: cpal::SampleRate(settings.sample_rate_hz),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("Audio output stream error: {}", err);
    };

    let channels = settings.channels as usize;
    let phase_step = 2.0 * std::f32::consts::PI * target_freq / settings.sample_rate_hz as f32;

    // Phase accumulator lives in the callback so the sine stays
    // continuous across callback invocations.
    let stream = match sample_format {
        SampleFormat::F32 => {
            let mut phase = 0.0f32;
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &_| {
                    for frame in data.chunks_mut(channels) {
                        let sample = AMPLITUDE * phase.sin();
                        phase = (phase + phase_step) % (2.0 * std::f32::consts::PI);
                        for slot in frame {
                            *slot = sample;
                        }
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let mut phase = 0.0f32;
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &_| {
                    for frame in data.chunks_mut(channels) {
                        let sample = AMPLITUDE * phase.sin();
                        phase = (phase + phase_step) % (2.0 * std::f32::consts::PI);
                        let v = (sample * 32767.0) as i16;
                        for slot in frame {
                            *slot = v;
                        }
                    }
                },
                err_fn,
                None,
            )?
        }
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    stream.play()?;
    tracing::info!(freq = target_freq, "Tone playback started");

    while active.is_active() {
        thread::sleep(IDLE_SLICE);
    }

    drop(stream);
    tracing::info!(freq = target_freq, "Tone playback stopped");
    Ok(())
}
