//! Framed spectral analysis: accumulate samples, FFT one frame at a
//! time, report the dominant peak as a frequency observation.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use tonewatch_foundation::timefmt;

/// Avoids a logarithm of zero on an all-silent frame.
const LOG_EPSILON: f32 = 1e-10;

/// One measurement per analyzed frame, from either the local spectral
/// path or a device-side measurement line.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyObservation {
    pub frequency_hz: f32,
    pub amplitude_db: f32,
    pub timestamp: NaiveDateTime,
}

impl FrequencyObservation {
    pub fn new(frequency_hz: f32, amplitude_db: f32, timestamp: NaiveDateTime) -> Self {
        Self {
            frequency_hz,
            amplitude_db,
            timestamp,
        }
    }

    pub fn now(frequency_hz: f32, amplitude_db: f32) -> Self {
        Self::new(frequency_hz, amplitude_db, timefmt::now())
    }
}

pub struct SpectralToneDetector {
    sample_rate_hz: u32,
    frame_size: usize,
    nfft: usize,
    buffer: VecDeque<f32>,
    fft: Arc<dyn Fft<f32>>,
    workspace: Vec<Complex<f32>>,
}

impl SpectralToneDetector {
    /// `nfft == 0` selects an FFT length equal to the frame size.
    pub fn new(sample_rate_hz: u32, frame_ms: u32, nfft: usize) -> Self {
        // A zero-length frame would never drain the accumulation buffer
        let frame_size = ((sample_rate_hz as u64 * frame_ms as u64 / 1000) as usize).max(1);
        let nfft = if nfft == 0 { frame_size } else { nfft.max(frame_size) };
        let fft = FftPlanner::new().plan_fft_forward(nfft);
        Self {
            sample_rate_hz,
            frame_size,
            nfft,
            buffer: VecDeque::with_capacity(frame_size * 4),
            fft,
            workspace: vec![Complex::new(0.0, 0.0); nfft],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn nfft(&self) -> usize {
        self.nfft
    }

    /// Feed captured samples; returns one observation per full frame
    /// consumed from the front of the accumulation buffer.
    pub fn push_samples(&mut self, samples: &[f32]) -> Vec<FrequencyObservation> {
        self.buffer.extend(samples.iter().copied());

        let mut observations = Vec::new();
        while self.buffer.len() >= self.frame_size {
            observations.push(self.analyze_front_frame());
            self.buffer.drain(..self.frame_size);
        }
        observations
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn analyze_front_frame(&mut self) -> FrequencyObservation {
        for (slot, sample) in self
            .workspace
            .iter_mut()
            .zip(self.buffer.iter().take(self.frame_size))
        {
            *slot = Complex::new(*sample, 0.0);
        }
        // Zero-pad when nfft exceeds the frame size
        for slot in self.workspace.iter_mut().skip(self.frame_size) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process(&mut self.workspace);

        // Nyquist range only
        let mut peak_bin = 0usize;
        let mut peak_mag = 0.0f32;
        for (bin, value) in self.workspace[..self.nfft / 2].iter().enumerate() {
            let mag = value.norm();
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = bin;
            }
        }

        let frequency_hz = peak_bin as f32 * self.sample_rate_hz as f32 / self.nfft as f32;
        let amplitude_db = 20.0 * (peak_mag + LOG_EPSILON).log10();
        FrequencyObservation::now(frequency_hz, amplitude_db)
    }
}
