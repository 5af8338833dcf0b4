use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::platform::{AnalysisGraph, SampleTap, TransformSettings};

/// Frequency transform over the samples ending at an element's playhead.
///
/// Each read windows the latest `fft_size` samples (Blackman), takes the
/// magnitude spectrum normalised by the transform size, blends it with the
/// previous frame by the smoothing constant and maps decibels between
/// `min_decibels` and `max_decibels` onto 0–255.
pub struct FftAnalyser {
    tap: Arc<dyn SampleTap>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    settings: TransformSettings,
    closed: bool,
}

impl FftAnalyser {
    pub fn new(tap: Arc<dyn SampleTap>, settings: TransformSettings) -> Self {
        let n = settings.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        Self {
            tap,
            fft: planner.plan_fft_forward(n),
            window: blackman_window(n),
            samples: vec![0.0; n],
            buffer: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            settings,
            closed: false,
        }
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        let min = self.settings.min_decibels;
        let range = self.settings.max_decibels - min;
        if magnitude <= 0.0 || range <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        (255.0 / range * (db - min)).clamp(0.0, 255.0) as u8
    }
}

impl AnalysisGraph for FftAnalyser {
    fn sample_rate(&self) -> f32 {
        self.tap.sample_rate() as f32
    }

    fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        if self.closed {
            out.fill(0);
            return;
        }

        self.tap.read_window(&mut self.samples);
        for ((slot, &s), &w) in self.buffer.iter_mut().zip(&self.samples).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let n = self.settings.fft_size as f32;
        let k = self.settings.smoothing.clamp(0.0, 1.0);
        for (prev, c) in self.smoothed.iter_mut().zip(&self.buffer) {
            *prev = k * *prev + (1.0 - k) * (c.norm() / n);
        }

        for (byte, &mag) in out.iter_mut().zip(&self.smoothed) {
            *byte = self.to_byte(mag);
        }
    }

    fn set_max_decibels(&mut self, max_decibels: f32) {
        self.settings.max_decibels = max_decibels;
    }

    fn close(&mut self) {
        self.closed = true;
        self.smoothed.fill(0.0);
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
        })
        .collect()
}
