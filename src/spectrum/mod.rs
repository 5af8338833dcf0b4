//! Live frequency band analysis of the playing element.

mod analyzer;
mod bands;

pub use analyzer::{
    AnalyzerState, FrameDriver, SpectrumAnalyzer, SpectrumFrame, FFT_SIZE, FRAME_INTERVAL, MIN_DECIBELS,
};
pub use bands::{band_rms, bar_height, compute_frame, enhance, saturate, BandConfig, FREQUENCY_RANGES};
