//! Perceptual band reduction of a byte magnitude spectrum.

use serde::{Deserialize, Serialize};

/// Hz ranges from sub-bass to treble. Analyzers with fewer bands use the
/// leading ranges.
pub const FREQUENCY_RANGES: [(f32, f32); 6] = [
    (20.0, 80.0),
    (80.0, 250.0),
    (250.0, 800.0),
    (800.0, 2500.0),
    (2500.0, 6000.0),
    (6000.0, 20000.0),
];

/// Band shaping parameters. Fixed for one analyzer apart from explicit
/// enhancement updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub band_count: usize,
    pub frequency_ranges: Vec<(f32, f32)>,
    pub bass_boost: f32,
    pub mid_boost: f32,
    pub treble_boost: f32,
    /// Raw RMS (0–255) below which a band is floored instead of boosted.
    pub loudness_threshold: f32,
    /// Transform ceiling in dB. Higher values make bars harder to fill.
    pub max_decibels: f32,
    /// Floor for quiet bands, as a percentage of full height.
    pub min_height: f32,
    pub sensitivity: f32,
    /// Transform smoothing time constant (0–1).
    pub smoothing: f32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            band_count: 4,
            frequency_ranges: FREQUENCY_RANGES.to_vec(),
            bass_boost: 0.7,
            mid_boost: 1.2,
            treble_boost: 1.5,
            loudness_threshold: 15.0,
            max_decibels: -10.0,
            min_height: 0.0,
            sensitivity: 1.0,
            smoothing: 0.7,
        }
    }
}

impl BandConfig {
    /// Hz range for `band`; bands past the table reuse the last range.
    pub fn range(&self, band: usize) -> (f32, f32) {
        self.frequency_ranges
            .get(band)
            .or_else(|| self.frequency_ranges.last())
            .copied()
            .unwrap_or((20.0, 20000.0))
    }

    /// Boost for `band`: two bass bands, two mid bands, two treble bands,
    /// unity beyond.
    pub fn boost(&self, band: usize) -> f32 {
        match band {
            0 | 1 => self.bass_boost,
            2 | 3 => self.mid_boost,
            4 | 5 => self.treble_boost,
            _ => 1.0,
        }
    }

    /// Value a band takes when it is below the loudness threshold, on the
    /// 0–255 scale.
    pub fn floor_value(&self) -> f32 {
        self.min_height * 255.0 / 100.0
    }
}

/// Root-mean-square of the bins covering `range` Hz.
///
/// Bin indices are `floor(hz / nyquist * bins)`, inclusive at both ends and
/// clamped to the array.
pub fn band_rms(data: &[u8], range: (f32, f32), sample_rate: f32) -> f32 {
    if data.is_empty() || sample_rate <= 0.0 {
        return 0.0;
    }
    let nyquist = sample_rate / 2.0;
    let len = data.len() as f32;
    let start = ((range.0 / nyquist) * len).floor().max(0.0) as usize;
    let end = (((range.1 / nyquist) * len).floor().max(0.0) as usize).min(data.len() - 1);
    if start > end {
        return 0.0;
    }

    let bins = &data[start..=end];
    let sum_squares: f32 = bins.iter().map(|&v| (v as f32) * (v as f32)).sum();
    (sum_squares / bins.len() as f32).sqrt()
}

/// Soft saturation that approaches but never exceeds 255.
pub fn saturate(value: f32) -> f32 {
    255.0 * (value / 255.0).tanh()
}

/// Applies threshold, boost and saturation to a raw band RMS. Output is on
/// the 0–255 scale.
pub fn enhance(rms: f32, band: usize, config: &BandConfig) -> f32 {
    if rms < config.loudness_threshold {
        return config.floor_value();
    }
    let boosted = saturate(rms * config.boost(band));
    boosted.max(config.loudness_threshold).min(255.0)
}

/// Converts an enhanced band value to a bar height in `[0, 100]`.
pub fn bar_height(value: f32, sensitivity: f32) -> f32 {
    (value / 255.0 * 100.0 * sensitivity).clamp(0.0, 100.0)
}

/// Reduces `data` to `out.len()` bar heights, overwriting `out`.
pub fn compute_frame(data: &[u8], sample_rate: f32, config: &BandConfig, out: &mut [f32]) {
    for (band, slot) in out.iter_mut().enumerate() {
        let rms = band_rms(data, config.range(band), sample_rate);
        *slot = bar_height(enhance(rms, band, config), config.sensitivity);
    }
}
