use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::DEFAULT_BASE_URL;
use crate::error::ConfigError;
use crate::preload::MAX_CAPACITY;
use crate::spectrum::{BandConfig, FREQUENCY_RANGES, MIN_DECIBELS};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub preload: PreloadConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct PreloadConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_band_count")]
    pub band_count: usize,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_bass_boost")]
    pub bass_boost: f32,
    #[serde(default = "default_mid_boost")]
    pub mid_boost: f32,
    #[serde(default = "default_treble_boost")]
    pub treble_boost: f32,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub min_height: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            band_count: default_band_count(),
            sensitivity: default_sensitivity(),
            smoothing: default_smoothing(),
            bass_boost: default_bass_boost(),
            mid_boost: default_mid_boost(),
            treble_boost: default_treble_boost(),
            threshold: default_threshold(),
            min_height: 0.0,
            max_decibels: default_max_decibels(),
        }
    }
}

fn default_base_url() -> String { DEFAULT_BASE_URL.into() }
fn default_timeout_ms() -> u64 { 5000 }
fn default_capacity() -> usize { MAX_CAPACITY }
fn default_debounce_ms() -> u64 { 300 }
fn default_band_count() -> usize { 4 }
fn default_sensitivity() -> f32 { 1.0 }
fn default_smoothing() -> f32 { 0.7 }
fn default_bass_boost() -> f32 { 0.7 }
fn default_mid_boost() -> f32 { 1.2 }
fn default_treble_boost() -> f32 { 1.5 }
fn default_threshold() -> f32 { 15.0 }
fn default_max_decibels() -> f32 { -10.0 }

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PreloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl AnalyzerConfig {
    pub fn band_config(&self) -> BandConfig {
        BandConfig {
            band_count: self.band_count,
            frequency_ranges: FREQUENCY_RANGES.to_vec(),
            bass_boost: self.bass_boost,
            mid_boost: self.mid_boost,
            treble_boost: self.treble_boost,
            loudness_threshold: self.threshold,
            max_decibels: self.max_decibels,
            min_height: self.min_height,
            sensitivity: self.sensitivity,
            smoothing: self.smoothing,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analyzer;
        if a.band_count != 4 && a.band_count != 6 {
            return Err(ConfigError::Invalid(format!("analyzer.band_count must be 4 or 6, got {}", a.band_count)));
        }
        if !(0.0..=255.0).contains(&a.threshold) {
            return Err(ConfigError::Invalid(format!("analyzer.threshold must be within 0-255, got {}", a.threshold)));
        }
        if !(MIN_DECIBELS..=0.0).contains(&a.max_decibels) {
            return Err(ConfigError::Invalid(format!(
                "analyzer.max_decibels must be within -100-0, got {}",
                a.max_decibels
            )));
        }
        if !(0.0..=1.0).contains(&a.smoothing) {
            return Err(ConfigError::Invalid(format!("analyzer.smoothing must be within 0-1, got {}", a.smoothing)));
        }
        if !(1..=MAX_CAPACITY).contains(&self.preload.capacity) {
            return Err(ConfigError::Invalid(format!(
                "preload.capacity must be within 1-{}, got {}",
                MAX_CAPACITY, self.preload.capacity
            )));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Explicit path, else `encore.toml` in the working directory, else the
/// per-user config file.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("encore.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("encore").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("encore").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
