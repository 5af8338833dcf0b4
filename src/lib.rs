//! Playback engine for a streamed music catalog: queue navigation, resource
//! health checks with catalog refresh, next-track preloading and live
//! spectrum analysis.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod health;
pub mod platform;
pub mod preload;
pub mod queue;
pub mod spectrum;

pub use engine::{PlaybackEngine, PlayerSnapshot};
