//! Ahead-of-time loading of the next track.

mod cache;
mod manager;

pub use cache::{EntryState, PreloadCache, PreloadEntry, MAX_CAPACITY};
pub use manager::{PreloadManager, PreloadOutcome};
