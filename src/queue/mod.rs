pub mod navigator;
pub mod state;
pub mod track;

pub use navigator::{next_index, previous_index};
pub use state::{is_permutation, shuffle_order, PlayMode, PlaybackState, RepeatMode};
pub use track::{Album, QueueItem, Track};
