//! Play-order resolution under shuffle and repeat policies.
//!
//! Both functions are pure and cheap enough to call on every state change.

use super::state::{PlaybackState, RepeatMode};

/// Queue position that plays after the current one, or `None` when playback
/// should stop.
pub fn next_index(queue_len: usize, state: &PlaybackState) -> Option<usize> {
    if queue_len == 0 {
        return None;
    }

    let mode = state.play_mode;
    if mode.repeat == RepeatMode::Single {
        return state.current_index;
    }

    if mode.shuffle && !state.shuffle_order.is_empty() {
        let order = &state.shuffle_order;
        let pos = state
            .current_index
            .and_then(|current| order.iter().position(|&i| i == current));
        return match pos {
            // Not in the order yet: start from its head.
            None => Some(order[0]),
            Some(p) if p + 1 < order.len() => Some(order[p + 1]),
            Some(_) if mode.repeat == RepeatMode::All => Some(order[0]),
            Some(_) => None,
        };
    }

    match state.current_index {
        None => Some(0),
        Some(i) if i + 1 < queue_len => Some(i + 1),
        Some(_) if mode.repeat == RepeatMode::All => Some(0),
        Some(_) => None,
    }
}

/// Queue position that played before the current one under the same rules,
/// walking backwards.
pub fn previous_index(queue_len: usize, state: &PlaybackState) -> Option<usize> {
    if queue_len == 0 {
        return None;
    }

    let mode = state.play_mode;
    if mode.repeat == RepeatMode::Single {
        return state.current_index;
    }

    if mode.shuffle && !state.shuffle_order.is_empty() {
        let order = &state.shuffle_order;
        let pos = state
            .current_index
            .and_then(|current| order.iter().position(|&i| i == current));
        return match pos {
            Some(p) if p > 0 => Some(order[p - 1]),
            Some(_) if mode.repeat == RepeatMode::All => order.last().copied(),
            _ => None,
        };
    }

    match state.current_index {
        Some(i) if i > 0 && i < queue_len => Some(i - 1),
        Some(i) if i >= queue_len => Some(queue_len - 1),
        Some(_) if mode.repeat == RepeatMode::All => Some(queue_len - 1),
        _ => None,
    }
}
