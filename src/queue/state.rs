use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Loop the current track.
    Single,
    /// Wrap around at the end of the queue.
    All,
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "single" | "one" => Ok(RepeatMode::Single),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("unknown repeat mode '{}' (expected off, single or all)", other)),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepeatMode::Off => "off",
            RepeatMode::Single => "single",
            RepeatMode::All => "all",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayMode {
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

/// Playback position and mode.
///
/// `current_index` always points into the original queue. When shuffle is on
/// and the queue is non-empty, `shuffle_order` is a permutation of the queue
/// indices describing traversal order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_index: Option<usize>,
    pub is_playing: bool,
    pub play_mode: PlayMode,
    #[serde(default)]
    pub shuffle_order: Vec<usize>,
}

impl PlaybackState {
    /// Turns shuffle on or off for a queue of `queue_len` items.
    ///
    /// Enabling shuffle draws a fresh order with the current track first so
    /// the listener does not jump away from what is playing.
    pub fn set_shuffle<R: Rng + ?Sized>(&mut self, shuffle: bool, queue_len: usize, rng: &mut R) {
        self.play_mode.shuffle = shuffle;
        if shuffle {
            self.shuffle_order = shuffle_order(queue_len, self.current_index, rng);
        } else {
            self.shuffle_order.clear();
        }
    }

    /// Redraws the shuffle order after the queue itself changed.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, queue_len: usize, rng: &mut R) {
        if self.play_mode.shuffle {
            self.shuffle_order = shuffle_order(queue_len, self.current_index, rng);
        }
    }
}

/// Random permutation of `0..len`. `pin_first`, when in range, is moved to
/// the front.
pub fn shuffle_order<R: Rng + ?Sized>(len: usize, pin_first: Option<usize>, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    if let Some(first) = pin_first.filter(|&i| i < len) {
        if let Some(pos) = order.iter().position(|&i| i == first) {
            order.swap(0, pos);
        }
    }
    order
}

/// True when `order` contains every index of `0..len` exactly once.
pub fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in order {
        if i >= len || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_orders_are_permutations() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in 0..40 {
            for _ in 0..5 {
                let order = shuffle_order(len, None, &mut rng);
                assert!(is_permutation(&order, len), "len {} gave {:?}", len, order);
            }
        }
    }

    #[test]
    fn pinned_index_leads_the_order() {
        let mut rng = StdRng::seed_from_u64(11);
        for len in 1..20 {
            let pin = len / 2;
            let order = shuffle_order(len, Some(pin), &mut rng);
            assert_eq!(order[0], pin);
            assert!(is_permutation(&order, len));
        }
    }

    #[test]
    fn out_of_range_pin_is_ignored() {
        let mut rng = StdRng::seed_from_u64(3);
        let order = shuffle_order(4, Some(9), &mut rng);
        assert!(is_permutation(&order, 4));
    }

    #[test]
    fn is_permutation_rejects_duplicates_and_gaps() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
        assert!(!is_permutation(&[0, 1], 3));
    }

    #[test]
    fn toggling_shuffle_manages_order() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = PlaybackState {
            current_index: Some(2),
            ..Default::default()
        };
        state.set_shuffle(true, 5, &mut rng);
        assert!(state.play_mode.shuffle);
        assert_eq!(state.shuffle_order[0], 2);
        assert!(is_permutation(&state.shuffle_order, 5));

        state.set_shuffle(false, 5, &mut rng);
        assert!(!state.play_mode.shuffle);
        assert!(state.shuffle_order.is_empty());
    }

    #[test]
    fn repeat_mode_parses_case_insensitively() {
        assert_eq!("ALL".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert_eq!("single".parse::<RepeatMode>().unwrap(), RepeatMode::Single);
        assert!("loop".parse::<RepeatMode>().is_err());
    }
}
