use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::platform::MediaElement;

/// Upper bound on cached handles, whatever capacity is configured.
pub const MAX_CAPACITY: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Ready,
    Failed,
}

pub struct PreloadEntry {
    pub track_id: String,
    pub handle: Arc<dyn MediaElement>,
}

/// Bounded store of preloaded handles keyed by track id.
///
/// Eviction is strictly by insertion order: a FIFO of keys sits next to the
/// lookup map, and reading an entry never changes its position.
pub struct PreloadCache {
    entries: HashMap<String, PreloadEntry>,
    order: VecDeque<String>,
    capacity: usize,
}

impl PreloadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.clamp(1, MAX_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.entries.contains_key(track_id)
    }

    pub fn get(&self, track_id: &str) -> Option<&PreloadEntry> {
        self.entries.get(track_id)
    }

    /// Keys from oldest to newest insertion.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn oldest(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }

    pub fn over_capacity(&self) -> bool {
        self.len() > self.capacity
    }

    /// Inserts `entry`, then evicts oldest entries until the cache is back
    /// within capacity. Replacing an existing key releases the previous
    /// handle and keeps the key's original position. Returns the evicted ids.
    pub fn insert(&mut self, entry: PreloadEntry) -> Vec<String> {
        let key = entry.track_id.clone();
        match self.entries.insert(key.clone(), entry) {
            Some(previous) => previous.handle.release(),
            None => self.order.push_back(key),
        }
        self.trim()
    }

    /// Evicts oldest-inserted entries while over capacity.
    pub fn trim(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let Some(oldest) = self.oldest().map(str::to_string) else { break };
            self.evict(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    /// Drops the entry without releasing its handle.
    pub fn take(&mut self, track_id: &str) -> Option<Arc<dyn MediaElement>> {
        let entry = self.entries.remove(track_id)?;
        self.order.retain(|k| k != track_id);
        Some(entry.handle)
    }

    /// Releases the handle, then drops the entry. Returns whether anything
    /// was removed.
    pub fn evict(&mut self, track_id: &str) -> bool {
        let Some(entry) = self.entries.get(track_id) else {
            return false;
        };
        entry.handle.release();
        self.entries.remove(track_id);
        self.order.retain(|k| k != track_id);
        true
    }
}
