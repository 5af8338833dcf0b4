//! Playback coordinator tying the queue, preloading and analysis together.
//!
//! The engine owns the queue and playback state in a `watch` channel. Every
//! change is published to subscribers; a preload watcher debounces those
//! changes and preloads whatever track plays next. Whenever the active track
//! changes the spectrum analyzer is rebound to the new element.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::debounce::Debouncer;
use crate::platform::{AudioBackend, CrossOrigin, ListenerId, MediaElement, MediaEvent};
use crate::preload::{PreloadManager, PreloadOutcome};
use crate::queue::{next_index, previous_index, PlayMode, PlaybackState, QueueItem, Track};
use crate::spectrum::SpectrumAnalyzer;

/// Queue and playback state as one published value.
#[derive(Clone, Debug, Default)]
pub struct PlayerSnapshot {
    pub queue: Vec<QueueItem>,
    pub playback: PlaybackState,
}

impl PlayerSnapshot {
    pub fn current(&self) -> Option<&QueueItem> {
        self.playback.current_index.and_then(|i| self.queue.get(i))
    }

    /// Queue position and id of the track that plays next.
    fn upcoming(&self) -> Option<(usize, String)> {
        let index = next_index(self.queue.len(), &self.playback)?;
        self.queue.get(index).map(|item| (index, item.track.id.clone()))
    }
}

struct Active {
    track_id: String,
    element: Arc<dyn MediaElement>,
    listener: ListenerId,
}

pub struct PlaybackEngine {
    this: Weak<PlaybackEngine>,
    state: watch::Sender<PlayerSnapshot>,
    refreshed: broadcast::Sender<Track>,
    preload: Arc<PreloadManager>,
    analyzer: SpectrumAnalyzer,
    backend: Arc<dyn AudioBackend>,
    active: Mutex<Option<Active>>,
    debouncer: Debouncer,
}

impl PlaybackEngine {
    pub fn new(
        preload: Arc<PreloadManager>,
        analyzer: SpectrumAnalyzer,
        backend: Arc<dyn AudioBackend>,
        debounce: Duration,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(PlayerSnapshot::default());
        let (refreshed, _) = broadcast::channel(16);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state,
            refreshed,
            preload,
            analyzer,
            backend,
            active: Mutex::new(None),
            debouncer: Debouncer::new(debounce),
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<Active>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn preload(&self) -> &Arc<PreloadManager> {
        &self.preload
    }

    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.state.subscribe()
    }

    /// Receives every track record the health checker replaced.
    pub fn subscribe_refreshed(&self) -> broadcast::Receiver<Track> {
        self.refreshed.subscribe()
    }

    /// Replaces the queue. A shuffle order is regenerated for the new length
    /// with `current` pinned first.
    pub fn set_queue(&self, queue: Vec<QueueItem>, current: Option<usize>) {
        let current = current.filter(|&i| i < queue.len());
        let mut rng = rand::rng();
        self.state.send_modify(|s| {
            s.queue = queue;
            s.playback.current_index = current;
            if s.playback.play_mode.shuffle {
                s.playback.reshuffle(s.queue.len(), &mut rng);
            }
        });
        log::info!("Queue replaced ({} tracks)", self.state.borrow().queue.len());
    }

    pub fn set_play_mode(&self, mode: PlayMode) {
        let mut rng = rand::rng();
        self.state.send_modify(|s| {
            let len = s.queue.len();
            s.playback.play_mode.repeat = mode.repeat;
            if s.playback.play_mode.shuffle != mode.shuffle {
                s.playback.set_shuffle(mode.shuffle, len, &mut rng);
            }
        });
        log::debug!("Play mode: shuffle={} repeat={}", mode.shuffle, mode.repeat);
    }

    pub fn next_index(&self) -> Option<usize> {
        let s = self.state.borrow();
        next_index(s.queue.len(), &s.playback)
    }

    /// Preloads the upcoming track. A refreshed record is patched into the
    /// queue when the slot still holds the same track, and broadcast.
    pub async fn preload_next(&self) -> PreloadOutcome {
        let snapshot = self.snapshot();
        self.preload
            .preload_next(&snapshot.queue, &snapshot.playback, |index, fresh| self.apply_refresh(index, fresh))
            .await
    }

    fn apply_refresh(&self, index: usize, fresh: &Track) {
        self.state.send_if_modified(|s| match s.queue.get_mut(index) {
            Some(item) if item.track.id == fresh.id => {
                item.track = fresh.clone();
                true
            }
            _ => false,
        });
        // no receivers is fine
        let _ = self.refreshed.send(fresh.clone());
    }

    /// Starts `index`, reusing its preloaded element when one is cached.
    /// A reused element leaves the preload cache, so later evictions cannot
    /// release it mid-playback. Returns `false` when the index is out of
    /// range or has no source.
    pub fn play_index(&self, index: usize) -> bool {
        let Some(track) = self.state.borrow().queue.get(index).map(|item| item.track.clone()) else {
            return false;
        };
        let Some(url) = track.source_url.as_deref() else {
            log::warn!("Cannot play {}: no source url", track.title);
            return false;
        };

        self.detach_active();

        let element = match self.preload.take_preloaded_audio(&track.id) {
            Some(element) => {
                log::debug!("Using preloaded audio for {}", track.title);
                element
            }
            None => {
                let element = self.backend.create_element();
                element.set_cross_origin(CrossOrigin::Anonymous);
                element.set_source(url);
                element
            }
        };

        let weak = self.this.clone();
        let listener = element.add_listener(Arc::new(move |event: &MediaEvent| {
            let Some(engine) = weak.upgrade() else { return };
            match event {
                MediaEvent::Ended => engine.advance(),
                MediaEvent::Play => engine.set_playing(true),
                MediaEvent::Pause => engine.set_playing(false),
                MediaEvent::Error(msg) => {
                    log::warn!("Playback failed: {}", msg);
                    engine.set_playing(false);
                }
                _ => {}
            }
        }));
        *self.active() = Some(Active {
            track_id: track.id.clone(),
            element: Arc::clone(&element),
            listener,
        });

        self.state.send_modify(|s| {
            s.playback.current_index = Some(index);
        });
        log::info!("Playing [{}] {} - {}", index, track.title, track.artist_line());

        self.analyzer.connect_audio(Arc::clone(&element));
        element.play();
        true
    }

    fn detach_active(&self) {
        let Some(previous) = self.active().take() else { return };
        previous.element.remove_listener(previous.listener);
        previous.element.pause();
        previous.element.release();
    }

    /// Id of the upcoming track when it is the one already playing, as
    /// under repeat single.
    fn upcoming_if_active(&self) -> Option<String> {
        let (_, id) = self.state.borrow().upcoming()?;
        let playing = self.active().as_ref().is_some_and(|a| a.track_id == id);
        playing.then_some(id)
    }

    fn set_playing(&self, playing: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.playback.is_playing != playing;
            s.playback.is_playing = playing;
            changed
        });
    }

    pub fn pause(&self) {
        if let Some(active) = self.active().as_ref() {
            active.element.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(active) = self.active().as_ref() {
            active.element.play();
        }
    }

    pub fn play_next(&self) -> bool {
        match self.next_index() {
            Some(index) => self.play_index(index),
            None => false,
        }
    }

    pub fn play_previous(&self) -> bool {
        let index = {
            let s = self.state.borrow();
            previous_index(s.queue.len(), &s.playback)
        };
        match index {
            Some(index) => self.play_index(index),
            None => false,
        }
    }

    /// Handles the end of the active track: any preload entry left for it is
    /// cleared and the next track starts, or playback stops at the end of
    /// the queue.
    fn advance(&self) {
        let finished = self.active().as_ref().map(|a| a.track_id.clone());
        if let Some(track_id) = finished.as_deref() {
            self.preload.clear_preloaded_audio(track_id);
        }
        if !self.play_next() {
            log::info!("Reached the end of the queue");
            self.detach_active();
            self.set_playing(false);
        }
    }

    pub fn stop(&self) {
        self.detach_active();
        self.analyzer.disconnect_audio();
        self.set_playing(false);
    }

    /// Watches state changes and preloads the upcoming track once changes
    /// settle. Changes that leave the upcoming track as it was are ignored,
    /// and so is an upcoming track that is already playing (repeat single).
    pub fn spawn_preload_watcher(&self) -> JoinHandle<()> {
        let mut rx = self.state.subscribe();
        let weak = self.this.clone();
        tokio::spawn(async move {
            let mut last = None;
            loop {
                let upcoming = rx.borrow_and_update().upcoming();
                if upcoming.is_some() && upcoming != last {
                    let Some(engine) = weak.upgrade() else { break };
                    let target = weak.clone();
                    engine.debouncer.schedule(move || {
                        let Some(engine) = target.upgrade() else { return };
                        if let Some(id) = engine.upcoming_if_active() {
                            log::debug!("Next track {} is already playing, not preloading", id);
                            return;
                        }
                        tokio::spawn(async move {
                            let outcome = engine.preload_next().await;
                            log::debug!("Preload finished: {:?}", outcome);
                        });
                    });
                }
                last = upcoming;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Some(active) = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            active.element.remove_listener(active.listener);
            active.element.release();
        }
    }
}
