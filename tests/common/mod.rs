//! Scripted capabilities shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use encore::catalog::Catalog;
use encore::error::{CatalogError, ResourceUnavailable};
use encore::health::{HttpProbe, ResourceChecker};
use encore::platform::{
    AudioBackend, CrossOrigin, Listener, ListenerId, ListenerSet, MediaElement, MediaEvent, PreloadHint, ReadyState,
    SampleTap,
};
use encore::queue::{QueueItem, Track};

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {}", id),
        album_id: "album-1".to_string(),
        source_url: Some(format!("https://cdn.test/{}.mp3", id)),
        lyric_url: None,
        mv_url: None,
        mv_cover_url: None,
        artists: vec!["Siren".to_string()],
    }
}

pub fn queue(ids: &[&str]) -> Vec<QueueItem> {
    ids.iter().map(|id| QueueItem::new(track(id))).collect()
}

#[derive(Default)]
pub struct ScriptedProbe {
    pub dead: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn kill(&self, url: &str) {
        self.dead.lock().unwrap().insert(url.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> Result<(), ResourceUnavailable> {
        self.calls.lock().unwrap().push(url.to_string());
        tokio::task::yield_now().await;
        if self.dead.lock().unwrap().contains(url) {
            Err(ResourceUnavailable::Status(404))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct MapCatalog {
    pub tracks: Mutex<HashMap<String, Track>>,
    pub lookups: AtomicUsize,
}

impl MapCatalog {
    pub fn put(&self, track: Track) {
        self.tracks.lock().unwrap().insert(track.id.clone(), track);
    }
}

#[async_trait]
impl Catalog for MapCatalog {
    async fn fetch_track_by_id(&self, id: &str) -> Result<Track, CatalogError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.tracks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::MissingData(format!("song/{}", id)))
    }
}

/// Element that finishes loading as soon as its source is set, unless the
/// url is marked broken.
pub struct ScriptedElement {
    pub listeners: ListenerSet,
    pub source: Mutex<Option<String>>,
    pub ready: Mutex<ReadyState>,
    pub playing: AtomicBool,
    pub released: AtomicUsize,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl ScriptedElement {
    /// Simulates the end of playback.
    pub fn finish(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.listeners.emit(&MediaEvent::Ended);
    }
}

impl MediaElement for ScriptedElement {
    fn set_source(&self, url: &str) {
        *self.source.lock().unwrap() = Some(url.to_string());
        if self.broken.lock().unwrap().contains(url) {
            self.listeners.emit(&MediaEvent::Error("MEDIA_ERR_SRC_NOT_SUPPORTED".into()));
            return;
        }
        self.listeners.emit(&MediaEvent::Progress { loaded: 50.0, total: 100.0 });
        self.listeners.emit(&MediaEvent::Progress { loaded: 100.0, total: 100.0 });
        *self.ready.lock().unwrap() = ReadyState::HaveEnoughData;
        self.listeners.emit(&MediaEvent::LoadedData);
        self.listeners.emit(&MediaEvent::CanPlayThrough);
    }

    fn source(&self) -> Option<String> {
        self.source.lock().unwrap().clone()
    }

    fn set_preload(&self, _hint: PreloadHint) {}

    fn set_cross_origin(&self, _mode: CrossOrigin) {}

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock().unwrap()
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
        self.listeners.emit(&MediaEvent::Play);
    }

    fn pause(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            self.listeners.emit(&MediaEvent::Pause);
        }
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn sample_tap(&self) -> Option<Arc<dyn SampleTap>> {
        None
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    pub broken: Arc<Mutex<HashSet<String>>>,
    pub created: Mutex<Vec<Arc<ScriptedElement>>>,
}

impl ScriptedBackend {
    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn element_for(&self, url: &str) -> Option<Arc<ScriptedElement>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.source().as_deref() == Some(url))
            .cloned()
    }
}

impl AudioBackend for ScriptedBackend {
    fn create_element(&self) -> Arc<dyn MediaElement> {
        let element = Arc::new(ScriptedElement {
            listeners: ListenerSet::new(),
            source: Mutex::new(None),
            ready: Mutex::new(ReadyState::HaveNothing),
            playing: AtomicBool::new(false),
            released: AtomicUsize::new(0),
            broken: Arc::clone(&self.broken),
        });
        self.created.lock().unwrap().push(Arc::clone(&element));
        element
    }
}

pub struct Harness {
    pub probe: Arc<ScriptedProbe>,
    pub catalog: Arc<MapCatalog>,
    pub backend: Arc<ScriptedBackend>,
    pub checker: ResourceChecker,
}

impl Harness {
    pub fn new() -> Self {
        let probe = Arc::new(ScriptedProbe::default());
        let catalog = Arc::new(MapCatalog::default());
        let backend = Arc::new(ScriptedBackend::default());
        let checker = ResourceChecker::new(probe.clone(), catalog.clone());
        Self {
            probe,
            catalog,
            backend,
            checker,
        }
    }
}
