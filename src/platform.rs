//! Capability interfaces the engine consumes from its host.
//!
//! Everything the engine needs from the audio platform goes through these
//! traits: media elements that load and play a source, and a processing
//! platform that can attach a frequency transform to an element. They are
//! resolved once at startup and injected; [`NullAudioBackend`] and
//! [`NullAudioPlatform`] stand in where no audio capability exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PlatformError;

pub type ListenerId = u64;

/// Event callback registered on a [`MediaElement`].
pub type Listener = Arc<dyn Fn(&MediaEvent) + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Bytes (or seconds) loaded so far out of `total`; `total` is zero when
    /// unknown.
    Progress { loaded: f64, total: f64 },
    LoadedData,
    CanPlayThrough,
    Error(String),
    Play,
    Pause,
    Ended,
}

/// How much of the source an element can currently serve, in increasing
/// order of readiness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreloadHint {
    None,
    Metadata,
    #[default]
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossOrigin {
    Anonymous,
    UseCredentials,
}

/// Read access to the PCM an element is currently playing.
pub trait SampleTap: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Fills `out` with the mono samples that end at the playhead,
    /// zero-padded where the window reaches before the start.
    fn read_window(&self, out: &mut [f32]);
}

/// A loadable, playable audio handle.
pub trait MediaElement: Send + Sync {
    fn set_source(&self, url: &str);
    fn source(&self) -> Option<String>;
    fn set_preload(&self, hint: PreloadHint);
    fn set_cross_origin(&self, mode: CrossOrigin);
    fn ready_state(&self) -> ReadyState;

    fn play(&self);
    fn pause(&self);

    fn add_listener(&self, listener: Listener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Stops playback and frees decoded data and in-flight loads. The element
    /// stays valid but empty afterwards.
    fn release(&self);

    /// `None` when the platform refuses to expose samples, e.g. for a
    /// cross-origin source loaded without CORS.
    fn sample_tap(&self) -> Option<Arc<dyn SampleTap>>;
}

/// Creates media elements.
pub trait AudioBackend: Send + Sync {
    fn create_element(&self) -> Arc<dyn MediaElement>;
}

/// Parameters of the frequency transform inserted between an element and
/// the output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformSettings {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

/// A live analysis graph bound to one element.
pub trait AnalysisGraph: Send {
    fn sample_rate(&self) -> f32;
    fn frequency_bin_count(&self) -> usize;

    /// Writes the current magnitudes, scaled to 0–255, into `out`.
    fn byte_frequency_data(&mut self, out: &mut [u8]);

    fn set_max_decibels(&mut self, max_decibels: f32);

    /// Releases the native processing resources. Idempotent.
    fn close(&mut self);
}

/// Builds analysis graphs.
pub trait AudioPlatform: Send + Sync {
    fn create_graph(
        &self,
        element: &Arc<dyn MediaElement>,
        settings: &TransformSettings,
    ) -> Result<Box<dyn AnalysisGraph>, PlatformError>;
}

/// Identity comparison for element handles.
pub fn same_element(a: &Arc<dyn MediaElement>, b: &Arc<dyn MediaElement>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Listener registry shared by element implementations.
///
/// Dispatch clones the listener list before invoking it, so callbacks may add
/// or remove listeners while an event is being delivered.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &MediaEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Element for hosts without audio output. Any load attempt fails with an
/// error event.
#[derive(Default)]
pub struct NullElement {
    listeners: ListenerSet,
    source: Mutex<Option<String>>,
}

impl MediaElement for NullElement {
    fn set_source(&self, url: &str) {
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
        self.listeners
            .emit(&MediaEvent::Error("no audio backend available".to_string()));
    }

    fn source(&self) -> Option<String> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_preload(&self, _hint: PreloadHint) {}

    fn set_cross_origin(&self, _mode: CrossOrigin) {}

    fn ready_state(&self) -> ReadyState {
        ReadyState::HaveNothing
    }

    fn play(&self) {}

    fn pause(&self) {}

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn release(&self) {
        self.source.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn sample_tap(&self) -> Option<Arc<dyn SampleTap>> {
        None
    }
}

pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn create_element(&self) -> Arc<dyn MediaElement> {
        Arc::new(NullElement::default())
    }
}

pub struct NullAudioPlatform;

impl AudioPlatform for NullAudioPlatform {
    fn create_graph(
        &self,
        _element: &Arc<dyn MediaElement>,
        _settings: &TransformSettings,
    ) -> Result<Box<dyn AnalysisGraph>, PlatformError> {
        Err(PlatformError::Unsupported(
            "no audio processing capability on this host".to_string(),
        ))
    }
}
