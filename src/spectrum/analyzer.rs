use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{AnalyzerFault, FaultKind, PlatformError};
use crate::platform::{
    same_element, AnalysisGraph, AudioPlatform, ListenerId, MediaElement, MediaEvent, ReadyState,
    TransformSettings,
};

use super::bands::{compute_frame, BandConfig};

/// Transform size; 1024 magnitude bins.
pub const FFT_SIZE: usize = 2048;
pub const MIN_DECIBELS: f32 = -100.0;
/// Roughly one display refresh.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Bar heights for one frame, each in `[0, 100]`.
pub type SpectrumFrame = Vec<f32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyzerState {
    Uninitialized,
    Initialized,
    Analyzing,
    Stopped,
    Error,
}

/// Who advances frames while analysing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDriver {
    /// A tokio interval task renders frames on its own.
    Timer(Duration),
    /// The host calls [`SpectrumAnalyzer::render_frame`] itself.
    Manual,
}

struct Inner {
    state: AnalyzerState,
    fault: Option<AnalyzerFault>,
    config: BandConfig,
    element: Option<Arc<dyn MediaElement>>,
    listener: Option<ListenerId>,
    /// Bumped on every bind and unbind. Listeners carry the value they were
    /// registered under and ignore events once it moves on.
    binding: u64,
    /// The element started playing before its graph existed.
    play_pending: bool,
    graph: Option<Box<dyn AnalysisGraph>>,
    bins: Vec<u8>,
    bars: SpectrumFrame,
    ticker: Option<JoinHandle<()>>,
}

struct Shared {
    platform: Arc<dyn AudioPlatform>,
    driver: FrameDriver,
    inner: Mutex<Inner>,
    frames: watch::Sender<SpectrumFrame>,
}

/// Live spectrum analyzer bound to the element that is currently playing.
///
/// Cloning yields another handle to the same analyzer. Faults are recorded
/// and exposed through [`error`](Self::error); no call here fails outward,
/// and a broken analysis never affects playback of the bound element.
#[derive(Clone)]
pub struct SpectrumAnalyzer {
    shared: Arc<Shared>,
}

impl SpectrumAnalyzer {
    pub fn new(platform: Arc<dyn AudioPlatform>, config: BandConfig) -> Self {
        Self::with_driver(platform, config, FrameDriver::Timer(FRAME_INTERVAL))
    }

    pub fn with_driver(platform: Arc<dyn AudioPlatform>, config: BandConfig, driver: FrameDriver) -> Self {
        let bars = vec![0.0; config.band_count];
        let (frames, _) = watch::channel(bars.clone());
        log::debug!("Spectrum analyzer created with {} bands", config.band_count);
        Self {
            shared: Arc::new(Shared {
                platform,
                driver,
                inner: Mutex::new(Inner {
                    state: AnalyzerState::Uninitialized,
                    fault: None,
                    config,
                    element: None,
                    listener: None,
                    binding: 0,
                    play_pending: false,
                    graph: None,
                    bins: Vec::new(),
                    bars,
                    ticker: None,
                }),
                frames,
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds to `element`. Rebinding the same element is a no-op.
    ///
    /// The graph is built as soon as the element has current data; until
    /// then a `LoadedData`/`CanPlayThrough` event triggers it. Play, pause
    /// and end of the element drive analysis from then on.
    pub fn connect_audio(&self, element: Arc<dyn MediaElement>) {
        if let Some(current) = self.lock().element.as_ref() {
            if same_element(current, &element) {
                log::debug!("Analyzer already bound to this element");
                return;
            }
        }

        self.disconnect_audio();

        let binding = {
            let mut inner = self.lock();
            inner.binding += 1;
            inner.binding
        };
        let weak = Arc::downgrade(&self.shared);
        let listener = element.add_listener(Arc::new(move |event: &MediaEvent| {
            let Some(analyzer) = Self::from_weak(&weak) else {
                return;
            };
            if analyzer.lock().binding != binding {
                return;
            }
            match event {
                MediaEvent::LoadedData | MediaEvent::CanPlayThrough => analyzer.initialize_graph(),
                MediaEvent::Play => analyzer.on_play(),
                MediaEvent::Pause | MediaEvent::Ended => {
                    analyzer.lock().play_pending = false;
                    analyzer.stop_analysis();
                }
                MediaEvent::Error(detail) => analyzer.record_decode_error(detail),
                MediaEvent::Progress { .. } => {}
            }
        }));

        {
            let mut inner = self.lock();
            inner.element = Some(Arc::clone(&element));
            inner.listener = Some(listener);
            inner.fault = None;
        }
        log::info!("Analyzer bound to {}", element.source().unwrap_or_else(|| "<no source>".into()));

        if element.ready_state() >= ReadyState::HaveCurrentData {
            self.initialize_graph();
        }
    }

    fn on_play(&self) {
        {
            let mut inner = self.lock();
            if inner.state == AnalyzerState::Uninitialized && inner.graph.is_none() && inner.fault.is_none() {
                inner.play_pending = true;
                return;
            }
        }
        self.start_analysis();
    }

    fn initialize_graph(&self) {
        let mut inner = self.lock();
        if inner.graph.is_some() {
            return;
        }
        let Some(element) = inner.element.clone() else {
            return;
        };

        let settings = TransformSettings {
            fft_size: FFT_SIZE,
            smoothing: inner.config.smoothing,
            min_decibels: MIN_DECIBELS,
            max_decibels: inner.config.max_decibels,
        };
        match self.shared.platform.create_graph(&element, &settings) {
            Ok(graph) => {
                log::info!(
                    "Analysis graph ready: {} bins at {} Hz ({:.1} Hz/bin)",
                    graph.frequency_bin_count(),
                    graph.sample_rate(),
                    graph.sample_rate() / FFT_SIZE as f32
                );
                inner.bins = vec![0; graph.frequency_bin_count()];
                inner.graph = Some(graph);
                inner.state = AnalyzerState::Initialized;
                inner.fault = None;
                if std::mem::take(&mut inner.play_pending) {
                    drop(inner);
                    self.start_analysis();
                }
            }
            Err(err) => {
                log::warn!("Spectrum analysis disabled: {}", err);
                if let PlatformError::CorsBlocked(_) = err {
                    inner.state = AnalyzerState::Error;
                }
                inner.fault = Some(AnalyzerFault::from(&err));
            }
        }
    }

    fn record_decode_error(&self, detail: &str) {
        log::warn!("Bound element reported an error: {}", detail);
        self.stop_analysis();
        let mut inner = self.lock();
        inner.state = AnalyzerState::Error;
        inner.fault = Some(AnalyzerFault::new(FaultKind::DecodeError, detail));
    }

    /// Enters `Analyzing` from `Initialized` or `Stopped` and starts the
    /// frame loop. Ignored in any other state.
    pub fn start_analysis(&self) {
        let mut inner = self.lock();
        if !matches!(inner.state, AnalyzerState::Initialized | AnalyzerState::Stopped) || inner.graph.is_none() {
            log::debug!("Cannot start analysis in state {:?}", inner.state);
            return;
        }
        inner.state = AnalyzerState::Analyzing;
        log::debug!("Spectrum analysis started");

        if let FrameDriver::Timer(period) = self.shared.driver {
            if let Some(ticker) = inner.ticker.take() {
                ticker.abort();
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let weak = Arc::downgrade(&self.shared);
                    inner.ticker = Some(runtime.spawn(async move {
                        let mut interval = tokio::time::interval(period);
                        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                        loop {
                            interval.tick().await;
                            let Some(analyzer) = Self::from_weak(&weak) else {
                                break;
                            };
                            if !analyzer.render_frame() {
                                break;
                            }
                        }
                    }));
                }
                Err(_) => log::warn!("No async runtime, frames must be rendered manually"),
            }
        }
    }

    /// Computes one frame from the live graph and publishes it. Returns
    /// `false` when the analyzer is not analysing.
    pub fn render_frame(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state != AnalyzerState::Analyzing {
            return false;
        }
        let Some(graph) = inner.graph.as_mut() else {
            return false;
        };
        graph.byte_frequency_data(&mut inner.bins);
        compute_frame(&inner.bins, graph.sample_rate(), &inner.config, &mut inner.bars);
        self.shared.frames.send_replace(inner.bars.clone());
        true
    }

    /// Cancels the frame loop and zeroes every bar.
    pub fn stop_analysis(&self) {
        let mut inner = self.lock();
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
        if inner.state == AnalyzerState::Analyzing {
            inner.state = AnalyzerState::Stopped;
            log::debug!("Spectrum analysis stopped");
        }
        inner.bars.iter_mut().for_each(|v| *v = 0.0);
        self.shared.frames.send_replace(inner.bars.clone());
    }

    /// Unbinds from the current element and closes the analysis graph.
    pub fn disconnect_audio(&self) {
        let (element, listener) = {
            let mut inner = self.lock();
            inner.binding += 1;
            (inner.element.take(), inner.listener.take())
        };
        if let (Some(element), Some(id)) = (element.as_ref(), listener) {
            element.remove_listener(id);
        }

        self.stop_analysis();

        let mut inner = self.lock();
        if let Some(mut graph) = inner.graph.take() {
            graph.close();
            log::debug!("Analysis graph closed");
        }
        inner.bins.clear();
        inner.play_pending = false;
        inner.state = AnalyzerState::Uninitialized;
        inner.fault = None;
    }

    /// Updates band boosts and optionally the threshold and transform
    /// ceiling; a new ceiling goes straight into the live graph.
    pub fn update_enhancement(&self, bass: f32, mid: f32, treble: f32, threshold: Option<f32>, max_decibels: Option<f32>) {
        let mut inner = self.lock();
        inner.config.bass_boost = bass;
        inner.config.mid_boost = mid;
        inner.config.treble_boost = treble;
        if let Some(threshold) = threshold {
            inner.config.loudness_threshold = threshold;
        }
        if let Some(db) = max_decibels {
            inner.config.max_decibels = db;
            if let Some(graph) = inner.graph.as_mut() {
                graph.set_max_decibels(db);
            }
        }
        log::debug!(
            "Enhancement updated: bass={} mid={} treble={} threshold={} max_db={}",
            bass,
            mid,
            treble,
            inner.config.loudness_threshold,
            inner.config.max_decibels
        );
    }

    pub fn set_threshold(&self, threshold: f32) {
        let mut inner = self.lock();
        inner.config.loudness_threshold = threshold.clamp(0.0, 255.0);
    }

    pub fn set_max_decibels(&self, max_decibels: f32) {
        let mut inner = self.lock();
        let db = max_decibels.clamp(MIN_DECIBELS, 0.0);
        inner.config.max_decibels = db;
        if let Some(graph) = inner.graph.as_mut() {
            graph.set_max_decibels(db);
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.lock().state
    }

    pub fn error(&self) -> Option<AnalyzerFault> {
        self.lock().fault.clone()
    }

    pub fn config(&self) -> BandConfig {
        self.lock().config.clone()
    }

    pub fn bar_heights(&self) -> SpectrumFrame {
        self.lock().bars.clone()
    }

    /// Receives every published frame; the latest frame replaces the
    /// previous one.
    pub fn subscribe(&self) -> watch::Receiver<SpectrumFrame> {
        self.shared.frames.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakeElement, FakeMode, FakePlatform};
    use crate::platform::NullAudioPlatform;
    use std::sync::atomic::Ordering;

    fn manual(platform: Arc<dyn AudioPlatform>, config: BandConfig) -> SpectrumAnalyzer {
        SpectrumAnalyzer::with_driver(platform, config, FrameDriver::Manual)
    }

    #[test]
    fn same_element_registers_listener_once() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform.clone(), BandConfig::default());
        let element = FakeElement::ready();

        analyzer.connect_audio(element.clone());
        analyzer.connect_audio(element.clone());

        assert_eq!(element.listeners.len(), 1);
        assert_eq!(platform.graphs_built.load(Ordering::SeqCst), 1);
        assert_eq!(analyzer.state(), AnalyzerState::Initialized);
    }

    #[test]
    fn graph_waits_for_loaded_data() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform.clone(), BandConfig::default());
        let element = Arc::new(FakeElement::default());

        analyzer.connect_audio(element.clone());
        assert_eq!(analyzer.state(), AnalyzerState::Uninitialized);

        element.set_ready(ReadyState::HaveCurrentData);
        element.emit(MediaEvent::LoadedData);
        assert_eq!(analyzer.state(), AnalyzerState::Initialized);
        element.emit(MediaEvent::CanPlayThrough);
        assert_eq!(platform.graphs_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn play_pause_drive_analysis() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![255; 1024]));
        let analyzer = manual(platform, BandConfig::default());
        let element = FakeElement::ready();
        analyzer.connect_audio(element.clone());

        assert!(!analyzer.render_frame());
        element.play();
        assert_eq!(analyzer.state(), AnalyzerState::Analyzing);
        assert!(analyzer.render_frame());
        let bars = analyzer.bar_heights();
        assert_eq!(bars.len(), 4);
        assert!(bars.iter().all(|&v| v > 0.0 && v <= 100.0));
        assert_eq!(*analyzer.subscribe().borrow(), bars);

        element.pause();
        assert_eq!(analyzer.state(), AnalyzerState::Stopped);
        assert!(analyzer.bar_heights().iter().all(|&v| v == 0.0));

        element.play();
        assert_eq!(analyzer.state(), AnalyzerState::Analyzing);
        element.emit(MediaEvent::Ended);
        assert_eq!(analyzer.state(), AnalyzerState::Stopped);
    }

    #[test]
    fn play_before_data_starts_once_graph_exists() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![255; 1024]));
        let analyzer = manual(platform, BandConfig::default());
        let element = Arc::new(FakeElement::default());
        analyzer.connect_audio(element.clone());

        element.play();
        assert_eq!(analyzer.state(), AnalyzerState::Uninitialized);
        element.set_ready(ReadyState::HaveEnoughData);
        element.emit(MediaEvent::LoadedData);
        assert_eq!(analyzer.state(), AnalyzerState::Analyzing);
    }

    #[test]
    fn start_requires_initialized_graph() {
        let analyzer = manual(Arc::new(NullAudioPlatform), BandConfig::default());
        analyzer.start_analysis();
        assert_eq!(analyzer.state(), AnalyzerState::Uninitialized);
    }

    #[test]
    fn cors_refusal_moves_to_error() {
        let platform = FakePlatform::new(FakeMode::Cors);
        let analyzer = manual(platform, BandConfig::default());
        let element = FakeElement::ready();
        analyzer.connect_audio(element.clone());

        assert_eq!(analyzer.state(), AnalyzerState::Error);
        assert_eq!(analyzer.error().map(|f| f.kind), Some(FaultKind::CorsBlocked));
        element.play();
        assert_eq!(analyzer.state(), AnalyzerState::Error);
        assert!(analyzer.bar_heights().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_capability_stays_uninitialized() {
        let analyzer = manual(Arc::new(NullAudioPlatform), BandConfig::default());
        analyzer.connect_audio(FakeElement::ready());
        assert_eq!(analyzer.state(), AnalyzerState::Uninitialized);
        assert_eq!(analyzer.error().map(|f| f.kind), Some(FaultKind::InitFailure));
    }

    #[test]
    fn element_error_is_surfaced_as_decode_fault() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform, BandConfig::default());
        let element = FakeElement::ready();
        analyzer.connect_audio(element.clone());
        element.emit(MediaEvent::Error("MEDIA_ERR_DECODE".into()));

        assert_eq!(analyzer.state(), AnalyzerState::Error);
        let fault = analyzer.error().unwrap();
        assert_eq!(fault.kind, FaultKind::DecodeError);
        assert_eq!(fault.detail, "MEDIA_ERR_DECODE");
    }

    #[test]
    fn rebinding_releases_previous_element() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform.clone(), BandConfig::default());
        let first = FakeElement::ready();
        let second = FakeElement::ready();

        analyzer.connect_audio(first.clone());
        analyzer.connect_audio(second.clone());

        assert_eq!(first.listeners.len(), 0);
        assert_eq!(second.listeners.len(), 1);
        assert_eq!(platform.closed.load(Ordering::SeqCst), 1);
        assert_eq!(platform.graphs_built.load(Ordering::SeqCst), 2);

        // events from the old element no longer reach the analyzer
        first.play();
        assert_eq!(analyzer.state(), AnalyzerState::Initialized);
    }

    #[test]
    fn disconnect_closes_graph_and_resets() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform.clone(), BandConfig::default());
        let element = FakeElement::ready();
        analyzer.connect_audio(element.clone());
        element.play();

        analyzer.disconnect_audio();
        assert_eq!(analyzer.state(), AnalyzerState::Uninitialized);
        assert_eq!(element.listeners.len(), 0);
        assert_eq!(platform.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ceiling_update_reaches_live_graph() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![0; 1024]));
        let analyzer = manual(platform.clone(), BandConfig::default());
        analyzer.connect_audio(FakeElement::ready());
        assert_eq!(*platform.max_decibels.lock().unwrap(), -10.0);

        analyzer.update_enhancement(1.0, 1.0, 1.0, Some(20.0), Some(-30.0));
        assert_eq!(*platform.max_decibels.lock().unwrap(), -30.0);
        let config = analyzer.config();
        assert_eq!(config.loudness_threshold, 20.0);
        assert_eq!(config.bass_boost, 1.0);

        analyzer.set_max_decibels(12.0);
        assert_eq!(*platform.max_decibels.lock().unwrap(), 0.0);
        analyzer.set_threshold(400.0);
        assert_eq!(analyzer.config().loudness_threshold, 255.0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_driver_renders_until_stopped() {
        let platform = FakePlatform::new(FakeMode::Fixed(vec![255; 1024]));
        let analyzer = SpectrumAnalyzer::new(platform, BandConfig::default());
        let element = FakeElement::ready();
        analyzer.connect_audio(element.clone());
        let mut frames = analyzer.subscribe();

        element.play();
        frames.changed().await.unwrap();
        assert!(frames.borrow_and_update().iter().all(|&v| v > 0.0));

        element.pause();
        assert!(analyzer.bar_heights().iter().all(|&v| v == 0.0));
        tokio::time::sleep(FRAME_INTERVAL * 4).await;
        assert!(analyzer.bar_heights().iter().all(|&v| v == 0.0));
    }
}
