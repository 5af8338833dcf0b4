use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::platform::{
    CrossOrigin, Listener, ListenerId, ListenerSet, MediaElement, MediaEvent, PreloadHint, ReadyState, SampleTap,
};

use super::decode::{decode_bytes, AudioData};

const CLOCK_TICK: Duration = Duration::from_millis(20);

/// How an element's playhead moves while playing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clock {
    /// A tokio task advances the playhead in wall-clock time.
    Realtime,
    /// Only [`NativeElement::advance`] moves the playhead.
    Manual,
}

struct Playback {
    source: Option<String>,
    preload: PreloadHint,
    cross_origin: Option<CrossOrigin>,
    tainted: bool,
    ready: ReadyState,
    audio: Option<Arc<AudioData>>,
    /// Playhead as a sample index.
    position: usize,
    playing: bool,
    /// Bumped on every source change so stale loads are discarded.
    generation: u64,
    loader: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl Playback {
    fn cancel_tasks(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Headless media element: fetches a remote url or reads a local file,
/// decodes it fully and clocks a playhead over the PCM.
///
/// A remote source loaded without a cross-origin mode is tainted, and its
/// samples are not exposed through [`sample_tap`](MediaElement::sample_tap).
pub struct NativeElement {
    this: Weak<NativeElement>,
    client: reqwest::Client,
    clock: Clock,
    listeners: ListenerSet,
    state: Mutex<Playback>,
}

impl NativeElement {
    pub fn new(client: reqwest::Client, clock: Clock) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            client,
            clock,
            listeners: ListenerSet::new(),
            state: Mutex::new(Playback {
                source: None,
                preload: PreloadHint::default(),
                cross_origin: None,
                tainted: false,
                ready: ReadyState::HaveNothing,
                audio: None,
                position: 0,
                playing: false,
                generation: 0,
                loader: None,
                ticker: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Playback> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MediaEvent) {
        self.listeners.emit(&event);
    }

    pub fn duration(&self) -> Option<Duration> {
        self.lock()
            .audio
            .as_ref()
            .map(|a| Duration::from_secs_f32(a.duration_secs()))
    }

    pub fn position(&self) -> Duration {
        let st = self.lock();
        match st.audio.as_ref() {
            Some(a) if a.sample_rate > 0 => Duration::from_secs_f64(st.position as f64 / a.sample_rate as f64),
            _ => Duration::ZERO,
        }
    }

    /// Moves the playhead forward by `elapsed` while playing. Emits `Ended`
    /// on reaching the end. Returns whether playback continues.
    pub fn advance(&self, elapsed: Duration) -> bool {
        let ended = {
            let mut st = self.lock();
            if !st.playing {
                return false;
            }
            let Some(audio) = st.audio.clone() else {
                // still loading
                return true;
            };
            let step = (elapsed.as_secs_f64() * audio.sample_rate as f64) as usize;
            st.position = (st.position + step).min(audio.samples.len());
            if st.position >= audio.samples.len() {
                st.playing = false;
                st.ticker.take();
                true
            } else {
                false
            }
        };
        if ended {
            log::debug!("Playback reached the end of {}", self.source().unwrap_or_default());
            self.emit(MediaEvent::Ended);
        }
        !ended
    }

    /// Spawns the loader for the current source. Caller holds the state lock.
    fn begin_load(&self, st: &mut Playback) -> Result<(), String> {
        let Some(url) = st.source.clone() else {
            return Ok(());
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| "no async runtime available to load the source".to_string())?;

        let generation = st.generation;
        let weak = self.this.clone();
        let client = self.client.clone();
        st.loader = Some(runtime.spawn(async move {
            let result = load_source(&client, &url, |loaded, total| {
                if let Some(element) = weak.upgrade() {
                    element.emit(MediaEvent::Progress { loaded, total });
                }
            })
            .await;
            if let Some(element) = weak.upgrade() {
                element.finish_load(generation, result);
            }
        }));
        Ok(())
    }

    fn finish_load(&self, generation: u64, result: Result<AudioData>) {
        let failure = {
            let mut st = self.lock();
            if st.generation != generation {
                return;
            }
            st.loader = None;
            match result {
                Ok(audio) => {
                    st.audio = Some(Arc::new(audio));
                    st.ready = ReadyState::HaveEnoughData;
                    st.position = 0;
                    None
                }
                Err(err) => {
                    st.ready = ReadyState::HaveNothing;
                    Some(format!("{:#}", err))
                }
            }
        };

        match failure {
            None => {
                self.emit(MediaEvent::LoadedData);
                self.emit(MediaEvent::CanPlayThrough);
                self.ensure_clock();
            }
            Some(msg) => {
                log::warn!("Failed to load {}: {}", self.source().unwrap_or_default(), msg);
                self.emit(MediaEvent::Error(msg));
            }
        }
    }

    fn ensure_clock(&self) {
        if self.clock != Clock::Realtime {
            return;
        }
        let mut st = self.lock();
        if !st.playing || st.audio.is_none() || st.ticker.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak = self.this.clone();
        st.ticker = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(CLOCK_TICK);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(element) = weak.upgrade() else { break };
                if !element.advance(CLOCK_TICK) {
                    break;
                }
            }
        }));
    }
}

impl MediaElement for NativeElement {
    fn set_source(&self, url: &str) {
        let load_error = {
            let mut st = self.lock();
            st.cancel_tasks();
            st.generation += 1;
            st.source = Some(url.to_string());
            st.tainted = is_remote(url) && st.cross_origin.is_none();
            st.ready = ReadyState::HaveNothing;
            st.audio = None;
            st.position = 0;
            st.playing = false;
            if st.preload == PreloadHint::None {
                None
            } else {
                self.begin_load(&mut st).err()
            }
        };
        if let Some(msg) = load_error {
            self.emit(MediaEvent::Error(msg));
        }
    }

    fn source(&self) -> Option<String> {
        self.lock().source.clone()
    }

    fn set_preload(&self, hint: PreloadHint) {
        self.lock().preload = hint;
    }

    fn set_cross_origin(&self, mode: CrossOrigin) {
        self.lock().cross_origin = Some(mode);
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready
    }

    fn play(&self) {
        let load_error = {
            let mut st = self.lock();
            if st.playing || st.source.is_none() {
                return;
            }
            if let Some(len) = st.audio.as_ref().map(|a| a.samples.len()) {
                if st.position >= len {
                    st.position = 0;
                }
            }
            st.playing = true;
            if st.audio.is_none() && st.loader.is_none() {
                self.begin_load(&mut st).err()
            } else {
                None
            }
        };
        self.emit(MediaEvent::Play);
        if let Some(msg) = load_error {
            self.emit(MediaEvent::Error(msg));
        }
        self.ensure_clock();
    }

    fn pause(&self) {
        {
            let mut st = self.lock();
            if !st.playing {
                return;
            }
            st.playing = false;
            if let Some(ticker) = st.ticker.take() {
                ticker.abort();
            }
        }
        self.emit(MediaEvent::Pause);
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn release(&self) {
        let mut st = self.lock();
        st.cancel_tasks();
        st.generation += 1;
        st.source = None;
        st.tainted = false;
        st.audio = None;
        st.ready = ReadyState::HaveNothing;
        st.position = 0;
        st.playing = false;
    }

    fn sample_tap(&self) -> Option<Arc<dyn SampleTap>> {
        let st = self.lock();
        if st.tainted || st.audio.is_none() {
            return None;
        }
        Some(Arc::new(PlayheadTap {
            element: self.this.clone(),
        }))
    }
}

/// Reads the samples behind a [`NativeElement`]'s playhead.
struct PlayheadTap {
    element: Weak<NativeElement>,
}

impl SampleTap for PlayheadTap {
    fn sample_rate(&self) -> u32 {
        self.element
            .upgrade()
            .and_then(|e| e.lock().audio.as_ref().map(|a| a.sample_rate))
            .unwrap_or(0)
    }

    fn read_window(&self, out: &mut [f32]) {
        out.fill(0.0);
        let Some(element) = self.element.upgrade() else {
            return;
        };
        let st = element.lock();
        let Some(audio) = st.audio.as_ref() else {
            return;
        };
        let end = st.position.min(audio.samples.len());
        let start = end.saturating_sub(out.len());
        let window = &audio.samples[start..end];
        let offset = out.len() - window.len();
        out[offset..].copy_from_slice(window);
    }
}

pub(crate) fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn extension_of(url: &str) -> Option<String> {
    let path = if is_remote(url) {
        reqwest::Url::parse(url).ok()?.path().to_string()
    } else {
        url.to_string()
    };
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

async fn load_source(client: &reqwest::Client, url: &str, on_progress: impl Fn(f64, f64)) -> Result<AudioData> {
    let bytes = if is_remote(url) {
        let mut response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()?;
        let total = response.content_length().unwrap_or(0) as f64;
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
            on_progress(bytes.len() as f64, total);
        }
        bytes
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read audio file: {}", path))?;
        on_progress(bytes.len() as f64, bytes.len() as f64);
        bytes
    };

    let extension = extension_of(url);
    tokio::task::spawn_blocking(move || decode_bytes(bytes, extension.as_deref())).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn write_wav(dir: &Path, seconds: u32) -> String {
        let path = dir.join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..(8_000 * seconds) {
            writer.write_sample(((i % 64) as i16 - 32) * 500).unwrap();
        }
        writer.finalize().unwrap();
        path.to_string_lossy().into_owned()
    }

    fn events(element: &NativeElement) -> mpsc::UnboundedReceiver<MediaEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        element.add_listener(Arc::new(move |e: &MediaEvent| {
            let _ = tx.send(e.clone());
        }));
        rx
    }

    async fn wait_for(rx: &mut mpsc::UnboundedReceiver<MediaEvent>, want: MediaEvent) -> Vec<MediaEvent> {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = event == want || matches!(event, MediaEvent::Error(_));
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn loads_local_file_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 1);
        let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
        let mut rx = events(&element);

        element.set_source(&format!("file://{}", path));
        let seen = wait_for(&mut rx, MediaEvent::CanPlayThrough).await;

        assert!(matches!(seen[0], MediaEvent::Progress { .. }));
        assert!(seen.contains(&MediaEvent::LoadedData));
        assert_eq!(element.ready_state(), ReadyState::HaveEnoughData);
        assert_eq!(element.duration(), Some(Duration::from_secs(1)));
        assert!(element.sample_tap().is_some());
    }

    #[tokio::test]
    async fn manual_clock_plays_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 1);
        let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
        let mut rx = events(&element);
        element.set_source(&path);
        wait_for(&mut rx, MediaEvent::CanPlayThrough).await;

        element.play();
        assert_eq!(rx.recv().await, Some(MediaEvent::Play));
        assert!(element.advance(Duration::from_millis(500)));
        assert_eq!(element.position(), Duration::from_millis(500));

        let tap = element.sample_tap().unwrap();
        let mut window = vec![1.0f32; 16_000];
        tap.read_window(&mut window);
        // only half a second of audio sits behind the playhead
        assert!(window[..12_000].iter().all(|&s| s == 0.0));
        assert!(window[12_000..].iter().any(|&s| s != 0.0));

        assert!(!element.advance(Duration::from_millis(600)));
        assert_eq!(rx.recv().await, Some(MediaEvent::Ended));
        assert!(!element.advance(Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn preload_none_defers_until_play() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 1);
        let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
        let mut rx = events(&element);
        element.set_preload(PreloadHint::None);
        element.set_source(&path);
        assert_eq!(element.ready_state(), ReadyState::HaveNothing);

        element.play();
        let seen = wait_for(&mut rx, MediaEvent::CanPlayThrough).await;
        assert_eq!(seen[0], MediaEvent::Play);
        assert_eq!(seen.last(), Some(&MediaEvent::CanPlayThrough));
    }

    #[tokio::test]
    async fn missing_file_emits_error() {
        let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
        let mut rx = events(&element);
        element.set_source("/nonexistent/encore/missing.mp3");
        let seen = wait_for(&mut rx, MediaEvent::CanPlayThrough).await;
        assert!(matches!(seen.last(), Some(MediaEvent::Error(_))));
        assert!(element.sample_tap().is_none());
    }

    #[tokio::test]
    async fn release_empties_the_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 1);
        let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
        let mut rx = events(&element);
        element.set_source(&path);
        wait_for(&mut rx, MediaEvent::CanPlayThrough).await;

        element.release();
        assert_eq!(element.source(), None);
        assert_eq!(element.ready_state(), ReadyState::HaveNothing);
        assert!(element.sample_tap().is_none());
    }

    #[test]
    fn extension_ignores_query_string() {
        assert_eq!(extension_of("https://cdn.example.com/a/b.MP3?x=1").as_deref(), Some("mp3"));
        assert_eq!(extension_of("/music/track.flac").as_deref(), Some("flac"));
        assert_eq!(extension_of("https://cdn.example.com/stream"), None);
    }
}
