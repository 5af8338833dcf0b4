mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Command, PlayArgs, QueueArgs, SpectrumArgs};
use encore::audio::{Clock, NativeAudioBackend, NativeAudioPlatform, NativeElement};
use encore::catalog::CatalogClient;
use encore::config::{self, Config};
use encore::health::{ReqwestProbe, ResourceChecker};
use encore::platform::{AudioBackend, MediaElement, MediaEvent};
use encore::preload::{PreloadManager, PreloadOutcome};
use encore::queue::{next_index, PlayMode, PlaybackState, QueueItem, Track};
use encore::spectrum::{FrameDriver, SpectrumAnalyzer};
use encore::PlaybackEngine;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    if let Some(url) = cli.base_url.clone() {
        cfg.catalog.base_url = url;
    }
    if let Some(ms) = cli.timeout_ms {
        cfg.health.timeout_ms = ms;
    }

    match cli.command {
        Command::Next(args) => run_next(&args),
        Command::Check { queue, output } => run_check(&cfg, &queue, output.as_deref()).await,
        Command::Preload(args) => run_preload(&cfg, &args).await,
        Command::Play(args) => run_play(&cfg, &args).await,
        Command::Spectrum(args) => run_spectrum(cfg, &args).await,
        Command::Songs => run_songs(&cfg).await,
        Command::Album { id } => run_album(&cfg, &id).await,
    }
}

fn read_queue(path: &Path) -> Result<Vec<Track>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read queue file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid queue file: {}", path.display()))
}

fn playback_state(args: &QueueArgs, len: usize) -> PlaybackState {
    let mut state = PlaybackState {
        current_index: args.current.filter(|&i| i < len),
        ..Default::default()
    };
    state.play_mode = PlayMode {
        shuffle: false,
        repeat: args.repeat,
    };
    state.set_shuffle(args.shuffle, len, &mut rand::rng());
    state
}

fn checker(cfg: &Config) -> Result<ResourceChecker> {
    let probe = ReqwestProbe::new(cfg.health.timeout()).context("Failed to build HTTP client")?;
    let catalog = CatalogClient::new(&cfg.catalog.base_url)?;
    Ok(ResourceChecker::new(Arc::new(probe), Arc::new(catalog)))
}

fn run_next(args: &QueueArgs) -> Result<()> {
    let tracks = read_queue(&args.queue)?;
    let state = playback_state(args, tracks.len());
    if state.play_mode.shuffle {
        log::info!("Shuffle order: {:?}", state.shuffle_order);
    }
    match next_index(tracks.len(), &state) {
        Some(index) => {
            let track = &tracks[index];
            println!("{}\t{}\t{}", index, track.title, track.artist_line());
        }
        None => println!("-1\t(end of queue)"),
    }
    Ok(())
}

async fn run_check(cfg: &Config, queue: &Path, output: Option<&Path>) -> Result<()> {
    let tracks = read_queue(queue)?;
    let checker = checker(cfg)?;
    log::info!("Checking {} tracks", tracks.len());

    let mut refreshed = 0;
    let checked = checker
        .check_and_refresh_all(&tracks, |index, track| {
            refreshed += 1;
            println!("refreshed [{}] {}", index, track.title);
        })
        .await;
    log::info!("{} of {} tracks refreshed", refreshed, checked.len());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&checked)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote refreshed queue to {}", path.display());
    }
    Ok(())
}

async fn run_preload(cfg: &Config, args: &QueueArgs) -> Result<()> {
    let tracks = read_queue(&args.queue)?;
    let state = playback_state(args, tracks.len());
    let queue: Vec<QueueItem> = tracks.into_iter().map(QueueItem::new).collect();

    let backend = Arc::new(NativeAudioBackend::new(reqwest::Client::new()));
    let manager = PreloadManager::new(checker(cfg)?, backend, cfg.preload.capacity);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("=>-"),
    );
    let mut progress = manager.subscribe_progress();
    let bar = pb.clone();
    let ticker = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let pos = *progress.borrow_and_update();
            bar.set_position(pos as u64);
        }
    });

    let outcome = manager
        .preload_next(&queue, &state, |index, track| {
            pb.println(format!("refreshed [{}] {}", index, track.title));
        })
        .await;
    ticker.abort();

    match &outcome {
        PreloadOutcome::Loaded { index, track_id } => {
            pb.finish_with_message(format!("track {} ready", track_id));
            let cached = manager.get_preloaded_audio(track_id).map(|e| e.ready_state());
            log::info!("Preloaded queue position {} ({:?})", index, cached);
        }
        PreloadOutcome::Failed { track_id, reason } => {
            pb.abandon_with_message(format!("track {} failed", track_id));
            log::warn!("{}", reason);
        }
        other => {
            pb.finish_and_clear();
            println!("{:?}", other);
        }
    }
    manager.clear_all_preloaded_audio();
    Ok(())
}

async fn run_play(cfg: &Config, args: &PlayArgs) -> Result<()> {
    let tracks = read_queue(&args.queue.queue)?;
    if tracks.is_empty() {
        anyhow::bail!("Queue is empty");
    }
    let start = args.queue.current.unwrap_or(0).min(tracks.len() - 1);

    let backend: Arc<dyn AudioBackend> = Arc::new(NativeAudioBackend::new(reqwest::Client::new()));
    let preload = Arc::new(PreloadManager::new(checker(cfg)?, Arc::clone(&backend), cfg.preload.capacity));
    let analyzer = SpectrumAnalyzer::new(Arc::new(NativeAudioPlatform), cfg.analyzer.band_config());
    let engine = PlaybackEngine::new(preload, analyzer, backend, cfg.preload.debounce());
    let watcher = engine.spawn_preload_watcher();

    engine.set_queue(tracks.into_iter().map(QueueItem::new).collect(), Some(start));
    engine.set_play_mode(PlayMode {
        shuffle: args.queue.shuffle,
        repeat: args.queue.repeat,
    });
    if !engine.play_index(start) {
        anyhow::bail!("Track {} has no playable source", start);
    }

    let mut state = engine.subscribe();
    let mut refreshed = engine.subscribe_refreshed();
    let mut bars = tokio::time::interval(Duration::from_millis(250));
    let mut now_playing = None;
    loop {
        {
            let snapshot = state.borrow_and_update();
            if !snapshot.playback.is_playing {
                break;
            }
            if snapshot.playback.current_index != now_playing {
                now_playing = snapshot.playback.current_index;
                if let Some(item) = snapshot.current() {
                    println!("> {} - {}", item.track.title, item.track.artist_line());
                }
            }
        }

        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Ok(track) = refreshed.recv() => {
                println!("  refreshed {}", track.title);
            }
            _ = bars.tick(), if args.bars => {
                println!("  {}", render_bars(&engine.analyzer().bar_heights()));
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    engine.stop();
    engine.preload().clear_all_preloaded_audio();
    watcher.abort();
    Ok(())
}

async fn run_spectrum(cfg: Config, args: &SpectrumArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let mut analyzer_cfg = cfg.analyzer;
    if let Some(bands) = args.bands {
        analyzer_cfg.band_count = bands;
    }
    if let Some(s) = args.sensitivity {
        analyzer_cfg.sensitivity = s;
    }
    if let Some(t) = args.threshold {
        analyzer_cfg.threshold = t;
    }
    if let Some(db) = args.max_decibels {
        analyzer_cfg.max_decibels = db;
    }
    let checked = Config {
        analyzer: analyzer_cfg,
        ..Default::default()
    };
    checked.validate()?;

    let element = NativeElement::new(reqwest::Client::new(), Clock::Manual);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener = element.add_listener(Arc::new(move |e: &MediaEvent| {
        let _ = tx.send(e.clone());
    }));
    element.set_source(&args.input.to_string_lossy());
    loop {
        match rx.recv().await {
            Some(MediaEvent::CanPlayThrough) => break,
            Some(MediaEvent::Error(msg)) => anyhow::bail!("Failed to load {}: {}", args.input.display(), msg),
            Some(_) => {}
            None => anyhow::bail!("Element stopped reporting events"),
        }
    }
    element.remove_listener(listener);

    let analyzer = SpectrumAnalyzer::with_driver(
        Arc::new(NativeAudioPlatform),
        checked.analyzer.band_config(),
        FrameDriver::Manual,
    );
    let handle: Arc<dyn MediaElement> = element.clone();
    analyzer.connect_audio(handle);
    if let Some(fault) = analyzer.error() {
        anyhow::bail!("Analyzer unavailable: {}", fault);
    }

    let duration = element.duration().unwrap_or_default();
    log::info!(
        "Analysing {} ({:.1}s) at {} fps",
        args.input.display(),
        duration.as_secs_f32(),
        args.fps
    );

    let step = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    element.play();
    while element.advance(step) {
        analyzer.render_frame();
        let bars = analyzer.bar_heights();
        println!("{:>8.3}  {}", element.position().as_secs_f32(), render_bars(&bars));
    }
    analyzer.disconnect_audio();
    Ok(())
}

fn render_bars(bars: &[f32]) -> String {
    const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    bars.iter()
        .map(|&v| {
            let level = ((v / 100.0) * 8.0).round().clamp(0.0, 8.0) as usize;
            format!("{}{:>4.0}", LEVELS[level], v)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

async fn run_songs(cfg: &Config) -> Result<()> {
    let client = CatalogClient::new(&cfg.catalog.base_url)?;
    let tracks = client.fetch_tracks().await.context("Failed to list catalog tracks")?;
    for track in &tracks {
        println!("{}\t{}\t{}", track.id, track.title, track.artist_line());
    }
    log::info!("{} tracks", tracks.len());
    Ok(())
}

async fn run_album(cfg: &Config, id: &str) -> Result<()> {
    let client = CatalogClient::new(&cfg.catalog.base_url)?;
    let album = client
        .fetch_album(id)
        .await
        .with_context(|| format!("Failed to fetch album {}", id))?;
    println!("{} ({})", album.name, album.id);
    if !album.artists.is_empty() {
        println!("by {}", album.artists.join(" / "));
    }
    if let Some(intro) = album.intro.as_deref() {
        println!("\n{}", intro);
    }
    Ok(())
}
