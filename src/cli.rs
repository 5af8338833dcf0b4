use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use encore::queue::RepeatMode;

#[derive(Parser, Debug)]
#[command(name = "encore", about = "Queue navigation, preloading and spectrum analysis for streamed music")]
pub struct Cli {
    /// Config file (defaults to ./encore.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog API base url
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Probe timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve which queue position plays next
    Next(QueueArgs),

    /// Probe every track in a queue and refresh stale ones from the catalog
    Check {
        /// Queue file (JSON array of tracks)
        queue: PathBuf,

        /// Write the refreshed queue here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Health-check and load the next track ahead of playback
    Preload(QueueArgs),

    /// Play a queue headlessly, preloading ahead and analysing live
    Play(PlayArgs),

    /// Run the spectrum analyzer over a local audio file
    Spectrum(SpectrumArgs),

    /// List every track in the catalog
    Songs,

    /// Show one album with its artists
    Album {
        /// Album id
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Queue file (JSON array of tracks)
    pub queue: PathBuf,

    /// Index of the track currently playing
    #[arg(short, long)]
    pub current: Option<usize>,

    /// Shuffle the queue, keeping the current track first
    #[arg(long)]
    pub shuffle: bool,

    /// Repeat mode: off, single or all
    #[arg(long, default_value_t = RepeatMode::Off)]
    pub repeat: RepeatMode,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    #[command(flatten)]
    pub queue: QueueArgs,

    /// Print spectrum bars while playing
    #[arg(long)]
    pub bars: bool,
}

#[derive(Args, Debug)]
pub struct SpectrumArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Frames per second of output
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Number of bands (4 or 6)
    #[arg(long)]
    pub bands: Option<usize>,

    /// Bar height multiplier
    #[arg(long)]
    pub sensitivity: Option<f32>,

    /// Loudness threshold (0-255)
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Transform ceiling in dB (-100 to 0)
    #[arg(long, allow_hyphen_values = true)]
    pub max_decibels: Option<f32>,
}
