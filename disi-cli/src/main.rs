//! # DiSi - Spectral Player
//!
//! Command line front-end for the DiSi engine. It decodes WAV files, prints the
//! whole-file dominant frequency track, and plays audio with a live spectral
//! read-out.
//!
//! ## Architecture
//! - **Main Thread**: transport commands and the presentation poll loop
//! - **Audio Thread**: owned by the output device, renders and analyses buffers
//! - **Communication**: drop-oldest handoff channel from audio to main thread

mod decode;
mod render;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use disi_core::audio::{list_output_devices, CpalOutput};
use disi_core::config::load_config;
use disi_core::{DominantTrack, EngineConfig, Session, SpectralEstimator, TrackPoint};
use render::TerminalRenderer;

#[derive(Parser, Debug)]
#[command(name = "disi", version, about = "Real-time spectral analysis and playback")]
struct Cli {
    /// Engine configuration file (defaults to ./disi.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dominant frequency/power track of a WAV file
    Track {
        file: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Play a WAV file with a live spectrum read-out
    Play {
        file: PathBuf,
        /// Range start in seconds
        #[arg(long)]
        start: Option<f64>,
        /// Range end in seconds
        #[arg(long)]
        end: Option<f64>,
    },
    /// List available output devices
    Devices,
}

#[derive(Serialize)]
struct TrackReport<'a> {
    file: String,
    sample_rate: u32,
    duration_s: f64,
    chunk_size: usize,
    points: &'a [TrackPoint],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Track { file, json } => print_track(&file, json, &config),
        Command::Play { file, start, end } => play(&file, start, end, config),
        Command::Devices => {
            for name in list_output_devices().context("listing output devices")? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

/// Explicit `--config`, else `disi.toml` in the working directory, else defaults.
fn resolve_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let local = PathBuf::from("disi.toml");
            local.exists().then_some(local)
        }
    };
    match path {
        Some(path) => {
            let config = load_config(&path)
                .with_context(|| format!("loading config {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn print_track(file: &Path, json: bool, config: &EngineConfig) -> Result<()> {
    let waveform = decode::load_waveform(file)?;
    let mut estimator = SpectralEstimator::new(config.segment_length, config.band_limit_hz);
    let track = DominantTrack::build(&waveform, &mut estimator, config.chunk_size);

    if json {
        let report = TrackReport {
            file: file.display().to_string(),
            sample_rate: waveform.sample_rate(),
            duration_s: waveform.duration_secs(),
            chunk_size: config.chunk_size,
            points: track.points(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{:>10}  {:>12}  {:>10}", "time (s)", "freq (Hz)", "power (dB)");
        for point in track.points() {
            println!(
                "{:>10.4}  {:>12.2}  {:>10.2}",
                point.timestamp_s, point.dominant_frequency_hz, point.dominant_power_db
            );
        }
    }
    Ok(())
}

fn play(file: &Path, start: Option<f64>, end: Option<f64>, config: EngineConfig) -> Result<()> {
    let waveform = decode::load_waveform(file)?;
    let duration = waveform.duration_secs();

    let backend = CpalOutput::new(config.output.clone());
    let mut session = Session::new(backend, TerminalRenderer::new(), config);
    session.load(waveform);

    if start.is_some() || end.is_some() {
        session.set_range(start.unwrap_or(0.0), end.unwrap_or(duration))?;
    }
    session.play().context("starting playback")?;

    while session.is_polling() {
        session.tick(Instant::now());
        if let Some(wait) = session.next_tick_in(Instant::now()) {
            thread::sleep(wait);
        }
    }

    session.renderer_mut().finish_line();
    Ok(())
}
