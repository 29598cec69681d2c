//! Terminal renderer: a one-line live read-out of the playhead and spectrum peak.

use std::io::{self, Write};

use disi_core::bridge::format_timestamp;
use disi_core::{Annotation, DominantTrack, EngineEvent, Spectrum, SpectrumRenderer};

/// Width of the magnitude bar in characters.
const BAR_WIDTH: usize = 40;
/// Magnitudes at or below this are drawn as an empty bar.
const BAR_FLOOR_DB: f64 = -100.0;

#[derive(Debug, Default)]
pub struct TerminalRenderer {
    peak: Option<(f64, f64)>,
    line_open: bool,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends the live line so later output starts on a fresh one.
    pub fn finish_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

fn magnitude_bar(magnitude_db: f64) -> String {
    let fraction = ((magnitude_db - BAR_FLOOR_DB) / -BAR_FLOOR_DB).clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

impl SpectrumRenderer for TerminalRenderer {
    fn on_spectrum_update(&mut self, spectrum: &Spectrum) {
        self.peak = spectrum.peak().map(|bin| (bin.frequency_hz, bin.magnitude_db));
    }

    fn on_track_ready(&mut self, track: &DominantTrack) {
        self.finish_line();
        let loudest = track
            .points()
            .iter()
            .max_by(|a, b| {
                a.dominant_power_db
                    .partial_cmp(&b.dominant_power_db)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match loudest {
            Some(point) => println!(
                "Track v{}: {} chunks, loudest {:.1} Hz at {} ({:.2} dB)",
                track.version(),
                track.len(),
                point.dominant_frequency_hz,
                format_timestamp(point.timestamp_s),
                point.dominant_power_db
            ),
            None => println!("Track v{}: empty", track.version()),
        }
    }

    fn on_position_update(&mut self, timestamp_s: f64) {
        let readout = match self.peak {
            Some((freq, mag)) => format!("{:>8.1} Hz {:>7.2} dB [{}]", freq, mag, magnitude_bar(mag)),
            None => "no signal".to_string(),
        };
        print!("\r{}  {}", format_timestamp(timestamp_s), readout);
        let _ = io::stdout().flush();
        self.line_open = true;
    }

    fn on_event(&mut self, event: &EngineEvent) {
        self.finish_line();
        match event {
            EngineEvent::PlaybackFinished => println!("Playback finished."),
            EngineEvent::Error(e) => eprintln!("Error: {}", e),
        }
    }

    fn on_annotations(&mut self, annotations: &[Annotation]) {
        if let Some(last) = annotations.last() {
            self.finish_line();
            println!(
                "Marker at {}: {:.2} Hz, {:.2} dB",
                format_timestamp(last.time_s),
                last.frequency_hz,
                last.power_db
            );
        }
    }
}
