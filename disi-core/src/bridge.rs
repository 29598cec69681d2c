//! # Presentation Bridge Module
//!
//! Runs on the UI/control thread at a fixed interval. Each tick drains the
//! handoff channel and forwards the newest spectrum and the playhead to the
//! renderer. The bridge owns no audio state; it only reads the engine.

use std::time::{Duration, Instant};

use crate::audio::OutputBackend;
use crate::error::CoreError;
use crate::handoff::HandoffReceiver;
use crate::playback::PlaybackEngine;
use crate::spectrum::Spectrum;
use crate::track::DominantTrack;

/// Marker a renderer may draw across its plots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    pub time_s: f64,
    pub frequency_hz: f64,
    pub power_db: f64,
    /// Magnitude of the displayed spectrum at `frequency_hz`, if one was shown.
    pub spectrum_magnitude_db: Option<f64>,
}

/// Discrete notifications for the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playback reached the end of its range.
    PlaybackFinished,
    /// An error the user should see.
    Error(CoreError),
}

/// The external renderer. Called on the thread that drives the bridge.
pub trait SpectrumRenderer {
    fn on_spectrum_update(&mut self, spectrum: &Spectrum);

    fn on_track_ready(&mut self, track: &DominantTrack);

    fn on_position_update(&mut self, timestamp_s: f64);

    fn on_event(&mut self, _event: &EngineEvent) {}

    fn on_annotations(&mut self, _annotations: &[Annotation]) {}
}

/// Fixed-interval timer driven by the caller's event loop.
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl PollTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next_due: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// True once per elapsed interval while active.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(deadline) if now >= deadline => {
                // Skip missed ticks instead of bursting to catch up.
                let mut next = deadline + self.interval;
                if next <= now {
                    next = now + self.interval;
                }
                self.next_due = Some(next);
                true
            }
            _ => false,
        }
    }

    /// Time left until the next tick, zero if overdue, `None` when stopped.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// What a bridge tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer is stopped; nothing was polled.
    Idle,
    /// Nothing new in the channel.
    NoUpdate,
    /// A spectrum and position were forwarded.
    Updated,
    /// Playback ended (range end or device fault); the timer stopped itself.
    Stopped,
}

/// Polls the handoff channel on the presentation thread.
#[derive(Debug)]
pub struct PresentationBridge {
    spectra: HandoffReceiver<Spectrum>,
    timer: PollTimer,
    displayed: Spectrum,
}

impl PresentationBridge {
    pub fn new(spectra: HandoffReceiver<Spectrum>, interval: Duration) -> Self {
        Self {
            spectra,
            timer: PollTimer::new(interval),
            displayed: Spectrum::default(),
        }
    }

    pub fn timer(&self) -> &PollTimer {
        &self.timer
    }

    pub fn start(&mut self) {
        self.timer.start(Instant::now());
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_active()
    }

    /// The spectrum most recently handed to the renderer.
    pub fn displayed(&self) -> &Spectrum {
        &self.displayed
    }

    /// Shows a spectrum computed off the audio path, e.g. after a seek while stopped.
    pub fn present_still<R: SpectrumRenderer + ?Sized>(
        &mut self,
        spectrum: Spectrum,
        position_s: f64,
        renderer: &mut R,
    ) {
        renderer.on_spectrum_update(&spectrum);
        renderer.on_position_update(position_s);
        self.displayed = spectrum;
    }

    /// Discards spectra queued for a previous file or position.
    pub fn discard_pending(&self) {
        let _ = self.spectra.try_latest();
    }

    /// Ticks if the timer interval has elapsed at `now`.
    pub fn poll<B: OutputBackend, R: SpectrumRenderer + ?Sized>(
        &mut self,
        now: Instant,
        engine: &mut PlaybackEngine<B>,
        renderer: &mut R,
    ) -> TickOutcome {
        if !self.timer.is_active() {
            return TickOutcome::Idle;
        }
        if !self.timer.due(now) {
            return TickOutcome::NoUpdate;
        }
        self.tick(engine, renderer)
    }

    /// One poll of the channel, regardless of the timer deadline.
    ///
    /// # Arguments
    /// * `engine` - Source of the playhead, end-of-range and fault state
    /// * `renderer` - Receives the newest spectrum, position and events
    ///
    /// # Returns
    /// * `TickOutcome::Stopped` - Range end or device fault; the timer is stopped
    /// * `TickOutcome::Updated` / `NoUpdate` - Whether a spectrum was forwarded
    /// * `TickOutcome::Idle` - The timer was not running
    pub fn tick<B: OutputBackend, R: SpectrumRenderer + ?Sized>(
        &mut self,
        engine: &mut PlaybackEngine<B>,
        renderer: &mut R,
    ) -> TickOutcome {
        if !self.timer.is_active() {
            return TickOutcome::Idle;
        }

        let updated = match self.spectra.try_latest() {
            Some(spectrum) => {
                renderer.on_spectrum_update(&spectrum);
                renderer.on_position_update(engine.position_secs());
                self.displayed = spectrum;
                true
            }
            None => false,
        };

        if let Some(fault) = engine.take_fault() {
            log::error!("Playback halted: {}", fault);
            self.timer.stop();
            renderer.on_position_update(engine.position_secs());
            renderer.on_event(&EngineEvent::Error(fault));
            return TickOutcome::Stopped;
        }

        if engine.release_if_finished() {
            self.timer.stop();
            if !updated {
                renderer.on_position_update(engine.position_secs());
            }
            renderer.on_event(&EngineEvent::PlaybackFinished);
            return TickOutcome::Stopped;
        }

        if updated { TickOutcome::Updated } else { TickOutcome::NoUpdate }
    }
}

/// Formats seconds as `MM:SS.cc` for transport labels.
pub fn format_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0) as u64;
    let minutes = total_cs / 6000;
    let secs = (total_cs / 100) % 60;
    let centis = total_cs % 100;
    format!("{:02}:{:02}.{:02}", minutes, secs, centis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.00");
        assert_eq!(format_timestamp(5.25), "00:05.25");
        assert_eq!(format_timestamp(61.5), "01:01.50");
        assert_eq!(format_timestamp(-3.0), "00:00.00");
    }

    #[test]
    fn test_poll_timer_fires_once_per_interval() {
        let start = Instant::now();
        let mut timer = PollTimer::new(Duration::from_millis(30));
        assert!(!timer.due(start + Duration::from_secs(1)));

        timer.start(start);
        assert!(!timer.due(start + Duration::from_millis(10)));
        assert!(timer.due(start + Duration::from_millis(30)));
        assert!(!timer.due(start + Duration::from_millis(40)));
        assert!(timer.due(start + Duration::from_millis(60)));
        assert_eq!(
            timer.remaining(start + Duration::from_millis(70)),
            Some(Duration::from_millis(20))
        );

        // A long stall yields a single tick, not a burst.
        assert!(timer.due(start + Duration::from_millis(500)));
        assert!(!timer.due(start + Duration::from_millis(505)));

        timer.stop();
        assert!(!timer.is_active());
        assert_eq!(timer.remaining(start), None);
    }
}
