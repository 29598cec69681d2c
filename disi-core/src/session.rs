//! # Session Module
//!
//! The surface the front-end talks to: file loads, transport commands and the
//! presentation tick. A session wires one [`PlaybackEngine`], one
//! [`PresentationBridge`] and the front-end's renderer together.
//!
//! Transport errors are both returned and forwarded to the renderer as
//! [`EngineEvent::Error`], so a front-end can ignore the return value and
//! still show every failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::OutputBackend;
use crate::bridge::{Annotation, EngineEvent, PresentationBridge, SpectrumRenderer, TickOutcome};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::playback::{PlaybackEngine, PlaybackStatus};
use crate::spectrum::SpectralEstimator;
use crate::track::DominantTrack;
use crate::waveform::Waveform;

pub struct Session<B: OutputBackend, R: SpectrumRenderer> {
    config: EngineConfig,
    engine: PlaybackEngine<B>,
    bridge: PresentationBridge,
    renderer: R,
    track: DominantTrack,
    track_estimator: SpectralEstimator,
    loads: u64,
    annotations: Vec<Annotation>,
}

impl<B: OutputBackend, R: SpectrumRenderer> Session<B, R> {
    pub fn new(backend: B, renderer: R, config: EngineConfig) -> Self {
        let engine = PlaybackEngine::new(backend, &config);
        let bridge = PresentationBridge::new(
            engine.spectra(),
            Duration::from_millis(config.poll_interval_ms),
        );
        let track_estimator = SpectralEstimator::new(config.segment_length, config.band_limit_hz);
        Self {
            config,
            engine,
            bridge,
            renderer,
            track: DominantTrack::default(),
            track_estimator,
            loads: 0,
            annotations: Vec::new(),
        }
    }

    /// Installs a freshly decoded waveform.
    ///
    /// Playback is stopped and its stream closed before anything is replaced.
    /// The dominant track is built synchronously and handed to the renderer
    /// before this returns, so transport commands only ever see a complete load.
    pub fn load(&mut self, waveform: Waveform) {
        // Closes a finished stream the bridge has not released yet, too.
        let result = self.engine.pause();
        let _ = self.report(result);
        self.bridge.stop();

        let waveform = Arc::new(waveform);
        self.loads += 1;
        let started = Instant::now();
        self.track = DominantTrack::build(&waveform, &mut self.track_estimator, self.config.chunk_size)
            .with_version(self.loads);
        log::info!(
            "Dominant track v{} ready: {} points in {:.1?}",
            self.track.version(),
            self.track.len(),
            started.elapsed()
        );

        self.engine.load(Arc::clone(&waveform));
        self.bridge.discard_pending();
        self.annotations.clear();
        self.renderer.on_annotations(&self.annotations);
        self.renderer.on_track_ready(&self.track);

        if waveform.is_silent() {
            self.renderer.on_event(&EngineEvent::Error(CoreError::SilentAudio));
        }
        self.refresh_still();
    }

    /// Starts or resumes playback and the presentation timer.
    pub fn play(&mut self) -> CoreResult<()> {
        let result = self.engine.play();
        if result.is_ok() {
            self.bridge.start();
        }
        self.report(result)
    }

    /// Plays a sample-index range from its start.
    pub fn play_range(&mut self, start: usize, end: usize) -> CoreResult<()> {
        let result = self.engine.play_range(start, end);
        if result.is_ok() {
            self.bridge.start();
        }
        self.report(result)
    }

    pub fn pause(&mut self) -> CoreResult<()> {
        self.bridge.stop();
        let result = self.engine.pause();
        self.report(result)
    }

    pub fn toggle_play_pause(&mut self) -> CoreResult<()> {
        if self.engine.is_playing() { self.pause() } else { self.play() }
    }

    pub fn seek(&mut self, seconds: f64) -> CoreResult<()> {
        let result = self.engine.seek_secs(seconds);
        self.after_reposition(result)
    }

    pub fn set_range(&mut self, start_s: f64, end_s: f64) -> CoreResult<()> {
        let result = self.engine.set_range(start_s, end_s);
        self.after_reposition(result)
    }

    pub fn reset_range(&mut self) -> CoreResult<()> {
        let result = self.engine.reset_range();
        self.after_reposition(result)
    }

    /// Runs one bridge tick if the poll interval has elapsed at `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        self.bridge.poll(now, &mut self.engine, &mut self.renderer)
    }

    /// Runs one bridge tick immediately.
    pub fn tick_now(&mut self) -> TickOutcome {
        self.bridge.tick(&mut self.engine, &mut self.renderer)
    }

    /// Time until the next due tick, `None` while the timer is stopped.
    pub fn next_tick_in(&self, now: Instant) -> Option<Duration> {
        self.bridge.timer().remaining(now)
    }

    pub fn is_polling(&self) -> bool {
        self.bridge.is_polling()
    }

    /// Marks the track point nearest `time_s` across the renderer's plots.
    ///
    /// # Returns
    /// * `Some(Annotation)` - The added marker
    /// * `None` - The track is empty
    pub fn annotate(&mut self, time_s: f64) -> Option<Annotation> {
        let point = *self.track.nearest(time_s)?;
        let annotation = Annotation {
            time_s: point.timestamp_s,
            frequency_hz: point.dominant_frequency_hz,
            power_db: point.dominant_power_db,
            spectrum_magnitude_db: self
                .bridge
                .displayed()
                .nearest(point.dominant_frequency_hz)
                .map(|bin| bin.magnitude_db),
        };
        self.annotations.push(annotation);
        self.renderer.on_annotations(&self.annotations);
        Some(annotation)
    }

    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
        self.renderer.on_annotations(&self.annotations);
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn track(&self) -> &DominantTrack {
        &self.track
    }

    pub fn engine(&self) -> &PlaybackEngine<B> {
        &self.engine
    }

    pub fn status(&self) -> PlaybackStatus {
        self.engine.status()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn after_reposition(&mut self, result: CoreResult<()>) -> CoreResult<()> {
        if result.is_ok() {
            if self.engine.is_playing() {
                // Anything queued was rendered before the jump.
                self.bridge.discard_pending();
            } else {
                self.bridge.stop();
                self.refresh_still();
            }
        } else if !self.engine.is_playing() {
            self.bridge.stop();
        }
        self.report(result)
    }

    /// Shows the spectrum at the playhead while nothing is streaming.
    fn refresh_still(&mut self) {
        let position = self.engine.position();
        let spectrum = self.engine.spectrum_at(position);
        let position_s = self.engine.position_secs();
        self.bridge.present_still(spectrum, position_s, &mut self.renderer);
    }

    fn report<T>(&mut self, result: CoreResult<T>) -> CoreResult<T> {
        if let Err(e) = &result {
            log::warn!("{}", e);
            self.renderer.on_event(&EngineEvent::Error(e.clone()));
        }
        result
    }
}
