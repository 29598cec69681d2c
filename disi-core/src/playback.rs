//! # Playback Engine Module
//!
//! Streams the loaded waveform to the output device and analyses every buffer
//! it plays.
//!
//! ## Architecture
//! - **Control thread**: owns [`PlaybackEngine`], issues transport commands
//! - **Audio thread**: runs the render callback, owns a [`PlaybackCursor`]
//! - **Shared state**: position/playing/generation atomics, no locks on the render path
//! - **Spectra**: published through the drop-oldest handoff channel
//!
//! Every (re)start of the stream bumps a generation counter. A render callback
//! whose generation is stale only writes silence, so a callback that fires
//! after a logical stop never touches playback state.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{OutputBackend, OutputStream, StreamCallbacks};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::handoff::{handoff_channel, HandoffReceiver, HandoffSender};
use crate::spectrum::{SpectralEstimator, Spectrum};
use crate::waveform::Waveform;

/// Transport state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
}

/// State shared between the control thread and the render callback.
#[derive(Debug, Default)]
pub struct PlaybackShared {
    position: AtomicUsize,
    playing: AtomicBool,
    generation: AtomicU64,
    // Generation of the stream that faulted, 0 when none is latched.
    fault_generation: AtomicU64,
    fault_message: Mutex<Option<String>>,
}

impl PlaybackShared {
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Records a stream failure for the stream of `generation`. Never blocks.
    ///
    /// The fault is latched before `playing` drops, so a reader that sees the
    /// stream stopped also sees the fault.
    fn report_fault(&self, generation: u64, message: String) {
        if !self.is_current(generation) {
            return;
        }
        if let Ok(mut slot) = self.fault_message.try_lock() {
            *slot = Some(message);
        }
        self.fault_generation.store(generation, Ordering::Release);
        self.playing.store(false, Ordering::Release);
    }

    /// True while a fault is latched for the current stream.
    fn has_fault(&self) -> bool {
        let faulted = self.fault_generation.load(Ordering::Acquire);
        faulted != 0 && self.is_current(faulted)
    }

    /// Takes the latched fault. Faults of streams that were since halted or
    /// replaced are dropped.
    fn take_fault(&self) -> Option<String> {
        let faulted = self.fault_generation.swap(0, Ordering::AcqRel);
        let message = self
            .fault_message
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if faulted == 0 || !self.is_current(faulted) {
            return None;
        }
        Some(message.unwrap_or_else(|| "output stream failed".to_string()))
    }
}

/// What a single render call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Audio was written and more remains in range.
    Continue,
    /// The range is exhausted; the stream should be stopped.
    Finished,
    /// The callback belongs to a stopped stream and wrote silence.
    Detached,
}

/// Audio-thread side of one playback stream.
pub struct PlaybackCursor {
    waveform: Arc<Waveform>,
    position: usize,
    end: usize,
    generation: u64,
    finished: bool,
    estimator: SpectralEstimator,
    spectra: HandoffSender<Spectrum>,
    shared: Arc<PlaybackShared>,
}

impl PlaybackCursor {
    /// Fills `out` with the next frames in range and publishes their spectrum.
    ///
    /// Short reads are zero-padded and end playback. The spectrum covers
    /// exactly the frames copied from the waveform.
    ///
    /// # Arguments
    /// * `out` - Device buffer of mono frames, fully overwritten
    ///
    /// # Returns
    /// * `RenderOutcome` - Whether playback continues after this buffer
    pub fn render(&mut self, out: &mut [f32]) -> RenderOutcome {
        if !self.shared.is_current(self.generation) {
            out.fill(0.0);
            return RenderOutcome::Detached;
        }
        if self.finished || self.position >= self.end {
            out.fill(0.0);
            self.finish();
            return RenderOutcome::Finished;
        }

        let available = (self.end - self.position).min(out.len());
        let start = self.position;
        let chunk = &self.waveform.samples()[start..start + available];
        out[..available].copy_from_slice(chunk);
        out[available..].fill(0.0);

        self.position += available;
        self.shared.position.store(self.position, Ordering::Release);

        let spectrum = self.estimator.estimate(chunk, self.waveform.sample_rate());
        self.spectra.publish(spectrum);

        if available < out.len() {
            self.finish();
            RenderOutcome::Finished
        } else {
            RenderOutcome::Continue
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.shared.playing.store(false, Ordering::Release);
    }
}

/// Play/pause/seek/range state machine driving the output stream.
pub struct PlaybackEngine<B: OutputBackend> {
    backend: B,
    waveform: Option<Arc<Waveform>>,
    range: Range<usize>,
    shared: Arc<PlaybackShared>,
    stream: Option<Box<dyn OutputStream>>,
    spectra_tx: HandoffSender<Spectrum>,
    spectra_rx: HandoffReceiver<Spectrum>,
    segment_length: usize,
    band_limit_hz: f64,
    still_estimator: SpectralEstimator,
}

impl<B: OutputBackend> PlaybackEngine<B> {
    pub fn new(backend: B, config: &EngineConfig) -> Self {
        let (spectra_tx, spectra_rx) = handoff_channel(config.handoff_capacity);
        Self {
            backend,
            waveform: None,
            range: 0..0,
            shared: Arc::new(PlaybackShared::default()),
            stream: None,
            spectra_tx,
            spectra_rx,
            segment_length: config.segment_length,
            band_limit_hz: config.band_limit_hz,
            still_estimator: SpectralEstimator::new(config.segment_length, config.band_limit_hz),
        }
    }

    /// Replaces the waveform. Any running stream is closed first.
    ///
    /// Range resets to the whole waveform and position to 0.
    pub fn load(&mut self, waveform: Arc<Waveform>) {
        if let Err(e) = self.halt_stream() {
            log::warn!("Error stopping previous stream during load: {}", e);
        }
        self.spectra_tx.clear();
        self.range = 0..waveform.len();
        self.shared.position.store(0, Ordering::Release);
        log::info!(
            "Loaded waveform: {} samples at {} Hz ({:.2}s)",
            waveform.len(),
            waveform.sample_rate(),
            waveform.duration_secs()
        );
        self.waveform = Some(waveform);
    }

    pub fn waveform(&self) -> Option<&Arc<Waveform>> {
        self.waveform.as_ref()
    }

    /// `Playing` only while a stream is open and has not reached range end.
    pub fn status(&self) -> PlaybackStatus {
        if self.stream.is_some() && self.shared.is_playing() {
            PlaybackStatus::Playing
        } else {
            PlaybackStatus::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status() == PlaybackStatus::Playing
    }

    /// Current playback position as a sample index.
    pub fn position(&self) -> usize {
        self.shared.position()
    }

    pub fn position_secs(&self) -> f64 {
        match &self.waveform {
            Some(w) => w.index_to_seconds(self.position()),
            None => 0.0,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// A receiver for spectra published by the render callback.
    pub fn spectra(&self) -> HandoffReceiver<Spectrum> {
        self.spectra_rx.clone()
    }

    /// Starts (or resumes) playback of the current range from the current position.
    ///
    /// A position outside the range restarts at the range start.
    pub fn play(&mut self) -> CoreResult<()> {
        if self.waveform.is_none() {
            return Err(CoreError::NotLoaded);
        }
        if self.is_playing() {
            return Ok(());
        }
        // A finished stream may still be open until the bridge releases it.
        self.halt_stream()?;
        let position = self.position();
        let start = if self.range.contains(&position) { position } else { self.range.start };
        self.start_stream(start)
    }

    /// Plays `start..end` (sample indices) from `start`.
    ///
    /// # Errors
    /// * `CoreError::Range` - unless `0 <= start < end <= len`
    /// * `CoreError::Device` - the stream could not be opened; range and position are unchanged
    pub fn play_range(&mut self, start: usize, end: usize) -> CoreResult<()> {
        let len = self.loaded_len()?;
        if start >= end || end > len {
            return Err(CoreError::Range(format!(
                "sample range {}..{} is outside 0..{}",
                start, end, len
            )));
        }
        let previous = self.range.clone();
        self.halt_stream()?;
        self.range = start..end;
        if let Err(e) = self.start_stream(start) {
            self.range = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Stops the stream. Position is kept for resume.
    pub fn pause(&mut self) -> CoreResult<()> {
        let result = self.halt_stream();
        log::debug!("Paused at sample {}", self.position());
        result
    }

    /// Moves the playhead to `index`, restarting the stream if playing.
    ///
    /// # Arguments
    /// * `index` - Target sample, at most the waveform length
    ///
    /// # Errors
    /// * `CoreError::Range` - if `index` is past the end
    /// * `CoreError::NotLoaded` - if no waveform is loaded
    pub fn seek(&mut self, index: usize) -> CoreResult<()> {
        let len = self.loaded_len()?;
        if index > len {
            return Err(CoreError::Range(format!("seek index {} beyond {}", index, len)));
        }
        self.reposition(index)
    }

    /// Seeks to a time in seconds.
    pub fn seek_secs(&mut self, seconds: f64) -> CoreResult<()> {
        let waveform = self.waveform.clone().ok_or(CoreError::NotLoaded)?;
        if !seconds.is_finite() || seconds < 0.0 || seconds > waveform.duration_secs() {
            return Err(CoreError::Range(format!(
                "seek to {:.3}s outside 0..{:.3}s",
                seconds,
                waveform.duration_secs()
            )));
        }
        self.seek(waveform.seconds_to_index(seconds))
    }

    /// Restricts playback to `start_s..end_s` and moves the playhead to its start.
    ///
    /// # Arguments
    /// * `start_s` - Range start in seconds
    /// * `end_s` - Range end in seconds, exclusive
    ///
    /// # Errors
    /// * `CoreError::Range` - if `start_s < 0`, `end_s > duration` or `start_s >= end_s`
    pub fn set_range(&mut self, start_s: f64, end_s: f64) -> CoreResult<()> {
        let waveform = self.waveform.clone().ok_or(CoreError::NotLoaded)?;
        let duration = waveform.duration_secs();
        if !(start_s.is_finite() && end_s.is_finite()) || start_s < 0.0 || end_s > duration || start_s >= end_s {
            return Err(CoreError::Range(format!(
                "range {:.3}s..{:.3}s invalid for {:.3}s of audio",
                start_s, end_s, duration
            )));
        }
        let start = waveform.seconds_to_index(start_s);
        let end = waveform.seconds_to_index(end_s).min(waveform.len());
        if start >= end {
            return Err(CoreError::Range(format!(
                "range {:.3}s..{:.3}s is shorter than one sample",
                start_s, end_s
            )));
        }
        let previous = self.range.clone();
        self.range = start..end;
        log::debug!("Playback range set: {:.2}s to {:.2}s", start_s, end_s);
        if let Err(e) = self.reposition(start) {
            self.range = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Restores the full-waveform range and rewinds to the start.
    pub fn reset_range(&mut self) -> CoreResult<()> {
        let len = self.loaded_len()?;
        self.range = 0..len;
        self.reposition(0)
    }

    /// Spectrum of the segment starting at `index`, computed on the calling thread.
    pub fn spectrum_at(&mut self, index: usize) -> Spectrum {
        match &self.waveform {
            Some(w) => {
                let slice = w.slice(index, self.segment_length);
                self.still_estimator.estimate(slice, w.sample_rate())
            }
            None => Spectrum::default(),
        }
    }

    /// Closes the stream if the render callback reached range end.
    ///
    /// Returns true when a finished stream was released.
    pub fn release_if_finished(&mut self) -> bool {
        if self.stream.is_some() && !self.shared.is_playing() && !self.shared.has_fault() {
            if let Err(e) = self.halt_stream() {
                log::warn!("Error closing finished stream: {}", e);
            }
            log::info!("Playback reached range end at sample {}", self.position());
            return true;
        }
        false
    }

    /// Takes a latched device fault, closing the failed stream.
    pub fn take_fault(&mut self) -> Option<CoreError> {
        let message = self.shared.take_fault()?;
        if let Err(e) = self.halt_stream() {
            log::warn!("Error closing failed stream: {}", e);
        }
        Some(CoreError::Device(message))
    }

    fn loaded_len(&self) -> CoreResult<usize> {
        self.waveform
            .as_ref()
            .map(|w| w.len())
            .ok_or(CoreError::NotLoaded)
    }

    /// Moves the playhead. A running stream restarts at `index`, or at the
    /// range start when `index` lies outside the range.
    fn reposition(&mut self, index: usize) -> CoreResult<()> {
        let was_playing = self.is_playing();
        self.halt_stream()?;
        if was_playing {
            let start = if self.range.contains(&index) { index } else { self.range.start };
            self.start_stream(start)
        } else {
            self.shared.position.store(index, Ordering::Release);
            Ok(())
        }
    }

    /// Opens a stream rendering from `position`. On failure nothing changes.
    fn start_stream(&mut self, position: usize) -> CoreResult<()> {
        let waveform = self.waveform.clone().ok_or(CoreError::NotLoaded)?;
        let previous_position = self.position();

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.position.store(position, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);

        let mut cursor = PlaybackCursor {
            waveform: Arc::clone(&waveform),
            position,
            end: self.range.end,
            generation,
            finished: false,
            estimator: SpectralEstimator::new(self.segment_length, self.band_limit_hz),
            spectra: self.spectra_tx.clone(),
            shared: Arc::clone(&self.shared),
        };
        let render_shared = Arc::clone(&self.shared);
        let fault_shared = Arc::clone(&self.shared);

        let callbacks = StreamCallbacks {
            render: Box::new(move |out: &mut [f32]| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| cursor.render(&mut *out)));
                if outcome.is_err() {
                    out.fill(0.0);
                    cursor.finished = true;
                    render_shared.report_fault(generation, "render callback panicked".into());
                }
            }),
            fault: Box::new(move |message: String| {
                fault_shared.report_fault(generation, message);
            }),
        };

        match self.backend.open(waveform.sample_rate(), callbacks) {
            Ok(stream) => {
                self.stream = Some(stream);
                log::debug!(
                    "Playing samples {}..{} from {}",
                    self.range.start,
                    self.range.end,
                    position
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to open output stream: {}", e);
                self.shared.generation.fetch_add(1, Ordering::AcqRel);
                self.shared.playing.store(false, Ordering::Release);
                self.shared.position.store(previous_position, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Detaches the render callback, then stops and drops the stream.
    fn halt_stream(&mut self) -> CoreResult<()> {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.playing.store(false, Ordering::Release);
        match self.stream.take() {
            Some(mut stream) => stream.stop(),
            None => Ok(()),
        }
    }
}

impl<B: OutputBackend> Drop for PlaybackEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.halt_stream() {
            log::warn!("Error stopping stream on shutdown: {}", e);
        }
    }
}
