//! Shared fixtures: a scripted output backend and a recording renderer.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use disi_core::audio::{FaultCallback, OutputBackend, OutputStream, RenderCallback, StreamCallbacks};
use disi_core::{Annotation, CoreError, CoreResult, DominantTrack, EngineEvent, Spectrum, SpectrumRenderer};

#[derive(Default)]
struct Slots {
    render: Option<RenderCallback>,
    fault: Option<FaultCallback>,
    opened: usize,
    stopped: usize,
}

/// Output backend whose "device" is the test: buffers are pulled by hand.
#[derive(Clone, Default)]
pub struct ScriptedOutput {
    slots: Rc<RefCell<Slots>>,
    fail: bool,
}

impl ScriptedOutput {
    pub fn unavailable() -> Self {
        Self { fail: true, ..Default::default() }
    }

    /// Requests one device buffer of `frames` frames.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![f32::NAN; frames];
        if let Some(render) = self.slots.borrow_mut().render.as_mut() {
            render(&mut out[..]);
        }
        out
    }

    /// Hands the current render callback over, e.g. to another thread.
    pub fn take_render(&self) -> Option<RenderCallback> {
        self.slots.borrow_mut().render.take()
    }

    /// Simulates the device reporting an error on the current stream.
    pub fn fail_stream(&self, message: &str) {
        if let Some(fault) = self.slots.borrow_mut().fault.as_mut() {
            fault(message.to_string());
        }
    }

    pub fn opened(&self) -> usize {
        self.slots.borrow().opened
    }

    pub fn stopped(&self) -> usize {
        self.slots.borrow().stopped
    }
}

struct ScriptedStream {
    slots: Rc<RefCell<Slots>>,
}

impl OutputStream for ScriptedStream {
    fn stop(&mut self) -> CoreResult<()> {
        self.slots.borrow_mut().stopped += 1;
        Ok(())
    }
}

impl OutputBackend for ScriptedOutput {
    fn open(&self, _sample_rate: u32, callbacks: StreamCallbacks) -> CoreResult<Box<dyn OutputStream>> {
        if self.fail {
            return Err(CoreError::Device("no output device available".into()));
        }
        let mut slots = self.slots.borrow_mut();
        slots.render = Some(callbacks.render);
        slots.fault = Some(callbacks.fault);
        slots.opened += 1;
        Ok(Box::new(ScriptedStream { slots: Rc::clone(&self.slots) }))
    }
}

/// Renderer that records everything it is sent.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub spectra: Vec<Spectrum>,
    pub positions: Vec<f64>,
    pub tracks: Vec<DominantTrack>,
    pub events: Vec<EngineEvent>,
    pub annotations: Vec<Annotation>,
}

impl SpectrumRenderer for RecordingRenderer {
    fn on_spectrum_update(&mut self, spectrum: &Spectrum) {
        self.spectra.push(spectrum.clone());
    }

    fn on_track_ready(&mut self, track: &DominantTrack) {
        self.tracks.push(track.clone());
    }

    fn on_position_update(&mut self, timestamp_s: f64) {
        self.positions.push(timestamp_s);
    }

    fn on_event(&mut self, event: &EngineEvent) {
        self.events.push(event.clone());
    }

    fn on_annotations(&mut self, annotations: &[Annotation]) {
        self.annotations = annotations.to_vec();
    }
}

pub fn sine(freq: f64, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32)
        .collect()
}

/// A deterministic, non-periodic test signal so every buffer has a distinct spectrum.
pub fn chirp(len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (2.0 * std::f64::consts::PI * (100.0 + 400.0 * t) * t).sin() as f32
        })
        .collect()
}
