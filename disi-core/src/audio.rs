//! # Audio Output Module
//!
//! The seam between the playback engine and the output device. The engine only
//! sees [`OutputBackend`] and [`OutputStream`]; [`CpalOutput`] is the real
//! device implementation on top of CPAL.
//!
//! ## Features
//! - Named or default output device selection
//! - Stream config matched to the waveform's sample rate (no resampling)
//! - Optional fixed device buffer size
//! - Mono render fanned out to every device channel
//! - Stream errors routed back to the engine as faults

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;

use crate::config::OutputConfig;
use crate::error::{CoreError, CoreResult};

/// Fills one device buffer with mono frames. Runs on the real-time thread.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Receives a description of an asynchronous stream failure.
pub type FaultCallback = Box<dyn FnMut(String) + Send + 'static>;

/// The two callbacks a backend wires into a stream.
pub struct StreamCallbacks {
    pub render: RenderCallback,
    pub fault: FaultCallback,
}

/// A running output stream. Dropping it closes the stream.
pub trait OutputStream {
    /// Stops pulling buffers. No render callback starts after this returns.
    fn stop(&mut self) -> CoreResult<()>;
}

/// Something that can open a mono output stream at a given rate.
pub trait OutputBackend {
    fn open(&self, sample_rate: u32, callbacks: StreamCallbacks) -> CoreResult<Box<dyn OutputStream>>;
}

/// CPAL-backed output.
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    config: OutputConfig,
}

impl CpalOutput {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    fn select_device(&self, host: &cpal::Host) -> CoreResult<cpal::Device> {
        match &self.config.device {
            Some(wanted) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| CoreError::Device(e.to_string()))?;
                for device in devices {
                    if device.name().map(|n| &n == wanted).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(CoreError::Device(format!("Output device not found: {}", wanted)))
            }
            None => host
                .default_output_device()
                .ok_or_else(|| CoreError::Device("No output device available".into())),
        }
    }
}

struct CpalStream {
    stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn stop(&mut self) -> CoreResult<()> {
        self.stream
            .pause()
            .map_err(|e| CoreError::Device(e.to_string()))
    }
}

impl OutputBackend for CpalOutput {
    fn open(&self, sample_rate: u32, callbacks: StreamCallbacks) -> CoreResult<Box<dyn OutputStream>> {
        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        log::info!(
            "Using audio output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let configs = device
            .supported_output_configs()
            .map_err(|e| CoreError::Device(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, sample_rate).ok_or_else(|| {
            CoreError::Device(format!("No f32 output format at {} Hz", sample_rate))
        })?;

        let supported = supported.with_sample_rate(cpal::SampleRate(sample_rate));
        let channels = supported.channels().max(1) as usize;
        let mut config: cpal::StreamConfig = supported.into();
        if let Some(frames) = self.config.buffer_frames {
            config.buffer_size = cpal::BufferSize::Fixed(frames);
        }

        log::info!(
            "Output config: {} channels, {} Hz, buffer {:?}",
            channels,
            sample_rate,
            config.buffer_size
        );

        let StreamCallbacks { mut render, mut fault } = callbacks;
        // Mono scratch buffer, grown on the first callback and reused afterwards.
        let mut mono: Vec<f32> = Vec::with_capacity(
            self.config.buffer_frames.unwrap_or(4096) as usize,
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);
                    render(mono.as_mut_slice());
                    for (frame, sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(*sample);
                    }
                },
                move |err| {
                    log::error!("An error occurred on the output stream: {}", err);
                    fault(err.to_string());
                },
                None,
            )
            .map_err(|e| CoreError::Device(e.to_string()))?;

        stream.play().map_err(|e| CoreError::Device(e.to_string()))?;
        log::info!("Output stream started");

        Ok(Box::new(CpalStream { stream }))
    }
}

/// Finds an f32 output configuration whose rate range contains `sample_rate`.
///
/// Prefers the fewest channels, since the waveform is mono.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate().0 <= sample_rate
                && c.max_sample_rate().0 >= sample_rate
        })
        .min_by_key(|c| c.channels())
}

/// Names of every output device on the default host.
pub fn list_output_devices() -> CoreResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| CoreError::Device(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}
