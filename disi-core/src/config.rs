//! # Configuration Module
//!
//! Engine tunables, loadable from a TOML file. Every field has a default so a
//! partial (or empty) file is valid.
//!
//! ```toml
//! poll_interval_ms = 30
//! segment_length = 1024
//!
//! [output]
//! device = "pulse"
//! buffer_frames = 512
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Presentation poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum segment length of the windowed PSD estimate.
    #[serde(default = "default_segment_length")]
    pub segment_length: usize,
    /// Chunk size of the whole-file dominant track.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Upper edge of the analysis band in Hz.
    #[serde(default = "default_band_limit_hz")]
    pub band_limit_hz: f64,
    /// How many spectra may queue between the audio and UI threads.
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OutputConfig {
    /// Output device name. `None` picks the host default.
    #[serde(default)]
    pub device: Option<String>,
    /// Fixed device buffer size in frames. `None` lets the device decide.
    #[serde(default)]
    pub buffer_frames: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            segment_length: default_segment_length(),
            chunk_size: default_chunk_size(),
            band_limit_hz: default_band_limit_hz(),
            handoff_capacity: default_handoff_capacity(),
            output: OutputConfig::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 { 30 }
fn default_segment_length() -> usize { crate::spectrum::SEGMENT_LENGTH }
fn default_chunk_size() -> usize { crate::track::CHUNK_SIZE }
fn default_band_limit_hz() -> f64 { crate::spectrum::BAND_LIMIT_HZ }
fn default_handoff_capacity() -> usize { 4 }

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(CoreError::Config("poll_interval_ms must be positive".into()));
        }
        if self.segment_length == 0 || self.chunk_size == 0 {
            return Err(CoreError::Config(
                "segment_length and chunk_size must be positive".into(),
            ));
        }
        if !(self.band_limit_hz.is_finite() && self.band_limit_hz > 0.0) {
            return Err(CoreError::Config("band_limit_hz must be a positive number".into()));
        }
        if self.handoff_capacity == 0 {
            return Err(CoreError::Config("handoff_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Reads and parses an engine configuration file.
pub fn load_config(path: &Path) -> CoreResult<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
    EngineConfig::from_toml(&content)
}
