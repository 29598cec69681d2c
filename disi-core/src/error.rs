//! # Error Module
//!
//! Error kinds surfaced by the engine. Every variant carries a plain message so
//! the value can be cloned and forwarded to the renderer as an event.

use thiserror::Error;

/// Errors that can occur while loading, analysing or playing a waveform.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The waveform could not be read or decoded. Prior state is preserved.
    #[error("Failed to load waveform: {0}")]
    Load(String),

    /// The output device is unavailable or failed mid-stream.
    #[error("Audio device error: {0}")]
    Device(String),

    /// A start/end/seek argument was outside the waveform or inverted.
    #[error("Invalid range: {0}")]
    Range(String),

    /// The waveform peak is zero, so normalization was skipped.
    #[error("Waveform is silent (peak amplitude is zero), normalization skipped")]
    SilentAudio,

    /// A transport command arrived before any waveform was loaded.
    #[error("No waveform loaded")]
    NotLoaded,

    /// The configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type CoreResult<T> = Result<T, CoreError>;
