// disi-core/src/lib.rs

//! The core logic for the DiSi spectral player.
//! This crate is responsible for audio output, spectral estimation,
//! the whole-file dominant frequency track and the handoff of live
//! spectra to a presentation thread. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod error;
pub mod handoff;
pub mod playback;
pub mod session;
pub mod spectrum;
pub mod track;
pub mod waveform;

pub use bridge::{Annotation, EngineEvent, PresentationBridge, SpectrumRenderer, TickOutcome};
pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use playback::{PlaybackEngine, PlaybackStatus};
pub use session::Session;
pub use spectrum::{SpectralEstimator, Spectrum, SpectrumBin};
pub use track::{DominantTrack, TrackPoint};
pub use waveform::Waveform;
