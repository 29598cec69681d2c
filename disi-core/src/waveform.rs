//! # Waveform Module
//!
//! Owns the decoded, peak-normalized sample buffer and its sample rate.
//! A `Waveform` is immutable once built; a new file load replaces it wholesale.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};

/// A single analysed channel of PCM audio, normalized to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct Waveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
    silent: bool,
}

impl Waveform {
    /// Builds a waveform from mono samples and normalizes it by its peak.
    ///
    /// If every sample is zero the waveform is flagged silent and left as-is
    /// instead of dividing by zero; check [`Waveform::is_silent`].
    ///
    /// # Errors
    /// * `CoreError::Load` - if `samples` is empty or `sample_rate` is zero
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> CoreResult<Self> {
        if samples.is_empty() {
            return Err(CoreError::Load("waveform contains no samples".into()));
        }
        if sample_rate == 0 {
            return Err(CoreError::Load("sample rate must be positive".into()));
        }

        let peak = samples
            .iter()
            .filter(|s| s.is_finite())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()));

        let silent = peak == 0.0;
        if silent {
            log::warn!("Waveform peak is zero, skipping normalization");
        } else {
            for sample in samples.iter_mut() {
                *sample = if sample.is_finite() { *sample / peak } else { 0.0 };
            }
        }

        Ok(Self {
            samples: samples.into(),
            sample_rate,
            silent,
        })
    }

    /// Builds a waveform from interleaved PCM, keeping only the first channel.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> CoreResult<Self> {
        if channels == 0 {
            return Err(CoreError::Load("channel count must be positive".into()));
        }
        let first_channel = samples
            .chunks(channels as usize)
            .filter(|frame| frame.len() == channels as usize)
            .map(|frame| frame[0])
            .collect();
        Self::new(first_channel, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed waveform; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the source had a zero peak and normalization was skipped.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns up to `len` samples starting at `start`, clipped to the buffer.
    pub fn slice(&self, start: usize, len: usize) -> &[f32] {
        let start = start.min(self.samples.len());
        let end = start.saturating_add(len).min(self.samples.len());
        &self.samples[start..end]
    }

    /// Converts seconds to a sample index, truncating toward zero.
    pub fn seconds_to_index(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64) as usize
    }

    pub fn index_to_seconds(&self, index: usize) -> f64 {
        index as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_is_one_after_normalization() {
        let waveform = Waveform::new(vec![0.25, -0.5, 0.1, 0.0], 8000).unwrap();
        let peak = waveform.samples().iter().fold(0.0_f32, |a, s| a.max(s.abs()));
        assert_eq!(peak, 1.0);
        assert_eq!(waveform.samples()[1], -1.0);
        assert_eq!(waveform.samples()[0], 0.5);
        assert!(!waveform.is_silent());
    }

    #[test]
    fn test_silent_waveform_skips_normalization() {
        let waveform = Waveform::new(vec![0.0; 16], 44100).unwrap();
        assert!(waveform.is_silent());
        assert!(waveform.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_empty_and_zero_rate_are_load_errors() {
        assert!(matches!(Waveform::new(vec![], 44100), Err(CoreError::Load(_))));
        assert!(matches!(Waveform::new(vec![1.0], 0), Err(CoreError::Load(_))));
    }

    #[test]
    fn test_from_interleaved_keeps_first_channel() {
        let interleaved = [0.5, 9.0, -1.0, 9.0, 0.25, 9.0];
        let waveform = Waveform::from_interleaved(&interleaved, 2, 100).unwrap();
        assert_eq!(waveform.samples(), &[0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_slice_is_bounds_checked() {
        let waveform = Waveform::new((1..=10).map(|i| i as f32).collect(), 10).unwrap();
        assert_eq!(waveform.slice(8, 5).len(), 2);
        assert!(waveform.slice(20, 5).is_empty());
        assert_eq!(waveform.slice(0, 3), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_time_conversions() {
        let waveform = Waveform::new(vec![1.0; 44100 * 2], 44100).unwrap();
        assert_eq!(waveform.duration_secs(), 2.0);
        assert_eq!(waveform.seconds_to_index(1.5), 66150);
        assert_eq!(waveform.seconds_to_index(-1.0), 0);
        assert_eq!(waveform.index_to_seconds(22050), 0.5);
    }
}
