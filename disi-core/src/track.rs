//! # Dominant Track Module
//!
//! Whole-file precomputation of the dominant frequency and its power over time.
//! The waveform is cut into consecutive, non-overlapping chunks of a fixed
//! sample count; each chunk contributes one point.

use serde::Serialize;

use crate::spectrum::SpectralEstimator;
use crate::waveform::Waveform;

/// Samples per track chunk, independent of the sample rate.
pub const CHUNK_SIZE: usize = 1024;

/// Dominant frequency and power for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPoint {
    /// Chunk start in seconds.
    pub timestamp_s: f64,
    pub dominant_frequency_hz: f64,
    pub dominant_power_db: f64,
}

/// Time-ascending dominant frequency/power series for a whole waveform.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DominantTrack {
    version: u64,
    points: Vec<TrackPoint>,
}

impl DominantTrack {
    /// Runs the estimator over every `chunk_size` chunk of the waveform.
    ///
    /// The last chunk may be shorter. The dominant bin is the first maximum,
    /// i.e. the lowest frequency among equal magnitudes.
    ///
    /// # Arguments
    /// * `waveform` - The loaded waveform
    /// * `estimator` - Estimator reused across chunks
    /// * `chunk_size` - Samples per track point
    ///
    /// # Returns
    /// * `DominantTrack` - One point per chunk, version 0
    pub fn build(waveform: &Waveform, estimator: &mut SpectralEstimator, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let sample_rate = waveform.sample_rate();
        let mut points = Vec::with_capacity(waveform.len().div_ceil(chunk_size));

        for (i, chunk) in waveform.samples().chunks(chunk_size).enumerate() {
            if chunk.is_empty() {
                continue;
            }
            let spectrum = estimator.estimate(chunk, sample_rate);
            if let Some(peak) = spectrum.peak() {
                points.push(TrackPoint {
                    timestamp_s: (i * chunk_size) as f64 / sample_rate as f64,
                    dominant_frequency_hz: peak.frequency_hz,
                    dominant_power_db: peak.magnitude_db,
                });
            }
        }

        log::debug!(
            "Built dominant track: {} points from {} samples",
            points.len(),
            waveform.len()
        );

        Self { version: 0, points }
    }

    /// Stamps the track with the load generation it belongs to.
    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The point whose timestamp is closest to `time_s`. Ties go to the earlier point.
    pub fn nearest(&self, time_s: f64) -> Option<&TrackPoint> {
        self.points.iter().min_by(|a, b| {
            let diff_a = (a.timestamp_s - time_s).abs();
            let diff_b = (b.timestamp_s - time_s).abs();
            diff_a.partial_cmp(&diff_b).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
