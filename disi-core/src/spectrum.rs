//! # Spectral Estimation Module
//!
//! Short-time power spectral density estimate used both per playback buffer
//! and per chunk of the whole-file track.
//!
//! ## Method
//! - Averaged periodogram over half-overlapping segments (Welch)
//! - Per-segment mean removal and periodic Hann window
//! - "Spectrum" scaling: each bin is power, not power per Hz
//! - One-sided, converted to dB with a 1e-10 floor
//! - Bins limited to [0, band limit] Hz

use rustfft::{num_complex::Complex, FftPlanner};

/// Longest segment the estimator averages over.
pub const SEGMENT_LENGTH: usize = 1024;

/// Upper edge of the reported band in Hz.
pub const BAND_LIMIT_HZ: f64 = 22_500.0;

/// Added to every PSD bin before the dB conversion so empty bins stay finite.
pub const POWER_FLOOR: f64 = 1e-10;

/// One frequency bin of a spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumBin {
    pub frequency_hz: f64,
    pub magnitude_db: f64,
}

/// Frequency-ascending (frequency, dB) pairs for one analysis window.
///
/// A snapshot: it is produced fresh per call and never updated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    bins: Vec<SpectrumBin>,
}

impl Spectrum {
    pub fn bins(&self) -> &[SpectrumBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// The bin with the highest magnitude. Ties go to the lowest frequency.
    pub fn peak(&self) -> Option<SpectrumBin> {
        let mut peak: Option<SpectrumBin> = None;
        for bin in &self.bins {
            match peak {
                Some(best) if bin.magnitude_db <= best.magnitude_db => {}
                _ => peak = Some(*bin),
            }
        }
        peak
    }

    /// The bin whose frequency is closest to `frequency_hz`.
    pub fn nearest(&self, frequency_hz: f64) -> Option<SpectrumBin> {
        self.bins
            .iter()
            .min_by(|a, b| {
                let diff_a = (a.frequency_hz - frequency_hz).abs();
                let diff_b = (b.frequency_hz - frequency_hz).abs();
                diff_a.partial_cmp(&diff_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
    }
}

/// Removes the mean of a segment (constant detrend).
fn remove_dc_offset(segment: &mut [f64]) {
    let len = segment.len();
    if len == 0 { return; }
    let avg = segment.iter().sum::<f64>() / len as f64;
    for sample in segment.iter_mut() {
        *sample -= avg;
    }
}

/// Periodic Hann window of length `n`, the FFT-friendly variant.
///
/// A one-point window is a single 1.0 so a lone sample is not zeroed out.
fn hann_window(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Windowed PSD estimator.
///
/// Output depends only on the input slice and sample rate; the estimator only
/// caches FFT plans and windows between calls.
pub struct SpectralEstimator {
    planner: FftPlanner<f64>,
    segment_length: usize,
    band_limit_hz: f64,
    window: Vec<f64>,
    segment: Vec<f64>,
    buffer: Vec<Complex<f64>>,
}

impl std::fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("segment_length", &self.segment_length)
            .field("band_limit_hz", &self.band_limit_hz)
            .finish()
    }
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self::new(SEGMENT_LENGTH, BAND_LIMIT_HZ)
    }
}

impl SpectralEstimator {
    pub fn new(segment_length: usize, band_limit_hz: f64) -> Self {
        let segment_length = segment_length.max(1);
        Self {
            planner: FftPlanner::new(),
            segment_length,
            band_limit_hz,
            window: Vec::with_capacity(segment_length),
            segment: Vec::with_capacity(segment_length),
            buffer: Vec::with_capacity(segment_length),
        }
    }

    pub fn segment_length(&self) -> usize {
        self.segment_length
    }

    pub fn band_limit_hz(&self) -> f64 {
        self.band_limit_hz
    }

    /// Estimates the spectrum of `samples`.
    ///
    /// Segment length is `min(segment_length, samples.len())` with half
    /// overlap. Empty input (or a zero sample rate) yields an empty spectrum.
    ///
    /// # Arguments
    /// * `samples` - Mono PCM to analyse, any length
    /// * `sample_rate` - Rate of `samples` in Hz, sets the bin spacing
    ///
    /// # Returns
    /// * `Spectrum` - Ascending bins from 0 Hz up to the band limit, in dB
    pub fn estimate(&mut self, samples: &[f32], sample_rate: u32) -> Spectrum {
        if samples.is_empty() || sample_rate == 0 {
            return Spectrum::default();
        }

        let seg_len = samples.len().min(self.segment_length);
        let overlap = if seg_len > 1 { seg_len / 2 } else { 0 };
        let step = seg_len - overlap;
        let n_segments = (samples.len() - overlap) / step;

        if self.window.len() != seg_len {
            self.window = hann_window(seg_len);
        }
        let window_sum: f64 = self.window.iter().sum();
        let scale = 1.0 / (window_sum * window_sum);

        let fft = self.planner.plan_fft_forward(seg_len);
        let n_bins = seg_len / 2 + 1;
        let mut psd = vec![0.0_f64; n_bins];

        for s in 0..n_segments {
            let start = s * step;
            self.segment.clear();
            self.segment
                .extend(samples[start..start + seg_len].iter().map(|&x| x as f64));
            remove_dc_offset(&mut self.segment);

            self.buffer.clear();
            self.buffer.extend(
                self.segment
                    .iter()
                    .zip(self.window.iter())
                    .map(|(&x, &w)| Complex { re: x * w, im: 0.0 }),
            );
            fft.process(&mut self.buffer);

            for (power, value) in psd.iter_mut().zip(self.buffer.iter()) {
                *power += value.norm_sqr() * scale;
            }
        }

        // Fold negative frequencies in. DC never doubles, Nyquist only exists
        // (and stays single) for even lengths.
        let fold_end = if seg_len % 2 == 0 { n_bins - 1 } else { n_bins };
        for power in psd.iter_mut().take(fold_end).skip(1) {
            *power *= 2.0;
        }

        let bin_width = sample_rate as f64 / seg_len as f64;
        let bins = psd
            .into_iter()
            .enumerate()
            .map(|(k, power)| SpectrumBin {
                frequency_hz: k as f64 * bin_width,
                magnitude_db: 10.0 * (power / n_segments as f64 + POWER_FLOOR).log10(),
            })
            .take_while(|bin| bin.frequency_hz <= self.band_limit_hz)
            .collect();

        Spectrum { bins }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
            })
            .collect()
    }

    #[test]
    fn test_empty_input_gives_empty_spectrum() {
        let mut estimator = SpectralEstimator::default();
        assert!(estimator.estimate(&[], 44100).is_empty());
    }

    #[test]
    fn test_bin_layout_for_full_segment() {
        let mut estimator = SpectralEstimator::default();
        let spectrum = estimator.estimate(&sine(440.0, 0.5, 1024, 44100), 44100);
        // 513 one-sided bins, all of them under the 22.5 kHz band edge.
        assert_eq!(spectrum.len(), 513);
        assert_eq!(spectrum.bins()[0].frequency_hz, 0.0);
        assert_eq!(spectrum.bins()[512].frequency_hz, 22050.0);
    }

    #[test]
    fn test_band_limit_filters_high_bins() {
        let mut estimator = SpectralEstimator::default();
        let spectrum = estimator.estimate(&sine(1000.0, 0.5, 1024, 96000), 96000);
        let last = spectrum.bins().last().unwrap();
        assert!(last.frequency_hz <= BAND_LIMIT_HZ);
        assert!(spectrum.len() < 513);
    }

    #[test]
    fn test_frequencies_strictly_ascending() {
        let mut estimator = SpectralEstimator::default();
        for len in [1, 2, 3, 511, 1024, 1500, 4096] {
            let spectrum = estimator.estimate(&sine(3000.0, 0.8, len, 48000), 48000);
            assert!(!spectrum.is_empty());
            for pair in spectrum.bins().windows(2) {
                assert!(pair[0].frequency_hz < pair[1].frequency_hz);
            }
            assert!(spectrum.bins().iter().all(|b| b.frequency_hz >= 0.0
                && b.frequency_hz <= BAND_LIMIT_HZ));
        }
    }

    #[test]
    fn test_silence_hits_power_floor() {
        let mut estimator = SpectralEstimator::default();
        let spectrum = estimator.estimate(&vec![0.0; 1024], 44100);
        let floor = 10.0 * POWER_FLOOR.log10();
        assert!(spectrum.bins().iter().all(|b| (b.magnitude_db - floor).abs() < 1e-9));
    }

    #[test]
    fn test_tone_peak_within_one_bin() {
        let mut estimator = SpectralEstimator::default();
        let spectrum = estimator.estimate(&sine(1000.0, 0.9, 1024, 44100), 44100);
        let peak = spectrum.peak().unwrap();
        assert!((peak.frequency_hz - 1000.0).abs() <= 44100.0 / 1024.0);
    }

    #[test]
    fn test_spectrum_scaling_reports_tone_power() {
        // A full-scale bin-centred sine carries A^2/2 of power in its bin.
        let sample_rate = 1024 * 43;
        let freq = 43.0 * 100.0;
        let mut estimator = SpectralEstimator::new(1024, 1e9);
        let spectrum = estimator.estimate(&sine(freq, 1.0, 1024, sample_rate), sample_rate);
        let peak = spectrum.peak().unwrap();
        assert_eq!(peak.frequency_hz, freq);
        let expected_db = 10.0 * 0.5_f64.log10();
        assert!((peak.magnitude_db - expected_db).abs() < 0.01);
    }

    #[test]
    fn test_averaging_over_long_input() {
        // 2048 samples -> 1024-sample segments at 512 hop -> 3 segments.
        let mut estimator = SpectralEstimator::default();
        let spectrum = estimator.estimate(&sine(2000.0, 0.5, 2048, 44100), 44100);
        assert_eq!(spectrum.len(), 513);
        let peak = spectrum.peak().unwrap();
        assert!((peak.frequency_hz - 2000.0).abs() <= 44100.0 / 1024.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let signal = sine(777.0, 0.3, 900, 22050);
        let mut a = SpectralEstimator::default();
        let mut b = SpectralEstimator::default();
        let first = a.estimate(&signal, 22050);
        // Warm a different plan in between to make sure cached state does not leak.
        let _ = a.estimate(&signal[..300], 22050);
        assert_eq!(first, a.estimate(&signal, 22050));
        assert_eq!(first, b.estimate(&signal, 22050));
    }

    #[test]
    fn test_peak_prefers_lowest_frequency_on_tie() {
        let spectrum = Spectrum {
            bins: vec![
                SpectrumBin { frequency_hz: 0.0, magnitude_db: -10.0 },
                SpectrumBin { frequency_hz: 10.0, magnitude_db: -3.0 },
                SpectrumBin { frequency_hz: 20.0, magnitude_db: -3.0 },
            ],
        };
        assert_eq!(spectrum.peak().unwrap().frequency_hz, 10.0);
        assert_eq!(spectrum.nearest(18.0).unwrap().frequency_hz, 20.0);
    }
}
