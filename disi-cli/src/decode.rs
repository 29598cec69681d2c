//! WAV decoding for the command line front-end.
//!
//! The core never reads files; this module turns a WAV file into interleaved
//! `f32` PCM and hands it over as a [`Waveform`].

use std::path::Path;

use disi_core::{CoreError, CoreResult, Waveform};

/// Interleaved PCM as read from disk.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Reads every sample of a WAV file, scaling integer formats to [-1.0, 1.0].
pub fn decode_wav(path: &Path) -> CoreResult<DecodedAudio> {
    let load_err = |e: hound::Error| CoreError::Load(format!("{}: {}", path.display(), e));

    let reader = hound::WavReader::open(path).map_err(load_err)?;
    let spec = reader.spec();
    log::debug!(
        "WAV spec: {} channels, {} Hz, {} bits, {:?}",
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(load_err)?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(load_err)?
        }
    };

    Ok(DecodedAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Decodes a WAV file and keeps its first channel as the analysed waveform.
pub fn load_waveform(path: &Path) -> CoreResult<Waveform> {
    let decoded = decode_wav(path)?;
    let waveform = Waveform::from_interleaved(&decoded.samples, decoded.channels, decoded.sample_rate)?;
    log::info!(
        "Decoded {}: {} channel(s), {} Hz, {:.2}s",
        path.display(),
        decoded.channels,
        decoded.sample_rate,
        waveform.duration_secs()
    );
    Ok(waveform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("disi-decode-{}-{}.wav", std::process::id(), name))
    }

    #[test]
    fn test_decode_stereo_int_keeps_left_channel() {
        let path = temp_wav("stereo");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for (left, right) in [(16384_i16, -1_i16), (-32768, 5), (8192, 7)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_wav(&path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.samples.len(), 6);
        assert_eq!(decoded.samples[0], 0.5);

        let waveform = load_waveform(&path).unwrap();
        assert_eq!(waveform.samples(), &[0.5, -1.0, 0.25]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_decode_float_mono() {
        let path = temp_wav("float");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0.1_f32, -0.2, 0.4] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = load_waveform(&path).unwrap();
        assert_eq!(waveform.len(), 3);
        assert_eq!(waveform.samples()[2], 1.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_waveform(Path::new("/no/such/file.wav")).unwrap_err();
        assert!(matches!(err, CoreError::Load(_)));
    }
}
