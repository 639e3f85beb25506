use std::io::Cursor;

use crate::core::errors::AudioError;

/// Scale between 16-bit PCM amplitude and normalised float amplitude.
const PCM_SCALE: f32 = 32_768.0;

/// Decode a raw little-endian 16-bit mono PCM payload into samples.
pub fn decode_pcm(bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::OddPcmByteLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode a complete WAV blob into mono 16-bit samples.
///
/// Only mono, 16-bit integer WAV at the expected rate is accepted; anything
/// else is rejected rather than resampled.
pub fn decode_wav(bytes: &[u8], expected_rate: u32) -> Result<Vec<i16>, AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels != 1
        || spec.sample_format != hound::SampleFormat::Int
        || spec.bits_per_sample != 16
    {
        return Err(spec.into());
    }
    if spec.sample_rate != expected_rate {
        return Err(AudioError::UnsupportedWavRate {
            got: spec.sample_rate,
            expected: expected_rate,
        });
    }
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok(samples)
}

/// Normalise 16-bit samples into `[-1.0, 1.0]` float amplitude.
pub fn normalize(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| f32::from(sample) / PCM_SCALE)
        .collect()
}

/// Root-mean-square energy of a chunk, in 16-bit amplitude units.
///
/// Squares are accumulated in f64 so long chunks cannot lose precision.
pub fn chunk_rms(chunk: &[i16]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = chunk
        .iter()
        .map(|&sample| {
            let value = f64::from(sample);
            value * value
        })
        .sum();
    (sum_squares / chunk.len() as f64).sqrt() as f32
}

/// Append-only sample buffer for one streaming session.
///
/// Samples are kept in arrival order for the lifetime of the session; nothing
/// is dropped or rewritten before the final decode reads the whole buffer.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    samples: Vec<i16>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    /// View of the trailing `window` samples, or the whole buffer when it is
    /// shorter than the window.
    pub fn tail(&self, window: usize) -> &[i16] {
        let start = self.samples.len().saturating_sub(window);
        &self.samples[start..]
    }
}

/// Tracks the trailing run of consecutive silent samples.
///
/// A chunk counts as silent when its RMS energy is below the configured
/// threshold; any chunk at or above the threshold resets the run to zero.
#[derive(Debug)]
pub struct SilenceTracker {
    threshold_rms: f32,
    limit_samples: usize,
    silent_samples: usize,
}

impl SilenceTracker {
    pub fn new(threshold_rms: f32, limit_samples: usize) -> Self {
        Self {
            threshold_rms,
            limit_samples,
            silent_samples: 0,
        }
    }

    /// Fold a newly arrived chunk into the run and report whether the
    /// configured silence limit has been reached.
    pub fn observe(&mut self, chunk: &[i16]) -> bool {
        if chunk_rms(chunk) < self.threshold_rms {
            self.silent_samples += chunk.len();
        } else {
            self.silent_samples = 0;
        }
        self.silent_samples >= self.limit_samples
    }

    pub fn silent_samples(&self) -> usize {
        self.silent_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
            for sample in samples {
                writer.write_sample(*sample).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_little_endian_pcm() {
        let bytes = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80];
        assert_eq!(
            decode_pcm(&bytes).expect("even payload decodes"),
            vec![1, -1, i16::MIN]
        );
    }

    #[test]
    fn rejects_odd_length_pcm() {
        let err = decode_pcm(&[0x01, 0x00, 0xFF]).expect_err("odd payload must fail");
        assert!(matches!(err, AudioError::OddPcmByteLength(3)));
    }

    #[test]
    fn decodes_mono_wav_at_expected_rate() {
        let bytes = wav_bytes(&[0, 100, -100, 32_000], 16_000, 1);
        let samples = decode_wav(&bytes, 16_000).expect("wav decodes");
        assert_eq!(samples, vec![0, 100, -100, 32_000]);
    }

    #[test]
    fn rejects_stereo_wav() {
        let bytes = wav_bytes(&[0, 0, 1, 1], 16_000, 2);
        let err = decode_wav(&bytes, 16_000).expect_err("stereo must fail");
        assert!(matches!(
            err,
            AudioError::UnsupportedWavSpec {
                channels: 2,
                bits: 16
            }
        ));
    }

    #[test]
    fn rejects_wav_at_wrong_rate() {
        let bytes = wav_bytes(&[0, 1, 2], 8_000, 1);
        let err = decode_wav(&bytes, 16_000).expect_err("wrong rate must fail");
        assert!(matches!(
            err,
            AudioError::UnsupportedWavRate {
                got: 8_000,
                expected: 16_000
            }
        ));
    }

    #[test]
    fn normalize_scales_to_unit_amplitude() {
        let floats = normalize(&[0, 16_384, -32_768]);
        assert_eq!(floats.len(), 3);
        assert!(floats[0].abs() < f32::EPSILON);
        assert!((floats[1] - 0.5).abs() < 1e-6);
        assert!((floats[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(chunk_rms(&[0; 160]), 0.0);
        assert_eq!(chunk_rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_amplitude_is_that_amplitude() {
        let rms = chunk_rms(&[1_000; 320]);
        assert!((rms - 1_000.0).abs() < 0.01);
    }

    #[test]
    fn tail_returns_trailing_window() {
        let mut buffer = AudioBuffer::new();
        buffer.append(&[1, 2, 3, 4, 5]);
        assert_eq!(buffer.tail(2), &[4, 5]);
        assert_eq!(buffer.tail(10), &[1, 2, 3, 4, 5]);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn silence_run_accumulates_and_resets() {
        let mut tracker = SilenceTracker::new(200.0, 1_000);
        assert!(!tracker.observe(&[0; 400]));
        assert_eq!(tracker.silent_samples(), 400);
        assert!(!tracker.observe(&[0; 400]));
        assert_eq!(tracker.silent_samples(), 800);

        // A loud chunk resets the run even though earlier silence was long.
        assert!(!tracker.observe(&[5_000; 400]));
        assert_eq!(tracker.silent_samples(), 0);

        assert!(!tracker.observe(&[0; 400]));
        assert!(!tracker.observe(&[0; 400]));
        assert!(tracker.observe(&[0; 400]));
        assert_eq!(tracker.silent_samples(), 1_200);
    }

    #[test]
    fn silence_threshold_is_exclusive() {
        let mut tracker = SilenceTracker::new(200.0, 100);
        // RMS exactly at the threshold counts as speech.
        assert!(!tracker.observe(&[200; 400]));
        assert_eq!(tracker.silent_samples(), 0);
        // Just below the threshold counts as silence.
        assert!(tracker.observe(&[199; 400]));
        assert_eq!(tracker.silent_samples(), 400);
    }
}
