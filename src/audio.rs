//! PCM16 sample conversion and duration arithmetic.
//!
//! The wire format everywhere is little-endian signed 16-bit PCM, mono,
//! 16 kHz. Stages work on normalized `f32` samples in \[-1, 1\]; the fixed
//! conversion scale is 32768 in both directions.

use bytes::Bytes;

/// Fixed PCM16 ⇄ f32 conversion scale.
const PCM_SCALE: f32 = 32768.0;

/// Decode little-endian PCM16 bytes into normalized f32 samples.
///
/// The byte slice must contain a whole number of samples; callers that
/// receive arbitrarily split byte streams carry the odd byte themselves
/// (see [`crate::segmenter::SegmenterStage`]).
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    debug_assert!(bytes.len() % 2 == 0);
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM_SCALE)
        .collect()
}

/// Encode normalized f32 samples as PCM16, rounding to the nearest
/// representable value and clipping at the i16 range.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * PCM_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Serialize PCM16 samples to little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Bytes::from(out)
}

/// Duration of `samples` samples at `sample_rate`, in milliseconds.
pub fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64 * 1000) / sample_rate as u64
}

/// Number of samples spanning `ms` milliseconds at `sample_rate`.
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    (ms * sample_rate as u64 / 1000) as usize
}
