//! Frame-level speech/silence classification.
//!
//! The segmenter hands fixed-size frames of normalized samples to a
//! [`FrameClassifier`] and turns the reported spans into segment boundary
//! decisions. Classifiers keep whatever cache they need between calls and
//! drop it on `reset()`.

use crate::audio;
use crate::error::Result;

/// A detected stretch of speech, in milliseconds relative to the start of
/// the classified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechSpan {
    /// Span start.
    pub start_ms: u64,
    /// Span end (exclusive).
    pub end_ms: u64,
}

impl SpeechSpan {
    /// Span length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// External speech/silence classifier, called once per frame.
pub trait FrameClassifier: Send {
    /// Classify one frame of normalized samples. `is_final` marks the
    /// stream-end flush, where the frame may be shorter than usual.
    fn classify(&mut self, frame: &[f32], is_final: bool) -> Result<Vec<SpeechSpan>>;

    /// Drop all cached state, as if no audio had been seen.
    fn reset(&mut self);
}

/// RMS-energy classifier with an adaptive noise floor.
///
/// A frame counts as speech when its RMS rises clearly above the slowly
/// tracked background level. Good enough for clean close-mic audio; model
/// classifiers plug in through the same trait.
pub struct EnergyClassifier {
    sample_rate: u32,
    threshold: f32,
    /// EMA of silent-frame RMS; the cache carried between calls.
    noise_floor: Option<f32>,
}

/// Speech must exceed the noise floor by this factor as well as the
/// absolute threshold.
const FLOOR_RATIO: f32 = 3.0;
/// EMA weight for noise floor updates.
const FLOOR_ALPHA: f32 = 0.1;

impl EnergyClassifier {
    /// Create a classifier for the given sample rate and RMS threshold.
    pub fn new(sample_rate: u32, threshold: f32) -> Self {
        Self {
            sample_rate,
            threshold,
            noise_floor: None,
        }
    }

    fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
        (sum_sq / frame.len() as f32).sqrt()
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &[f32], _is_final: bool) -> Result<Vec<SpeechSpan>> {
        let rms = Self::rms(frame);
        let floor_gate = self.noise_floor.map_or(0.0, |floor| floor * FLOOR_RATIO);
        let is_speech = rms > self.threshold && rms > floor_gate;

        if !is_speech {
            // Track the background level only while silent.
            self.noise_floor = Some(match self.noise_floor {
                Some(floor) => floor + FLOOR_ALPHA * (rms - floor),
                None => rms,
            });
            return Ok(Vec::new());
        }

        Ok(vec![SpeechSpan {
            start_ms: 0,
            end_ms: audio::samples_to_ms(frame.len(), self.sample_rate),
        }])
    }

    fn reset(&mut self) {
        self.noise_floor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(amplitude: f32, ms: u64) -> Vec<f32> {
        vec![amplitude; audio::ms_to_samples(ms, 16_000)]
    }

    #[test]
    fn silence_reports_no_spans() {
        let mut classifier = EnergyClassifier::new(16_000, 0.01);
        assert!(classifier.classify(&frame(0.0, 240), false).unwrap().is_empty());
    }

    #[test]
    fn loud_frame_reports_full_span() {
        let mut classifier = EnergyClassifier::new(16_000, 0.01);
        let spans = classifier.classify(&frame(0.5, 240), false).unwrap();
        assert_eq!(spans, vec![SpeechSpan { start_ms: 0, end_ms: 240 }]);
    }

    #[test]
    fn noise_floor_adapts_to_steady_background() {
        let mut classifier = EnergyClassifier::new(16_000, 0.01);
        // Long steady hum raises the floor...
        for _ in 0..50 {
            let _ = classifier.classify(&frame(0.008, 240), false).unwrap();
        }
        // ...so marginal energy just above the absolute threshold stays silence.
        assert!(classifier.classify(&frame(0.012, 240), false).unwrap().is_empty());
        // Reset drops the cache and the same frame counts as speech again.
        classifier.reset();
        assert!(!classifier.classify(&frame(0.012, 240), false).unwrap().is_empty());
    }

    #[test]
    fn empty_final_frame_is_silence() {
        let mut classifier = EnergyClassifier::new(16_000, 0.01);
        assert!(classifier.classify(&[], true).unwrap().is_empty());
    }
}
