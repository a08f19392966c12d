//! Message types passed between pipeline stages.

use crate::audio;
use bytes::Bytes;

/// Envelope for every value flowing through a stage queue.
///
/// The `Sentinel` variant is the end-of-stream marker: each producer sends
/// it exactly once per queue, after its last payload. Making it a distinct
/// variant (rather than a reserved payload byte value) means it can never
/// collide with legitimate data.
#[derive(Debug, Clone, PartialEq)]
pub enum StageMessage<T> {
    /// A regular value.
    Payload(T),
    /// No further messages will arrive from this producer.
    Sentinel,
}

impl<T> StageMessage<T> {
    /// Whether this message is the end-of-stream marker.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

/// One bounded candidate utterance produced by the segmenter, the unit
/// handed to speech recognition. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// PCM16 samples, mono.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Segment {
    /// Duration of the segment in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        audio::samples_to_ms(self.samples.len(), self.sample_rate)
    }

    /// Serialize the samples as little-endian PCM16 bytes.
    pub fn to_bytes(&self) -> Bytes {
        audio::pcm16_to_bytes(&self.samples)
    }
}

/// Control protocol framing one synthesized utterance on the LLM→TTS
/// boundary: `Start`, zero or more `Text` fragments, then `End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnControl {
    /// A new utterance begins.
    Start,
    /// One incremental reply fragment.
    Text(String),
    /// The utterance is complete; synthesis may be triggered.
    End,
}
