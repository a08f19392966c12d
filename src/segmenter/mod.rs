//! Voice-activity segmentation: turning an unbounded raw audio stream into
//! bounded speech clips.
//!
//! The [`Segmenter`] accumulates normalized samples, classifies them a
//! fixed frame at a time, and decides clip boundaries: a segment closes
//! after enough silence follows speech, or at the hard duration cutoff.
//! Long stretches of leading non-speech are truncated so the buffer stays
//! bounded while nobody is talking. [`SegmenterStage`] adapts the state
//! machine to the pipeline: PCM16 byte chunks in, [`Segment`]s out, with
//! the should-listen gate suppressing input while the system speaks.

pub mod classifier;

use crate::audio;
use crate::config::SegmenterConfig;
use crate::error::Result;
use crate::pipeline::messages::Segment;
use crate::pipeline::stage::{Stage, StageContext};
use async_trait::async_trait;
use bytes::Bytes;
use classifier::{FrameClassifier, SpeechSpan};
use tracing::{debug, info, trace};

/// Segment boundary state machine over normalized samples.
pub struct Segmenter {
    config: SegmenterConfig,
    sample_rate: u32,
    classifier: Box<dyn FrameClassifier>,
    /// Accumulated normalized samples for the in-progress segment.
    buffer: Vec<f32>,
    /// Number of buffer samples already classified.
    cursor: usize,
    /// Classification frame length in samples.
    frame_samples: usize,
    /// End of the most recent detected speech, ms from buffer start.
    last_speech_end_ms: Option<u64>,
    /// Detected speech intervals for the in-progress segment, absolute ms
    /// from buffer start.
    intervals: Vec<SpeechSpan>,
}

impl Segmenter {
    /// Create a segmenter over the given classifier.
    pub fn new(
        config: SegmenterConfig,
        sample_rate: u32,
        classifier: Box<dyn FrameClassifier>,
    ) -> Self {
        let frame_samples = audio::ms_to_samples(config.frame_ms, sample_rate);
        Self {
            config,
            sample_rate,
            classifier,
            buffer: Vec::new(),
            cursor: 0,
            frame_samples,
            last_speech_end_ms: None,
            intervals: Vec::new(),
        }
    }

    /// Append samples and return any segments that closed as a result.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Vec<Segment>> {
        self.buffer.extend_from_slice(samples);
        let mut emitted = Vec::new();

        'restart: loop {
            while self.buffer.len() - self.cursor >= self.frame_samples {
                if self.classify_next_frame(&mut emitted)? {
                    // A close reset the state; reconsider the remainder.
                    continue 'restart;
                }
                if self.over_max() {
                    self.close_segment(self.max_cut_samples(), &mut emitted);
                    continue 'restart;
                }
            }
            if self.over_max() {
                self.close_segment(self.max_cut_samples(), &mut emitted);
                continue 'restart;
            }
            if self.intervals.is_empty() && self.buffered_ms() >= self.config.truncate_after_ms {
                self.truncate_leading();
            }
            break;
        }

        Ok(emitted)
    }

    /// Stream-end flush: classify the unclassified tail and emit the
    /// remaining buffer as a final segment when it holds enough speech.
    pub fn flush(&mut self) -> Result<Option<Segment>> {
        if self.cursor < self.buffer.len() {
            let start = self.cursor;
            let tail = self.buffer[start..].to_vec();
            let spans = self.classifier.classify(&tail, true)?;
            self.cursor = self.buffer.len();
            self.record_spans(start, &spans);
        }

        let emit = !self.intervals.is_empty()
            && self.speech_total_ms() >= self.config.min_speech_ms;
        let segment = emit.then(|| Segment {
            samples: audio::f32_to_pcm16(&self.buffer),
            sample_rate: self.sample_rate,
        });

        self.buffer.clear();
        self.reset_tracking();
        Ok(segment)
    }

    /// Buffered audio duration in ms.
    pub fn buffered_ms(&self) -> u64 {
        audio::samples_to_ms(self.buffer.len(), self.sample_rate)
    }

    /// Total recorded speech duration in ms for the in-progress segment.
    fn speech_total_ms(&self) -> u64 {
        self.intervals.iter().map(SpeechSpan::duration_ms).sum()
    }

    /// Classify one frame at the cursor. Returns `true` when the frame
    /// closed the current segment.
    fn classify_next_frame(&mut self, emitted: &mut Vec<Segment>) -> Result<bool> {
        let start = self.cursor;
        let frame = self.buffer[start..start + self.frame_samples].to_vec();
        let spans = self.classifier.classify(&frame, false)?;
        self.cursor = start + self.frame_samples;

        if spans.is_empty() {
            if let Some(last_ms) = self.last_speech_end_ms {
                let silence_ms = self.buffered_ms().saturating_sub(last_ms);
                if silence_ms >= self.config.min_silence_ms {
                    self.close_segment(self.buffer.len(), emitted);
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        self.record_spans(start, &spans);
        Ok(false)
    }

    fn record_spans(&mut self, frame_start_samples: usize, spans: &[SpeechSpan]) {
        let base_ms = audio::samples_to_ms(frame_start_samples, self.sample_rate);
        for span in spans {
            let absolute = SpeechSpan {
                start_ms: base_ms + span.start_ms,
                end_ms: base_ms + span.end_ms,
            };
            self.last_speech_end_ms = Some(
                self.last_speech_end_ms
                    .map_or(absolute.end_ms, |cur| cur.max(absolute.end_ms)),
            );
            self.intervals.push(absolute);
        }
    }

    fn over_max(&self) -> bool {
        !self.intervals.is_empty() && self.buffered_ms() >= self.config.max_segment_ms
    }

    fn max_cut_samples(&self) -> usize {
        audio::ms_to_samples(self.config.max_segment_ms, self.sample_rate)
    }

    /// Close the in-progress segment at `cut` samples, carrying any excess
    /// into the fresh buffer. Emits only when enough speech accumulated;
    /// too-short blips are discarded with the rest of the state.
    fn close_segment(&mut self, cut: usize, emitted: &mut Vec<Segment>) {
        let cut = cut.min(self.buffer.len());
        let emit = self.speech_total_ms() >= self.config.min_speech_ms;
        let head: Vec<f32> = self.buffer.drain(..cut).collect();

        self.reset_tracking();
        if emit {
            emitted.push(Segment {
                samples: audio::f32_to_pcm16(&head),
                sample_rate: self.sample_rate,
            });
        } else {
            debug!(
                discarded_ms = audio::samples_to_ms(head.len(), self.sample_rate),
                "segment below minimum speech duration discarded"
            );
        }
    }

    /// Bound memory under long leading non-speech: keep only the most
    /// recent frame's worth of classified audio (plus the unclassified
    /// tail) and start classification over with a fresh cache. Only legal
    /// while no speech has been recorded.
    fn truncate_leading(&mut self) {
        let keep_from = self.cursor.saturating_sub(self.frame_samples);
        if keep_from == 0 {
            return;
        }
        self.buffer.drain(..keep_from);
        self.cursor = 0;
        self.classifier.reset();
        trace!(
            kept_ms = self.buffered_ms(),
            "truncated leading non-speech"
        );
    }

    fn reset_tracking(&mut self) {
        self.cursor = 0;
        self.last_speech_end_ms = None;
        self.intervals.clear();
        self.classifier.reset();
    }
}

/// Pipeline stage wrapping the segmentation state machine.
///
/// Input chunks are arbitrary-length PCM16 byte blocks; a chunk may split a
/// sample, so the odd byte is carried into the next chunk. While the
/// should-listen gate is closed the stage discards input (it is the
/// system's own playback echo) without touching buffered state.
pub struct SegmenterStage {
    segmenter: Segmenter,
    carry: Option<u8>,
}

impl SegmenterStage {
    /// Create the stage around a configured segmenter.
    pub fn new(segmenter: Segmenter) -> Self {
        Self {
            segmenter,
            carry: None,
        }
    }
}

#[async_trait]
impl Stage for SegmenterStage {
    type Input = Bytes;
    type Output = Segment;

    fn name(&self) -> &'static str {
        "segmenter"
    }

    async fn process(&mut self, chunk: Bytes, ctx: &StageContext<Segment>) -> Result<()> {
        if !ctx.coordination().is_listening() {
            trace!("listen gate closed, chunk discarded");
            // The audio is dropped but the byte parity of the wire stream
            // must persist, or samples after the gate reopens would pair
            // across the wrong byte boundary.
            if (self.carry.is_some() as usize + chunk.len()) % 2 == 1 {
                self.carry = chunk.last().copied().or(self.carry);
            } else {
                self.carry = None;
            }
            return Ok(());
        }

        let joined;
        let bytes: &[u8] = match self.carry.take() {
            Some(odd) => {
                let mut data = Vec::with_capacity(chunk.len() + 1);
                data.push(odd);
                data.extend_from_slice(&chunk);
                joined = data;
                &joined
            }
            None => &chunk,
        };
        let whole_len = bytes.len() & !1;
        self.carry = bytes[whole_len..].first().copied();

        let samples = audio::pcm16_to_f32(&bytes[..whole_len]);
        for segment in self.segmenter.push_samples(&samples)? {
            info!(duration_ms = segment.duration_ms(), "speech segment detected");
            ctx.emit(segment);
        }
        Ok(())
    }

    async fn cleanup(&mut self, ctx: &StageContext<Segment>) -> Result<()> {
        if let Some(segment) = self.segmenter.flush()? {
            info!(
                duration_ms = segment.duration_ms(),
                "final speech segment flushed"
            );
            ctx.emit(segment);
        }
        Ok(())
    }
}
