//! Speech recognition: turning segmented utterances into text.

pub mod http;

use crate::error::Result;
use crate::pipeline::messages::Segment;
use crate::pipeline::stage::{Stage, StageContext};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

pub use http::HttpRecognizer;

/// Transcribes one speech segment to text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe the segment. An empty string means no speech was
    /// recognized.
    async fn transcribe(&self, segment: &Segment) -> Result<String>;
}

/// Pipeline stage feeding segments through a [`SpeechRecognizer`].
///
/// Blank transcriptions are dropped here so downstream stages only ever
/// see prompts worth answering.
pub struct RecognizerStage {
    recognizer: Box<dyn SpeechRecognizer>,
}

impl RecognizerStage {
    /// Create the stage around a recognizer.
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl Stage for RecognizerStage {
    type Input = Segment;
    type Output = String;

    fn name(&self) -> &'static str {
        "recognizer"
    }

    async fn process(&mut self, segment: Segment, ctx: &StageContext<String>) -> Result<()> {
        let started = Instant::now();
        let duration_ms = segment.duration_ms();
        let text = self.recognizer.transcribe(&segment).await?;
        let text = text.trim();

        if text.is_empty() {
            debug!(duration_ms, "segment produced no transcription, dropped");
            return Ok(());
        }

        info!(
            duration_ms,
            latency_ms = started.elapsed().as_millis() as u64,
            "transcribed: \"{text}\""
        );
        ctx.emit(text.to_owned());
        Ok(())
    }
}
