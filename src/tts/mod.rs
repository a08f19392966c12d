//! Speech synthesis: framed reply text in, playable PCM chunks out.

pub mod http;

use crate::error::Result;
use crate::pipeline::messages::TurnControl;
use crate::pipeline::stage::{Stage, StageContext};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use http::HttpSynthesizer;

/// Poll interval while holding the gate closed for outbound delivery.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Callback receiving synthesized audio chunks as they arrive. The
/// lifetime lets callers pass closures that borrow local state.
pub type ChunkSink<'a> = dyn Fn(Bytes) + Send + Sync + 'a;

/// Renders one utterance of text as streamed PCM audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize the text, invoking `emit` for each audio chunk in
    /// playback order.
    async fn synthesize(&self, text: &str, emit: &ChunkSink<'_>) -> Result<()>;
}

/// Pipeline stage assembling framed reply fragments and voicing them.
///
/// Fragments between `Start` and `End` are buffered; at `End` the whole
/// utterance is synthesized and the audio streamed downstream. The listen
/// gate closes on the first outgoing chunk so the microphone does not
/// hear the system's own voice, and reopens only after every queued chunk
/// has been taken downstream, including when synthesis fails partway.
pub struct SynthesisStage {
    synthesizer: Box<dyn SpeechSynthesizer>,
    /// Text of the utterance currently being framed, if one is open.
    pending: Option<String>,
}

impl SynthesisStage {
    /// Create the stage around a synthesizer.
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            pending: None,
        }
    }

    async fn voice(&mut self, text: String, ctx: &StageContext<Bytes>) -> Result<()> {
        let started = Instant::now();
        let gated = AtomicBool::new(false);
        let emit = |chunk: Bytes| {
            if !gated.swap(true, Ordering::SeqCst) {
                ctx.coordination().set_listening(false);
                info!("playback starting, listen gate closed");
            }
            ctx.emit(chunk);
        };

        let result = self.synthesizer.synthesize(&text, &emit).await;

        if gated.load(Ordering::SeqCst) {
            // A failed stream has still queued real audio, so the gate
            // stays closed until the output queues have drained.
            while ctx.pending() > 0 && !ctx.coordination().stop_requested() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            ctx.coordination().set_listening(true);
            debug!("listen gate reopened");
        }
        result?;
        info!(
            chars = text.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "utterance synthesized"
        );
        Ok(())
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    type Input = TurnControl;
    type Output = Bytes;

    fn name(&self) -> &'static str {
        "synthesis"
    }

    async fn process(&mut self, control: TurnControl, ctx: &StageContext<Bytes>) -> Result<()> {
        match control {
            TurnControl::Start => {
                if self.pending.is_some() {
                    warn!("utterance restarted before the previous one ended");
                }
                self.pending = Some(String::new());
            }
            TurnControl::Text(fragment) => match self.pending.as_mut() {
                Some(text) => text.push_str(&fragment),
                None => warn!("reply fragment outside an utterance, dropped"),
            },
            TurnControl::End => {
                let Some(text) = self.pending.take() else {
                    warn!("utterance end without start");
                    return Ok(());
                };
                if text.trim().is_empty() {
                    debug!("empty utterance skipped");
                    return Ok(());
                }
                self.voice(text, ctx).await?;
            }
        }
        Ok(())
    }
}
