//! Language model integration: prompts in, framed reply fragments out.

pub mod api;

use crate::error::Result;
use crate::pipeline::messages::TurnControl;
use crate::pipeline::stage::{Stage, StageContext};
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

pub use api::OpenAiChatModel;

/// Callback receiving reply fragments as they are generated. The lifetime
/// lets callers pass closures that borrow local state.
pub type FragmentSink<'a> = dyn Fn(String) + Send + Sync + 'a;

/// Generates a reply to one prompt, streaming fragments through a sink.
///
/// Implementations own the conversation history, so the method takes
/// `&mut self` and only the newest prompt crosses the seam.
#[async_trait]
pub trait LanguageModel: Send {
    /// Generate a reply for the prompt, invoking `emit` for each fragment
    /// in order. Returns the complete reply text.
    async fn reply(&mut self, prompt: &str, emit: &FragmentSink<'_>) -> Result<String>;
}

/// Pipeline stage framing each model reply as `Start`, `Text` fragments,
/// then `End`.
///
/// The framing is balanced even when generation fails part-way: once
/// `Start` has gone out, `End` always follows, so the synthesis stage can
/// never be left waiting on an open utterance.
pub struct LlmStage {
    model: Box<dyn LanguageModel>,
}

impl LlmStage {
    /// Create the stage around a language model.
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Stage for LlmStage {
    type Input = String;
    type Output = TurnControl;

    fn name(&self) -> &'static str {
        "llm"
    }

    async fn process(&mut self, prompt: String, ctx: &StageContext<TurnControl>) -> Result<()> {
        info!(chars = prompt.len(), "prompt: \"{prompt}\"");
        let started = Instant::now();

        ctx.emit(TurnControl::Start);
        let fragment_ctx = ctx.clone();
        let emit = move |fragment: String| fragment_ctx.emit(TurnControl::Text(fragment));
        let result = self.model.reply(&prompt, &emit).await;
        ctx.emit(TurnControl::End);

        let reply = result?;
        info!(
            chars = reply.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "reply complete"
        );
        Ok(())
    }
}
