//! Pipeline assembly and lifecycle.
//!
//! One [`Pipeline`] instance is one end-to-end dialogue chain: raw audio
//! bytes in, synthesized reply audio out, with four stages wired through
//! typed queues. Lifecycle is `new → build → start → stop`; calls out of
//! order are contract violations and fail without touching the process.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::llm::{LanguageModel, LlmStage};
use crate::pipeline::coordination::Coordination;
use crate::pipeline::queue::{QueueReceiver, QueueSender, queue};
use crate::pipeline::stage::{ExecutionMode, StageRunner};
use crate::segmenter::classifier::FrameClassifier;
use crate::segmenter::{Segmenter, SegmenterStage};
use crate::stt::{RecognizerStage, SpeechRecognizer};
use crate::tts::{SpeechSynthesizer, SynthesisStage};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// The pluggable processing backends one pipeline is built around.
pub struct Collaborators {
    /// Speech/silence frame classifier for the segmenter.
    pub classifier: Box<dyn FrameClassifier>,
    /// Speech-to-text backend.
    pub recognizer: Box<dyn SpeechRecognizer>,
    /// Reply generation backend.
    pub language_model: Box<dyn LanguageModel>,
    /// Text-to-speech backend.
    pub synthesizer: Box<dyn SpeechSynthesizer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Built,
    Running,
    Stopped,
}

/// A fully wired dialogue pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    coordination: Arc<Coordination>,
    lifecycle: Lifecycle,
    /// Head of the chain; also used to inject the shutdown sentinel.
    head: Option<QueueSender<Bytes>>,
    /// Tail of the chain, handed out once.
    tail: Option<QueueReceiver<Bytes>>,
    /// Stage bodies built but not yet spawned.
    pending: Vec<BoxFuture<'static, ()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Create an unwired pipeline for the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            coordination: Coordination::new(),
            lifecycle: Lifecycle::Created,
            head: None,
            tail: None,
            pending: Vec::new(),
            workers: Vec::new(),
        }
    }

    /// Wire stages and queues around the collaborators. Must be called
    /// exactly once, before [`start`](Self::start).
    pub fn build(&mut self, collaborators: Collaborators) -> Result<()> {
        if self.lifecycle != Lifecycle::Created {
            return Err(PipelineError::Pipeline(format!(
                "build called in state {:?}",
                self.lifecycle
            )));
        }

        let (audio_in_tx, audio_in_rx) = queue::<Bytes>();
        let (segment_tx, segment_rx) = queue();
        let (prompt_tx, prompt_rx) = queue();
        let (reply_tx, reply_rx) = queue();
        let (audio_out_tx, audio_out_rx) = queue();

        let segmenter = Segmenter::new(
            self.config.segmenter.clone(),
            self.config.audio.sample_rate,
            collaborators.classifier,
        );

        let segmenter_runner = StageRunner::new(
            SegmenterStage::new(segmenter),
            ExecutionMode::Synchronous,
            Arc::clone(&self.coordination),
        )
        .with_input(audio_in_rx)
        .with_output(segment_tx);

        let recognizer_runner = StageRunner::new(
            RecognizerStage::new(collaborators.recognizer),
            ExecutionMode::Synchronous,
            Arc::clone(&self.coordination),
        )
        .with_input(segment_rx)
        .with_output(prompt_tx);

        let llm_runner = StageRunner::new(
            LlmStage::new(collaborators.language_model),
            ExecutionMode::Synchronous,
            Arc::clone(&self.coordination),
        )
        .with_input(prompt_rx)
        .with_output(reply_tx);

        let synthesis_runner = StageRunner::new(
            SynthesisStage::new(collaborators.synthesizer),
            ExecutionMode::Asynchronous,
            Arc::clone(&self.coordination),
        )
        .with_input(reply_rx)
        .with_output(audio_out_tx);

        self.pending = vec![
            Box::pin(segmenter_runner.run()),
            Box::pin(recognizer_runner.run()),
            Box::pin(llm_runner.run()),
            Box::pin(synthesis_runner.run()),
        ];
        self.head = Some(audio_in_tx);
        self.tail = Some(audio_out_rx);
        self.lifecycle = Lifecycle::Built;
        debug!(stages = self.pending.len(), "pipeline wired");
        Ok(())
    }

    /// Spawn one worker task per stage.
    pub fn start(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Built {
            return Err(PipelineError::Pipeline(format!(
                "start called in state {:?}",
                self.lifecycle
            )));
        }
        self.workers = self.pending.drain(..).map(tokio::spawn).collect();
        self.lifecycle = Lifecycle::Running;
        info!(
            workers = self.workers.len(),
            session = %self.coordination.session_id(),
            "pipeline started"
        );
        Ok(())
    }

    /// Shut the pipeline down: raise the stop flag, push a sentinel into
    /// the head queue, and wait for every worker to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Running {
            return Err(PipelineError::Pipeline(format!(
                "stop called in state {:?}",
                self.lifecycle
            )));
        }
        self.coordination.request_stop();
        if let Some(head) = self.head.take() {
            head.send_sentinel();
        }
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!(error = %e, "stage worker panicked");
            }
        }
        self.lifecycle = Lifecycle::Stopped;
        info!(session = %self.coordination.session_id(), "pipeline stopped");
        Ok(())
    }

    /// Producer handle for incoming raw audio. Available once built.
    pub fn input(&self) -> Result<QueueSender<Bytes>> {
        self.head
            .clone()
            .ok_or_else(|| PipelineError::Pipeline("pipeline has no input yet".to_owned()))
    }

    /// Consumer handle for outgoing reply audio. Yielded exactly once.
    pub fn take_output(&mut self) -> Result<QueueReceiver<Bytes>> {
        self.tail
            .take()
            .ok_or_else(|| PipelineError::Pipeline("pipeline output already taken".to_owned()))
    }

    /// The coordination state shared with every stage.
    pub fn coordination(&self) -> Arc<Coordination> {
        Arc::clone(&self.coordination)
    }
}
