//! Voxpipe: a streaming voice-dialogue pipeline server.
//!
//! Raw PCM audio arrives over a socket and flows through a cascaded
//! pipeline: Segmenter → STT → LLM → TTS → synthesized reply audio.
//!
//! # Architecture
//!
//! The pipeline is built from independent stages connected by typed
//! queues, one worker task per stage:
//! - **Segmenter**: Detects utterance boundaries using frame-level
//!   speech classification
//! - **STT**: Transcribes segments via an OpenAI-compatible HTTP API
//! - **LLM**: Generates replies via chat completions, optionally
//!   streamed
//! - **TTS**: Voices replies as streamed PCM and gates the microphone
//!   while the system speaks
//!
//! End-of-stream travels through the queues as a tagged sentinel, so
//! shutdown cascades stage by stage in order.

pub mod audio;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod segmenter;
pub mod server;
pub mod stt;
pub mod tts;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::coordinator::{Collaborators, Pipeline};
