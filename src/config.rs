//! Configuration types for the voice-dialogue pipeline.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, one per server process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Audio stream settings.
    pub audio: AudioConfig,
    /// Voice-activity segmentation settings.
    pub segmenter: SegmenterConfig,
    /// Speech recognition collaborator settings.
    pub asr: AsrConfig,
    /// Language model collaborator settings.
    pub llm: LlmConfig,
    /// Speech synthesis collaborator settings.
    pub tts: TtsConfig,
    /// TCP server settings.
    pub server: ServerConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

/// Audio stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz for both directions of the byte stream.
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
        }
    }
}

/// Voice-activity segmentation configuration, fixed per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Classification frame size in ms.
    pub frame_ms: u64,
    /// Silence after speech required to close a segment, in ms.
    pub min_silence_ms: u64,
    /// Buffered leading non-speech beyond which the buffer is truncated, in ms.
    pub truncate_after_ms: u64,
    /// Hard cutoff for one segment, in ms.
    pub max_segment_ms: u64,
    /// Minimum accumulated speech for a segment to be emitted, in ms.
    pub min_speech_ms: u64,
    /// RMS threshold for the built-in energy classifier.
    pub energy_threshold: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_ms: 240,
            min_silence_ms: 100,
            truncate_after_ms: 1440,
            max_segment_ms: 120_000,
            min_speech_ms: 300,
            energy_threshold: 0.01,
        }
    }
}

/// Speech recognition collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    pub endpoint: String,
    /// API key, sent as a bearer token when non-empty.
    pub api_key: String,
    /// Model name passed with the upload.
    pub model: String,
    /// BCP-47 language hint, empty for auto-detection.
    pub language: String,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/v1/audio/transcriptions".to_owned(),
            api_key: String::new(),
            model: "whisper-1".to_owned(),
            language: String::new(),
        }
    }
}

/// Language model collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (the `/chat/completions` path is appended).
    pub base_url: String,
    /// API key, sent as a bearer token when non-empty.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Stream reply fragments via SSE instead of waiting for the full reply.
    pub stream: bool,
    /// System prompt prepended to every conversation.
    pub system_prompt: String,
    /// Number of past user/assistant exchanges kept as context.
    pub history_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_owned(),
            api_key: String::new(),
            model: "qwen2.5:7b".to_owned(),
            stream: true,
            system_prompt: "You are a helpful voice assistant. Keep replies short and speakable."
                .to_owned(),
            history_size: 8,
        }
    }
}

/// Speech synthesis collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Speech endpoint returning a streamed raw-PCM body.
    pub endpoint: String,
    /// API key, sent as a bearer token when non-empty.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Voice identifier.
    pub voice: String,
    /// Requested PCM sample rate.
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.siliconflow.cn/v1/audio/speech".to_owned(),
            api_key: String::new(),
            model: "FunAudioLLM/CosyVoice2-0.5B".to_owned(),
            voice: "FunAudioLLM/CosyVoice2-0.5B:alex".to_owned(),
            sample_rate: 16_000,
        }
    }
}

/// TCP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 65_432,
        }
    }
}
