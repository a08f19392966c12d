//! OpenAI-compatible `/audio/speech` client streaming raw PCM.

use crate::config::TtsConfig;
use crate::error::{PipelineError, Result};
use crate::tts::{ChunkSink, SpeechSynthesizer};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

/// Speech synthesizer backed by a CosyVoice-style HTTP speech API.
///
/// The endpoint is asked for `pcm` output and the response body is
/// forwarded chunk by chunk as it streams in, so playback can begin
/// before synthesis finishes.
pub struct HttpSynthesizer {
    config: TtsConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    /// Create a synthesizer for the configured endpoint.
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Extract an error message from an OpenAI-style error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, emit: &ChunkSink<'_>) -> Result<()> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": "pcm",
            "sample_rate": self.config.sample_rate,
            "stream": true,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let mut total = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            total += chunk.len();
            emit(chunk);
        }

        debug!(bytes = total, "synthesis stream complete");
        Ok(())
    }
}
