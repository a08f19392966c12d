//! OpenAI-compatible `/audio/transcriptions` client.

use crate::config::AsrConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::messages::Segment;
use crate::stt::SpeechRecognizer;
use async_trait::async_trait;
use std::io::Cursor;
use tracing::debug;

/// Speech recognizer backed by a Whisper-style HTTP transcription API.
///
/// Segments are uploaded as in-memory WAV files via multipart form data.
pub struct HttpRecognizer {
    config: AsrConfig,
    client: reqwest::Client,
}

impl HttpRecognizer {
    /// Create a recognizer for the configured endpoint.
    pub fn new(config: AsrConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

/// Encode PCM16 samples as a complete WAV file in memory.
fn wav_bytes(segment: &Segment) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: segment.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| PipelineError::Audio(format!("WAV header: {e}")))?;
    for &sample in &segment.samples {
        writer
            .write_sample(sample)
            .map_err(|e| PipelineError::Audio(format!("WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::Audio(format!("WAV finalize: {e}")))?;
    Ok(cursor.into_inner())
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
impl SpeechRecognizer for HttpRecognizer {
    async fn transcribe(&self, segment: &Segment) -> Result<String> {
        let wav = wav_bytes(segment)?;
        debug!(bytes = wav.len(), "uploading segment for transcription");

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("segment.wav")
            .mime_str("audio/wav")?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.model.clone());
        if !self.config.language.is_empty() {
            form = form.text("language", self.config.language.clone());
        }

        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Asr(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let parsed: serde_json::Value = response.json().await?;
        let text = parsed
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| PipelineError::Asr("response missing \"text\" field".to_owned()))?;
        Ok(text.to_owned())
    }
}
