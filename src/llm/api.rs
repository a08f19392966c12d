//! OpenAI-compatible `/chat/completions` client with bounded history.

use crate::config::LlmConfig;
use crate::error::{PipelineError, Result};
use crate::llm::{FragmentSink, LanguageModel};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::debug;

/// One chat turn in the request body.
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat model speaking the OpenAI chat-completions dialect, streaming via
/// SSE when configured.
///
/// Conversation history is kept here, bounded to the configured number of
/// user/assistant exchanges; the system prompt is re-sent with every
/// request.
pub struct OpenAiChatModel {
    config: LlmConfig,
    client: reqwest::Client,
    /// Alternating user/assistant turns, oldest first.
    history: Vec<ChatMessage>,
}

impl OpenAiChatModel {
    /// Create a chat model for the configured endpoint.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            history: Vec::new(),
        }
    }

    fn messages_for(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !self.config.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: self.config.system_prompt.clone(),
            });
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_owned(),
        });
        messages
    }

    fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.history.push(ChatMessage {
            role: "user",
            content: prompt.to_owned(),
        });
        self.history.push(ChatMessage {
            role: "assistant",
            content: reply.to_owned(),
        });
        let max_turns = self.config.history_size * 2;
        if self.history.len() > max_turns {
            self.history.drain(..self.history.len() - max_turns);
        }
    }

    async fn send(&self, prompt: &str) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": self.messages_for(prompt),
            "stream": self.config.stream,
        });

        let mut request = self.client.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Llm(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }
        Ok(response)
    }

    async fn reply_streamed(&self, prompt: &str, emit: &FragmentSink<'_>) -> Result<String> {
        let response = self.send(prompt).await?;
        let mut stream = response.bytes_stream();
        let mut lines = String::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            lines.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = lines.find('\n') {
                let line: String = lines.drain(..=pos).collect();
                if let Some(delta) = parse_sse_line(line.trim_end()) {
                    full.push_str(&delta);
                    emit(delta);
                }
            }
        }
        if let Some(delta) = parse_sse_line(lines.trim_end()) {
            full.push_str(&delta);
            emit(delta);
        }

        debug!(chars = full.len(), "stream complete");
        Ok(full)
    }

    async fn reply_whole(&self, prompt: &str, emit: &FragmentSink<'_>) -> Result<String> {
        let response = self.send(prompt).await?;
        let parsed: serde_json::Value = response.json().await?;
        let content = extract_message_content(&parsed)
            .ok_or_else(|| PipelineError::Llm("response missing message content".to_owned()))?;
        emit(content.clone());
        Ok(content)
    }
}

/// Extract the text delta from one SSE line of a streamed completion.
/// Returns `None` for non-data lines, `[DONE]`, and empty deltas.
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data == "[DONE]" {
        return None;
    }
    let parsed: serde_json::Value = serde_json::from_str(data).ok()?;
    let delta = parsed
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    (!delta.is_empty()).then(|| delta.to_owned())
}

/// Extract `choices[0].message.content` from a non-streamed completion.
fn extract_message_content(parsed: &serde_json::Value) -> Option<String> {
    parsed
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(String::from)
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
impl LanguageModel for OpenAiChatModel {
    async fn reply(&mut self, prompt: &str, emit: &FragmentSink<'_>) -> Result<String> {
        let reply = if self.config.stream {
            self.reply_streamed(prompt, emit).await?
        } else {
            self.reply_whole(prompt, emit).await?
        };
        self.record_exchange(prompt, &reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_line_with_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"index":0}]}"#;
        assert_eq!(parse_sse_line(line), Some("Hello".to_owned()));
    }

    #[test]
    fn sse_line_without_delta() {
        assert_eq!(parse_sse_line("data: [DONE]"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }

    #[test]
    fn whole_message_content_extracted() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_message_content(&body), Some("Hi there".to_owned()));
        assert_eq!(extract_message_content(&serde_json::json!({})), None);
    }

    #[test]
    fn history_is_bounded_to_configured_exchanges() {
        let config = LlmConfig {
            history_size: 2,
            ..LlmConfig::default()
        };
        let mut model = OpenAiChatModel::new(config);
        for i in 0..5 {
            model.record_exchange(&format!("q{i}"), &format!("a{i}"));
        }

        assert_eq!(model.history.len(), 4);
        assert_eq!(model.history[0].content, "q3");
        assert_eq!(model.history[3].content, "a4");
    }

    #[test]
    fn request_messages_lead_with_system_prompt() {
        let model = OpenAiChatModel::new(LlmConfig::default());
        let messages = model.messages_for("hello");
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages.last().map(|m| m.role), Some("user"));
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("hello"));
    }
}
