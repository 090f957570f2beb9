use crate::config::{Config, ModelProvider, ModelSettings};
use crate::error::ProviderError;
use crate::events::ChatMessage;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Events emitted during LLM streaming
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Text delta from streaming response
    TextDelta(String),
    /// Complete response text, sent once before `StreamComplete`
    ResponseComplete(String),
    /// Stream completed
    StreamComplete,
    /// Error occurred
    Error(String),
}

/// Request to send to LLM
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<LlmMessage>,
}

/// Message in conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for LlmMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

impl LlmRequest {
    pub fn new(messages: Vec<LlmMessage>) -> Self {
        Self { messages }
    }

    pub fn from_history(system: Option<&str>, history: &[ChatMessage]) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system {
            messages.push(LlmMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.extend(history.iter().map(LlmMessage::from));
        Self { messages }
    }
}

/// Uniform invoke/stream surface over a hosted model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for run tags
    fn model_name(&self) -> &str;

    /// Single request, whole response
    async fn invoke(&self, request: LlmRequest) -> Result<String, ProviderError>;

    /// Streamed response; the receiver ends after `StreamComplete` or `Error`
    async fn stream(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>, ProviderError>;
}

/// Request/response shape spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `/v1/chat/completions` (OpenAI, OpenRouter, Mistral, xAI)
    ChatCompletions,
    /// `/v1/messages`
    AnthropicMessages,
}

impl WireFormat {
    pub fn for_provider(provider_id: &str) -> Result<Self, ProviderError> {
        match provider_id.to_lowercase().as_str() {
            "openai" | "openrouter" | "mistral" | "xai" => Ok(WireFormat::ChatCompletions),
            "anthropic" => Ok(WireFormat::AnthropicMessages),
            other => Err(ProviderError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// LLM client for a hosted provider
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    provider_id: String,
    provider: ModelProvider,
    api_key: String,
    settings: ModelSettings,
    format: WireFormat,
}

impl LlmClient {
    /// Build a client for the configured default provider
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider = config
            .current_provider()
            .ok_or_else(|| ProviderError::UnsupportedProvider(config.default_provider.clone()))?;
        Self::new(&config.default_provider, provider.clone(), config.model.clone())
    }

    pub fn new(
        provider_id: &str,
        provider: ModelProvider,
        settings: ModelSettings,
    ) -> Result<Self, ProviderError> {
        let format = WireFormat::for_provider(provider_id)?;
        let api_key = provider
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::MissingApiKey(provider_id.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            provider_id: provider_id.to_string(),
            provider,
            api_key,
            settings,
            format,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.provider.base_url.trim_end_matches('/');
        match self.format {
            WireFormat::ChatCompletions => format!("{}/v1/chat/completions", base),
            WireFormat::AnthropicMessages => format!("{}/v1/messages", base),
        }
    }

    fn payload(&self, request: &LlmRequest, stream: bool) -> Value {
        match self.format {
            WireFormat::ChatCompletions => serde_json::json!({
                "model": self.settings.model,
                "messages": request.messages,
                "stream": stream,
                "temperature": self.settings.temperature,
                "max_tokens": self.settings.max_tokens,
            }),
            WireFormat::AnthropicMessages => {
                // Anthropic takes the system prompt outside the message list
                let mut system = Vec::new();
                let mut messages = Vec::new();
                for msg in &request.messages {
                    if msg.role == "system" {
                        system.push(msg.content.as_str());
                    } else {
                        messages.push(msg);
                    }
                }
                let mut payload = serde_json::json!({
                    "model": self.settings.model,
                    "messages": messages,
                    "stream": stream,
                    "temperature": self.settings.temperature,
                    "max_tokens": self.settings.max_tokens,
                });
                if !system.is_empty() {
                    payload["system"] = Value::String(system.join("\n\n"));
                }
                payload
            }
        }
    }

    async fn send(&self, request: &LlmRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let builder = self.client.post(self.endpoint()).json(&self.payload(request, stream));
        let builder = match self.format {
            WireFormat::ChatCompletions => {
                builder.header("Authorization", format!("Bearer {}", self.api_key))
            }
            WireFormat::AnthropicMessages => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
        };

        tracing::debug!(provider = %self.provider_id, model = %self.settings.model, stream, "sending model request");
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.provider.name, status.as_u16(), body));
        }
        Ok(response)
    }

    /// Read a streamed response and forward events until the provider is done
    async fn process_stream(
        format: WireFormat,
        response: reqwest::Response,
        tx: mpsc::Sender<LlmEvent>,
    ) -> Result<(), ProviderError> {
        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut assistant_text = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in lines.push(&chunk) {
                if Self::handle_line(format, &line, &mut assistant_text, &tx).await? {
                    return Self::finish_stream(assistant_text, &tx).await;
                }
            }
        }

        // Flush a trailing line that arrived without a newline
        if let Some(line) = lines.finish() {
            Self::handle_line(format, &line, &mut assistant_text, &tx).await?;
        }
        Self::finish_stream(assistant_text, &tx).await
    }

    /// Returns true once the stream is done (or nobody is listening)
    async fn handle_line(
        format: WireFormat,
        line: &str,
        assistant_text: &mut String,
        tx: &mpsc::Sender<LlmEvent>,
    ) -> Result<bool, ProviderError> {
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Ok(false);
        };
        let chunk = match format {
            WireFormat::ChatCompletions => parse_chat_completions_data(data),
            WireFormat::AnthropicMessages => parse_anthropic_data(data),
        };
        match chunk {
            SseChunk::Delta(text) => {
                assistant_text.push_str(&text);
                Ok(tx.send(LlmEvent::TextDelta(text)).await.is_err())
            }
            SseChunk::Done => Ok(true),
            SseChunk::Error(message) => Err(ProviderError::Stream(message)),
            SseChunk::Ignore => Ok(false),
        }
    }

    async fn finish_stream(assistant_text: String, tx: &mpsc::Sender<LlmEvent>) -> Result<(), ProviderError> {
        let _ = tx.send(LlmEvent::ResponseComplete(assistant_text)).await;
        let _ = tx.send(LlmEvent::StreamComplete).await;
        Ok(())
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn invoke(&self, request: LlmRequest) -> Result<String, ProviderError> {
        let response = self.send(&request, false).await?;
        let body: Value = response.json().await?;
        extract_completion(self.format, &body)
    }

    async fn stream(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>, ProviderError> {
        let response = self.send(&request, true).await?;
        let (tx, rx) = mpsc::channel(256);
        let format = self.format;

        tokio::spawn(async move {
            let tx_err = tx.clone();
            if let Err(e) = Self::process_stream(format, response, tx).await {
                tracing::warn!(error = %e, "model stream failed");
                let _ = tx_err.send(LlmEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }
}

/// Map a non-success HTTP status to a provider error
pub fn status_error(provider: &str, status: u16, body: String) -> ProviderError {
    let provider = provider.to_string();
    match status {
        401 | 403 => ProviderError::Auth { provider, message: body },
        429 => ProviderError::Quota { provider, message: body },
        _ => ProviderError::Api {
            provider,
            status,
            message: body,
        },
    }
}

/// Pull the assistant text out of a non-streaming response body
pub fn extract_completion(format: WireFormat, body: &Value) -> Result<String, ProviderError> {
    match format {
        WireFormat::ChatCompletions => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".to_string())),
        WireFormat::AnthropicMessages => {
            let blocks = body
                .get("content")
                .and_then(Value::as_array)
                .ok_or_else(|| ProviderError::Malformed("missing content blocks".to_string()))?;
            Ok(blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""))
        }
    }
}

/// One decoded `data:` payload
#[derive(Debug, Clone, PartialEq)]
pub enum SseChunk {
    Delta(String),
    Done,
    Error(String),
    Ignore,
}

pub fn parse_chat_completions_data(data: &str) -> SseChunk {
    if data == "[DONE]" {
        return SseChunk::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return SseChunk::Ignore;
    };
    if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
        return SseChunk::Error(message.to_string());
    }
    match value.pointer("/choices/0/delta/content").and_then(Value::as_str) {
        Some(content) if !content.is_empty() => SseChunk::Delta(content.to_string()),
        _ => SseChunk::Ignore,
    }
}

pub fn parse_anthropic_data(data: &str) -> SseChunk {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return SseChunk::Ignore;
    };
    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(|text| SseChunk::Delta(text.to_string()))
            .unwrap_or(SseChunk::Ignore),
        Some("message_stop") => SseChunk::Done,
        Some("error") => SseChunk::Error(
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error")
                .to_string(),
        ),
        _ => SseChunk::Ignore,
    }
}

/// Splits a byte stream into complete lines without breaking UTF-8 sequences
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let err = WireFormat::for_provider("bedrock").unwrap_err();
        assert!(err.to_string().contains("bedrock"));
        assert_eq!(
            WireFormat::for_provider("OpenRouter").unwrap(),
            WireFormat::ChatCompletions
        );
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let config = Config::default();
        let provider = config.current_provider().unwrap().clone();
        let result = LlmClient::new("anthropic", provider, ModelSettings::default());
        assert!(matches!(result, Err(ProviderError::MissingApiKey(p)) if p == "anthropic"));
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(status_error("OpenAI", 401, String::new()), ProviderError::Auth { .. }));
        assert!(matches!(status_error("OpenAI", 403, String::new()), ProviderError::Auth { .. }));
        assert!(matches!(status_error("OpenAI", 429, String::new()), ProviderError::Quota { .. }));
        assert!(matches!(
            status_error("OpenAI", 502, "bad gateway".to_string()),
            ProviderError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn chat_completions_stream_lines() {
        assert_eq!(parse_chat_completions_data("[DONE]"), SseChunk::Done);
        assert_eq!(
            parse_chat_completions_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseChunk::Delta("Hel".to_string())
        );
        assert_eq!(
            parse_chat_completions_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            SseChunk::Ignore
        );
        assert_eq!(
            parse_chat_completions_data(r#"{"error":{"message":"overloaded"}}"#),
            SseChunk::Error("overloaded".to_string())
        );
        assert_eq!(parse_chat_completions_data("not json"), SseChunk::Ignore);
    }

    #[test]
    fn anthropic_stream_lines() {
        assert_eq!(
            parse_anthropic_data(
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            ),
            SseChunk::Delta("Hi".to_string())
        );
        assert_eq!(parse_anthropic_data(r#"{"type":"message_stop"}"#), SseChunk::Done);
        assert_eq!(parse_anthropic_data(r#"{"type":"ping"}"#), SseChunk::Ignore);
        assert_eq!(
            parse_anthropic_data(r#"{"type":"error","error":{"message":"Overloaded"}}"#),
            SseChunk::Error("Overloaded".to_string())
        );
    }

    #[test]
    fn completion_bodies() {
        let body = serde_json::json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_completion(WireFormat::ChatCompletions, &body).unwrap(), "hello");

        let body = serde_json::json!({"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        assert_eq!(extract_completion(WireFormat::AnthropicMessages, &body).unwrap(), "ab");

        let body = serde_json::json!({"id": "x"});
        assert!(matches!(
            extract_completion(WireFormat::ChatCompletions, &body),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn line_buffer_keeps_split_utf8_intact() {
        let mut buffer = SseLineBuffer::default();
        let text = "data: héllo\n".as_bytes();
        // split inside the two-byte 'é'
        let (a, b) = text.split_at(8);
        assert!(buffer.push(a).is_empty());
        assert_eq!(buffer.push(b), vec!["data: héllo".to_string()]);

        buffer.push(b"data: [DONE]");
        assert_eq!(buffer.finish(), Some("data: [DONE]".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn history_request_puts_system_first() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let request = LlmRequest::from_history(Some("be brief"), &history);
        let roles: Vec<_> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }
}
