//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use crate::config::LlmConfig;
use async_trait::async_trait;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider talking to `config.base_url`.
    pub fn new(config: &LlmConfig) -> Self {
        Self::with_base_url(&config.base_url)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(&LlmConfig::default())
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat<'a>(
        &'a self,
        request: ChatRequest,
        mut callback: Box<dyn FnMut(ChatResponse) + Send + 'a>,
    ) -> Result<()> {
        let url = format!("{}/api/chat", self.base_url);

        let ollama_request = OllamaChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                Some(opts)
            },
            stream: true,
        };

        debug!(model = %request.model, message_count = request.messages.len(), "Sending chat request to Ollama");
        let response = self.http_client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                if let Some(response) = parse_chat_line(&line)? {
                    callback(response);
                }
            }
        }

        // Last line may arrive without a trailing newline
        if let Some(response) = parse_chat_line(&buffer)? {
            callback(response);
        }

        Ok(())
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = EmbedRequest {
            model: model.to_string(),
            input: text.to_string(),
        };

        let response = self.http_client
            .post(&url)
            .json(&embed_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let embed_response = response.json::<EmbedResponse>().await?;

        embed_response.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("No embeddings returned".to_string()))
    }
}

/// Decodes one line of Ollama's newline-delimited chat stream.
///
/// Blank lines yield `None`. A line carrying an `error` field is an API error.
fn parse_chat_line(line: &[u8]) -> Result<Option<ChatResponse>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk = match serde_json::from_str::<OllamaChatChunk>(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable chat stream line");
            return Ok(None);
        }
    };

    if let Some(error) = chunk.error {
        return Err(ProviderError::Api(error));
    }

    Ok(Some(ChatResponse {
        model: chunk.model,
        content: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<String, serde_json::Value>>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_line_content() {
        let line = br#"{"model":"qwen3:0.6b","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let response = parse_chat_line(line).unwrap().unwrap();

        assert_eq!(response.model, "qwen3:0.6b");
        assert_eq!(response.content, "Hel");
        assert!(!response.done);
    }

    #[test]
    fn test_parse_chat_line_blank() {
        assert!(parse_chat_line(b"\n").unwrap().is_none());
        assert!(parse_chat_line(b"").unwrap().is_none());
    }

    #[test]
    fn test_parse_chat_line_error() {
        let line = br#"{"error":"model 'nope' not found"}"#;
        let result = parse_chat_line(line);
        assert!(matches!(result, Err(ProviderError::Api(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OllamaProvider::with_base_url("http://localhost:11434/");
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    #[ignore] // Requires Ollama running locally
    async fn test_ollama_complete() {
        let provider = OllamaProvider::default();
        let request = ChatRequest::new(LlmConfig::default().model, vec![Message::user("Say hi")]);
        let reply = provider.complete(request).await.unwrap();
        assert!(!reply.is_empty());
    }
}
