//! HTTP transport to the model endpoint.
//!
//! The retrying client and chat never talk to `reqwest` directly; they go
//! through [`ModelTransport`]. [`OllamaTransport`] is the production
//! implementation. Tests and embedders can inject their own through
//! [`crate::config::ExtractionConfigBuilder::transport`], e.g. to replay
//! recorded responses or to add caching in front of the model.

use crate::config::ExtractionConfig;
use crate::error::{InvoiceError, TransportError};
use crate::prompts::EXTRACTION_PROMPT;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Raw response body chunks as they arrive.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Sends one streamed request and hands back the response body.
///
/// Implementations must return `Err` for non-success statuses; the body
/// stream is only for successful responses.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn send(&self, request: &ModelRequest) -> Result<ByteStream, TransportError>;
}

/// A request to the model service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelRequest {
    /// Multimodal extraction, posted to `/api/chat`.
    Chat(ChatRequest),
    /// Plain-text question answering, posted to `/api/generate`.
    Generate(GenerateRequest),
}

impl ModelRequest {
    /// Endpoint path relative to the service base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ModelRequest::Chat(_) => "/api/chat",
            ModelRequest::Generate(_) => "/api/generate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64 images without a data-URL prefix.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl RequestOptions {
    fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl ChatRequest {
    /// Extraction request for one page image (already cleaned base64).
    pub fn extraction(config: &ExtractionConfig, image_base64: String) -> Self {
        let prompt = config
            .extraction_prompt
            .as_deref()
            .unwrap_or(EXTRACTION_PROMPT);
        Self {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
                images: vec![image_base64],
            }],
            stream: true,
            options: RequestOptions::from_config(config),
        }
    }
}

impl GenerateRequest {
    pub fn chat(config: &ExtractionConfig, prompt: String) -> Self {
        Self {
            model: config.chat_model_name().to_string(),
            prompt,
            stream: true,
            options: RequestOptions::from_config(config),
        }
    }
}

/// Ollama-compatible HTTP transport.
#[derive(Debug, Clone)]
pub struct OllamaTransport {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaTransport {
    /// Build a transport for `base_url`, e.g. `http://localhost:11434`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, InvoiceError> {
        Self::with_connect_timeout(base_url, None)
    }

    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, InvoiceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = connect_timeout {
            builder = builder.connect_timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| InvoiceError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelTransport for OllamaTransport {
    async fn send(&self, request: &ModelRequest) -> Result<ByteStream, TransportError> {
        let url = format!("{}{}", self.base_url, request.path());
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::Stream(e.to_string()))
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_request_body_shape() {
        let config = ExtractionConfig::default();
        let req = ModelRequest::Chat(ChatRequest::extraction(&config, "QUJD".into()));
        assert_eq!(req.path(), "/api/chat");

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama3.2-vision");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["images"][0], "QUJD");
        assert_eq!(json["options"]["max_tokens"], 2048);
        assert!(json["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Part 2 - Additional Information:"));
    }

    #[test]
    fn generate_request_prefers_chat_model() {
        let config = ExtractionConfig::builder()
            .chat_model("llama3.1")
            .build()
            .unwrap();
        let req = ModelRequest::Generate(GenerateRequest::chat(&config, "hi".into()));
        assert_eq!(req.path(), "/api/generate");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama3.1");
        assert_eq!(json["prompt"], "hi");
        assert!(json.get("messages").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let t = OllamaTransport::new("http://localhost:11434/").unwrap();
        assert_eq!(t.base_url(), "http://localhost:11434");
    }
}
