//! DeepSeek provider - AiProvider implementation over the OpenAI-compatible
//! chat completions API.
//!
//! Streams completions via SSE (`data:` lines carrying JSON chunks, closed
//! by a `data: [DONE]` marker).
//!
//! # Configuration
//!
//! ```ignore
//! let config = DeepSeekConfig::new(api_key)
//!     .with_model("deepseek-chat")
//!     .with_base_url("https://api.deepseek.com");
//!
//! let provider = DeepSeekProvider::new(config)?;
//! ```

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{AiProvider, ChatRequest, FragmentStream, ProviderError, ProviderInfo};

/// Configuration for the DeepSeek provider.
#[derive(Debug, Clone)]
pub struct DeepSeekConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model to use.
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Sampling temperature applied when the request does not set one.
    pub temperature: f32,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries when opening a stream fails transiently.
    pub max_retries: u32,
}

impl DeepSeekConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "deepseek-chat".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(120),
            max_retries: 3,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the default sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// DeepSeek API provider implementation.
pub struct DeepSeekProvider {
    config: DeepSeekConfig,
    client: Client,
}

impl DeepSeekProvider {
    /// Creates a new provider with the given configuration.
    pub fn new(config: DeepSeekConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_wire_request(&self, request: &ChatRequest) -> WireRequest {
        WireRequest {
            model: self.config.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        crate::ports::ChatRole::System => "system",
                        crate::ports::ChatRole::User => "user",
                        crate::ports::ChatRole::Assistant => "assistant",
                    }
                    .to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
            max_tokens: request.max_tokens,
            stream: true,
        }
    }

    async fn send_streaming_request(&self, request: &ChatRequest) -> Result<Response, ProviderError> {
        let wire_request = self.to_wire_request(request);

        self.client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key())
            .header("Content-Type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        timeout_secs: self.config.timeout.as_secs() as u32,
                    }
                } else if e.is_connect() {
                    ProviderError::network(format!("connection failed: {}", e))
                } else {
                    ProviderError::network(e.to_string())
                }
            })
    }

    /// Maps a non-success status to the provider error taxonomy.
    async fn handle_response_status(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(ProviderError::AuthenticationFailed),
            429 => Err(ProviderError::rate_limited(parse_retry_after(&error_body))),
            400 => Err(ProviderError::InvalidRequest(error_body)),
            500..=599 => Err(ProviderError::unavailable(format!(
                "server error {}: {}",
                status, error_body
            ))),
            _ => Err(ProviderError::network(format!(
                "unexpected status {}: {}",
                status, error_body
            ))),
        }
    }
}

#[async_trait]
impl AiProvider for DeepSeekProvider {
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError> {
        // Retry only the stream opening; once bytes flow, the call is not
        // restartable.
        let mut retry_count = 0;
        let response = loop {
            let result = match self.send_streaming_request(&request).await {
                Ok(response) => self.handle_response_status(response).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(response) => break response,
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    tracing::warn!(
                        error = %err,
                        retry = retry_count + 1,
                        "retrying stream open after transient provider error"
                    );
                    sleep(Duration::from_secs(1 << retry_count)).await;
                    retry_count += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let bytes_stream = response.bytes_stream();

        // SSE events may be split across network chunks; carry the partial
        // trailing line between chunks.
        let stream = bytes_stream
            .map(|chunk_result| {
                chunk_result.map_err(|e| ProviderError::network(format!("stream error: {}", e)))
            })
            .scan(String::new(), |carry, chunk_result| {
                let items = match chunk_result {
                    Ok(bytes) => {
                        carry.push_str(&String::from_utf8_lossy(&bytes));
                        drain_complete_lines(carry)
                            .iter()
                            .flat_map(|line| parse_sse_line(line))
                            .collect()
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(items))
            })
            .flat_map(stream::iter);

        Ok(Box::pin(stream))
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 characters per token for the models we target.
        (text.len() / 4).max(1) as u32
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("deepseek", &self.config.model)
    }
}

/// Splits off the complete lines, leaving any partial trailing line in the
/// carry buffer.
fn drain_complete_lines(carry: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(newline) = carry.find('\n') {
        let line: String = carry.drain(..=newline).collect();
        lines.push(line.trim_end().to_string());
    }
    lines
}

/// Parses one SSE line into zero or one stream items.
///
/// The `[DONE]` marker carries no content; the connection closes right
/// after it, which ends the fragment stream.
fn parse_sse_line(line: &str) -> Option<Result<String, ProviderError>> {
    let data = line.strip_prefix("data:")?.trim_start();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<WireChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)?;
            if content.is_empty() {
                None
            } else {
                Some(Ok(content))
            }
        }
        Err(_) => {
            // Malformed frames are dropped; real failures arrive either as
            // a wire error object or as a transport error.
            if let Ok(err) = serde_json::from_str::<WireError>(data) {
                Some(Err(ProviderError::unavailable(err.error.message)))
            } else {
                tracing::debug!(line = %line, "ignoring unparseable SSE frame");
                None
            }
        }
    }
}

/// Extracts a retry hint from a rate-limit error body.
fn parse_retry_after(error_body: &str) -> u32 {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(error_body) {
        if let Some(secs) = parsed
            .get("error")
            .and_then(|e| e.get("retry_after"))
            .and_then(|v| v.as_u64())
        {
            return secs as u32;
        }
    }
    30 // Default retry window
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}
