/// Chat-completions HTTP client implementation.
///
/// This module provides `LlmClient` for making synchronous requests to an
/// OpenAI-compatible `/v1/chat/completions` endpoint with one embedded image,
/// along with error types and builder patterns for configuration.
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the endpoint base URL.
pub const API_URL_ENV: &str = "PHOTOTAG_API_URL";
/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "PHOTOTAG_API_KEY";

const DEFAULT_BASE_URL: &str = "http://localhost:5001";

/// Errors that can occur when calling the inference endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Response did not contain generated text
    #[error("API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl LlmError {
    /// True when the endpoint could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout(_))
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(error)
        } else {
            LlmError::Network(error)
        }
    }
}

/// Generation parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub min_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            temperature: 0.1,
            top_p: 1.0,
            top_k: 0,
            min_p: 0.05,
        }
    }
}

/// One image-description request.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub instruction: &'a str,
    /// JPEG-encoded image bytes.
    pub image_jpeg: &'a [u8],
    pub params: SamplingParams,
}

#[derive(Serialize)]
struct Payload<'a> {
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    min_p: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

impl<'a> Payload<'a> {
    fn from_request(request: &ChatRequest<'a>) -> Self {
        let encoded = general_purpose::STANDARD.encode(request.image_jpeg);
        Self {
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(request.system),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: request.instruction,
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{encoded}"),
                            },
                        },
                    ]),
                },
            ],
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            top_k: request.params.top_k,
            min_p: request.params.min_p,
        }
    }
}

/// Builder for constructing `LlmClient` instances.
///
/// # Examples
///
/// ```
/// use phototag::llm::LlmClientBuilder;
///
/// let client = LlmClientBuilder::new()
///     .base_url("http://localhost:5001")
///     .build()
///     .expect("Failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct LlmClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl LlmClientBuilder {
    /// Creates a new `LlmClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL of the endpoint (e.g., "http://localhost:5001").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the bearer credential. An empty key sends no `Authorization` header.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `LlmClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `base_url()` was not called, `PHOTOTAG_API_URL` is consulted, then
    /// `http://localhost:5001`. If `api_key()` was not called,
    /// `PHOTOTAG_API_KEY` is consulted, then no credential.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidUrl` if the base URL does not parse.
    pub fn build(self) -> Result<LlmClient, LlmError> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let base_url = base_url.trim_end_matches('/').to_string();

        let api_key = match self.api_key {
            Some(key) => key,
            None => std::env::var(API_KEY_ENV).unwrap_or_default(),
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(300)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(LlmError::Network)?;

        Ok(LlmClient {
            client,
            base_url,
            api_key: (!api_key.is_empty()).then_some(api_key),
        })
    }
}

/// Synchronous client for an OpenAI-compatible chat-completions endpoint.
///
/// It should be constructed using `LlmClientBuilder`.
pub struct LlmClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Trait for inference endpoint operations.
///
/// This trait enables mocking in unit tests and keeps the generator
/// independent of the transport.
pub trait LlmClientTrait: Send + Sync {
    /// Sends one request and returns the generated text.
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError>;
}

impl LlmClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when a bearer credential will be sent.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn complete_internal(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = Payload::from_request(request);
        let body = serde_json::to_vec(&payload).map_err(LlmError::Serialization)?;

        let mut http = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().map_err(LlmError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
            });
        }

        let json: serde_json::Value = response.json().map_err(LlmError::from_reqwest)?;
        debug!(url = %url, "received completion");
        extract_completion_text(&json)
    }
}

impl LlmClientTrait for LlmClient {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        self.complete_internal(request)
    }
}

/// Pulls generated text from `choices[0].message.content` or `choices[0].text`.
fn extract_completion_text(json: &serde_json::Value) -> Result<String, LlmError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .ok_or_else(|| LlmError::Api {
            message: "Missing 'choices' in API response".to_string(),
        })?;

    if let Some(message) = choice.get("message") {
        return message
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| LlmError::Api {
                message: "Missing 'message.content' in API response".to_string(),
            });
    }

    Ok(choice
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}
