/// Inference endpoint client module.
///
/// This module provides a blocking HTTP client for OpenAI-compatible
/// chat-completions endpoints serving multimodal models.
mod client;

pub use client::{
    API_KEY_ENV, API_URL_ENV, ChatRequest, LlmClient, LlmClientBuilder, LlmClientTrait, LlmError,
    SamplingParams,
};
