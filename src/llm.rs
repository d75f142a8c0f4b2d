//! Language model clients.
//!
//! [`LanguageModel`] is the seam the answer composer calls through.
//! [`ChatCompletionsModel`] speaks the OpenAI-compatible
//! `POST {base_url}/chat/completions` protocol used by Groq, OpenAI, and
//! most self-hosted gateways.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, ModelErrorKind, Result};

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider label used in logs and errors.
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Run one completion for `prompt` and return the full text output.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatRequestMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsModel {
    client: reqwest::Client,
    provider: String,
    model: String,
    endpoint: String,
    api_key: String,
    temperature: Option<f32>,
    max_retries: u32,
}

impl ChatCompletionsModel {
    /// Build a client from `[llm]` settings. The API key must already be
    /// resolved (see [`Config::require_llm_key`](crate::config::Config::require_llm_key)).
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::model(&config.provider, ModelErrorKind::Transport, e.to_string())
            })?;

        Ok(Self {
            client,
            provider: config.provider.clone(),
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn attempt(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::model(
                &self.provider,
                classify_status(status.as_u16()),
                format!("HTTP {}: {}", status, text),
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                Error::model(
                    &self.provider,
                    ModelErrorKind::InvalidResponse,
                    e.to_string(),
                )
            }
        })?;
        extract_answer(&self.provider, parsed)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        let kind = if e.is_timeout() {
            ModelErrorKind::Timeout
        } else {
            ModelErrorKind::Transport
        };
        Error::model(&self.provider, kind, e.to_string())
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(prompt).await {
                Err(Error::Model { kind, .. }) if kind.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    tracing::warn!(provider = %self.provider, %kind, attempt, ?delay, "retrying model call");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn classify_status(status: u16) -> ModelErrorKind {
    match status {
        401 | 403 => ModelErrorKind::Auth,
        408 | 504 => ModelErrorKind::Timeout,
        429 => ModelErrorKind::RateLimited,
        _ => ModelErrorKind::Api,
    }
}

fn extract_answer(provider: &str, response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            Error::model(
                provider,
                ModelErrorKind::InvalidResponse,
                "response contained no answer text",
            )
        })
}
