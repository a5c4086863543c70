//! Ollama backend for the decision oracle
//!
//! Non-streaming calls to `/api/chat`; `/api/tags` answers availability checks.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result};
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

impl<'a> ChatBody<'a> {
    fn new(model: &'a str, messages: &'a [Message], options: Option<GenerateOptions>) -> Self {
        let format = match &options {
            Some(opts) if opts.json_output => Some("json"),
            _ => None,
        };
        Self {
            model,
            messages,
            stream: false,
            format,
            options: options.map(|opts| SamplingOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
                stop: opts.stop,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

impl From<ChatReply> for LLMResponse {
    fn from(reply: ChatReply) -> Self {
        let usage = reply
            .prompt_eval_count
            .zip(reply.eval_count)
            .map(|(prompt, completion)| TokenUsage::new(prompt, completion));
        LLMResponse {
            content: reply.message.content,
            usage,
            model: reply.model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagList {
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

impl OllamaClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(config.ollama_url(), config.oracle.timeout())
    }

    /// Client for a fixed server with a 60s request timeout
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), Duration::from_secs(60))
    }

    fn build(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PilotError::oracle(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: reqwest::Error) -> PilotError {
        if e.is_connect() {
            PilotError::oracle(format!(
                "Cannot connect to Ollama at {}. Is it running?",
                self.base_url
            ))
        } else if e.is_timeout() {
            PilotError::oracle(format!("Ollama at {} timed out", self.base_url))
        } else {
            PilotError::from(e)
        }
    }

    /// Turn a non-2xx reply into an error, naming the model when Ollama lacks it
    async fn check_status(response: Response, model: Option<&str>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match model {
            Some(model) if status.as_u16() == 404 && body.contains("not found") => {
                Err(PilotError::model_not_found("ollama", model))
            }
            _ => Err(PilotError::oracle(format!(
                "Ollama returned {}: {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let body = ChatBody::new(model, messages, options);
        debug!(model, messages = messages.len(), json = body.format.is_some(), "ollama chat");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = Self::check_status(response, Some(model)).await?;

        let text = response.text().await?;
        let reply: ChatReply = serde_json::from_str(&text)
            .map_err(|e| PilotError::oracle(format!("Unreadable Ollama reply: {}", e)))?;
        Ok(reply.into())
    }

    /// A model is present when its name matches, ignoring the `:tag` suffix
    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let wanted = model.split(':').next().unwrap_or(model);
        Ok(self
            .list_models()
            .await?
            .iter()
            .any(|name| name == model || name.split(':').next() == Some(wanted)))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = Self::check_status(response, None).await?;

        let tags: TagList = response.json().await?;
        Ok(tags.models.into_iter().map(|tag| tag.name).collect())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
