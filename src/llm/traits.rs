//! The seam between the decision oracle and a concrete model backend
//!
//! Ollama and Gemini implement it in production; tests script the replies.

use async_trait::async_trait;

use crate::core::{Message, Result};

/// One completed oracle exchange
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Raw reply text, not yet parsed into a decision
    pub content: String,
    pub usage: Option<TokenUsage>,
    /// Model the backend reports having used
    pub model: String,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Sampling knobs passed through to the backend
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    /// Ask the backend to constrain its reply to a JSON document
    pub json_output: bool,
}

impl GenerateOptions {
    /// Options for a single next-step decision: low temperature, JSON reply
    pub fn for_decision(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            json_output: true,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send one conversation and wait for the full reply
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse>;

    async fn is_model_available(&self, model: &str) -> Result<bool>;

    async fn list_models(&self) -> Result<Vec<String>>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
