//! LLM module - text-generation backends for the decision oracle
//!
//! Provides a provider abstraction with Ollama as the default backend.

pub mod ollama;
pub mod provider;
pub mod traits;

pub use ollama::OllamaClient;
pub use provider::create_provider;
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};
