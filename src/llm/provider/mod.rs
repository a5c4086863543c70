//! LLM Provider implementations and factory
//!
//! Submodules implement hosted providers; Ollama lives in `llm::ollama`.

pub mod gemini;

use std::sync::Arc;

use crate::core::config::{Config, ProviderType};
use crate::core::Result;
use crate::llm::traits::LLMProvider;
use crate::llm::OllamaClient;

use self::gemini::GeminiProvider;

/// Create a new LLM provider based on configuration
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider: Arc<dyn LLMProvider> = match config.oracle.provider {
        ProviderType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        ProviderType::Gemini => Arc::new(GeminiProvider::from_config(config)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_provider() {
        let mut config = Config::default();
        config.oracle.provider = ProviderType::Ollama;
        assert_eq!(create_provider(&config).unwrap().name(), "ollama");

        config.oracle.provider = ProviderType::Gemini;
        config.oracle.api_key = Some("test-key".to_string());
        assert_eq!(create_provider(&config).unwrap().name(), "gemini");

        config.oracle.api_key = None;
        assert!(create_provider(&config).is_err());
    }
}
