//! Google Gemini Provider
//!
//! Calls the Generative Language `generateContent` endpoint with an API key.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::{Config, Message, PilotError, Result, Role};
use crate::llm::traits::{GenerateOptions, LLMProvider, LLMResponse, TokenUsage};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .oracle
            .api_key
            .clone()
            .ok_or_else(|| PilotError::config("GEMINI_API_KEY not set"))?;

        let client = Client::builder()
            .timeout(config.oracle.timeout())
            .build()
            .map_err(|e| PilotError::oracle(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
        })
    }

    /// Point the provider at a different API root
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Build the request body. System messages become the system instruction.
    fn request_body(messages: &[Message], options: Option<&GenerateOptions>) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": if m.role == Role::User { "user" } else { "model" },
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let mut generation_config = json!({ "candidateCount": 1 });
        if let Some(opts) = options {
            if let Some(t) = opts.temperature {
                generation_config["temperature"] = json!(t);
            }
            if let Some(max) = opts.max_tokens {
                generation_config["maxOutputTokens"] = json!(max);
            }
            if let Some(stop) = &opts.stop {
                generation_config["stopSequences"] = json!(stop);
            }
            if opts.json_output {
                generation_config["responseMimeType"] = json!("application/json");
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        body
    }

    fn parse_response(model: &str, response: &Value) -> Result<LLMResponse> {
        let content = response["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| PilotError::oracle("Gemini response has no candidate content"))?;

        let usage = match (
            response["usageMetadata"]["promptTokenCount"].as_u64(),
            response["usageMetadata"]["candidatesTokenCount"].as_u64(),
        ) {
            (Some(p), Some(c)) => Some(TokenUsage::new(p as u32, c as u32)),
            _ => None,
        };

        Ok(LLMResponse {
            content,
            usage,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let endpoint_model = model.trim_start_matches("models/");
        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint, endpoint_model
        );
        let body = Self::request_body(messages, options.as_ref());

        debug!(model = endpoint_model, "sending gemini generateContent request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(PilotError::model_not_found(self.name(), endpoint_model));
            }
            return Err(PilotError::oracle(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = resp.json().await?;
        Self::parse_response(model, &response_json)
    }

    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        let wanted = model.trim_start_matches("models/");
        Ok(models.iter().any(|m| m == wanted))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/models", self.endpoint))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PilotError::oracle("Failed to list Gemini models"));
        }

        let body: Value = resp.json().await?;
        Ok(body["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|n| n.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
