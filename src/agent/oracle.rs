//! Decision oracle client
//!
//! Asks a text-generation backend for the next step. Transient failures are
//! retried a bounded number of times; when every attempt fails the oracle
//! answers `wait` so the run stalls instead of aborting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::agent::decision::{Decision, WaitReason};
use crate::agent::run_state::ExecutedStepRecord;
use crate::browser::Snapshot;
use crate::core::config::OracleConfig;
use crate::core::{Message, Result};
use crate::llm::{GenerateOptions, LLMProvider};

const SYSTEM_PROMPT: &str = r#"You are a QA automation agent driving a web browser to verify a goal.
Each turn you see the goal, your most recent steps, and the visible interactive elements.
Reply with exactly ONE JSON object and nothing else, using one of these shapes:
{"action": "click", "target": "<id, name, placeholder, label or visible text>"}
{"action": "fill", "target": "<id, name, placeholder or label>", "value": "<text to enter>"}
{"action": "press", "key": "<key name, e.g. Enter>"}
{"action": "wait"}
{"action": "finish", "success": true|false, "desc": "<what you observed>"}

## Rules
- Prefer element ids or names as targets when the inventory shows them.
- If a previous step FAILED, choose a different target or approach.
- Use "finish" with success true only when the desired outcome is visibly reached.
- Use "finish" with success false when the page shows the outcome cannot be reached."#;

/// What the run is trying to achieve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub instructions: String,
    pub outcome: String,
}

impl Goal {
    pub fn new(instructions: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            outcome: outcome.into(),
        }
    }
}

/// Client that turns page state into a [`Decision`]
pub struct DecisionOracle {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_attempts: u32,
    retry_delay: Duration,
}

impl DecisionOracle {
    /// Create an oracle with 3 attempts and a 2s back-off
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &OracleConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Build the prompt for one decision
    pub fn build_messages(
        goal: &Goal,
        history: &[ExecutedStepRecord],
        snapshot: &Snapshot,
    ) -> Vec<Message> {
        let mut prompt = String::new();

        prompt.push_str("## Goal\n");
        prompt.push_str(&goal.instructions);
        prompt.push_str("\n\n## Desired outcome\n");
        prompt.push_str(&goal.outcome);

        prompt.push_str("\n\n## Recent steps\n");
        if history.is_empty() {
            prompt.push_str("(none yet)\n");
        } else {
            for (i, entry) in history.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, entry.summary()));
            }
        }

        prompt.push_str("\n## Visible interactive elements\n");
        prompt.push_str(&snapshot.to_string());
        prompt.push_str("\n\nWhat is the next action? Answer with one JSON object.");

        vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)]
    }

    /// Ask for the next decision. Never fails: exhausting every attempt
    /// yields `Decision::Wait { reason: OracleUnavailable }`.
    pub async fn decide(
        &self,
        goal: &Goal,
        history: &[ExecutedStepRecord],
        snapshot: &Snapshot,
    ) -> Decision {
        let messages = Self::build_messages(goal, history, snapshot);

        for attempt in 1..=self.max_attempts {
            match self.attempt(&messages).await {
                Ok(decision) => {
                    debug!(attempt, action = decision.action_name(), "oracle decided");
                    return decision;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        provider = self.provider.name(),
                        error = %e,
                        "oracle attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        warn!("oracle unavailable after all attempts, falling back to wait");
        Decision::Wait {
            reason: WaitReason::OracleUnavailable,
        }
    }

    async fn attempt(&self, messages: &[Message]) -> Result<Decision> {
        let response = self
            .provider
            .chat(
                &self.model,
                messages,
                Some(GenerateOptions::for_decision(self.temperature)),
            )
            .await?;

        Decision::parse(&response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementDescriptor;
    use crate::core::Role;

    fn snapshot() -> Snapshot {
        Snapshot {
            elements: vec![ElementDescriptor {
                tag: "button".to_string(),
                id: None,
                name: None,
                input_type: None,
                text: Some("Sign In".to_string()),
                placeholder: None,
                label: None,
                value: None,
            }],
        }
    }

    #[test]
    fn test_prompt_embeds_goal_history_and_inventory() {
        let goal = Goal::new("log in with test/test", "dashboard visible");
        let history = vec![
            ExecutedStepRecord::success("fill", Some("user".to_string())),
            ExecutedStepRecord::failed("click", Some("Login".to_string()), "Element not found: Login"),
        ];
        let messages = DecisionOracle::build_messages(&goal, &history, &snapshot());

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let prompt = &messages[1].content;
        assert!(prompt.contains("log in with test/test"));
        assert!(prompt.contains("dashboard visible"));
        assert!(prompt.contains("1. fill \"user\" -> SUCCESS"));
        assert!(prompt.contains("2. click \"Login\" -> FAILED"));
        assert!(prompt.contains(r#"[button] text="Sign In""#));
    }

    #[test]
    fn test_prompt_without_history() {
        let goal = Goal::new("open pricing", "pricing table shown");
        let messages = DecisionOracle::build_messages(&goal, &[], &Snapshot::default());
        assert!(messages[1].content.contains("(none yet)"));
        assert!(messages[1]
            .content
            .contains("(no visible interactive elements)"));
    }
}
