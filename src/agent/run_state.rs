//! Test run state
//!
//! A run starts RUNNING and moves exactly once to COMPLETED or FAILED.
//! Terminal runs reject further mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::RunRequest;
use crate::core::{PilotError, Result};
use crate::storage::ScreenshotRef;

/// Result text when the oracle answers without a usable action
pub const DECISION_FAILURE: &str = "Decision failure: the oracle returned no usable action";

/// Result text when the step cap is reached without a finish decision
pub const MAX_STEPS_EXCEEDED: &str = "Maximum steps exceeded without reaching the desired outcome";

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Completed => write!(f, "COMPLETED"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome tag of an executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepOutcome {
    Success,
    Failed,
}

/// One executed step as kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedStepRecord {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub outcome: StepOutcome,
    pub timestamp: DateTime<Utc>,
    /// Failure message, shown back to the oracle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutedStepRecord {
    pub fn success(action: impl Into<String>, target: Option<String>) -> Self {
        Self {
            action: action.into(),
            target,
            outcome: StepOutcome::Success,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn failed(action: impl Into<String>, target: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target,
            outcome: StepOutcome::Failed,
            timestamp: Utc::now(),
            detail: Some(detail.into()),
        }
    }

    /// One-line summary used in oracle prompts
    pub fn summary(&self) -> String {
        let outcome = match self.outcome {
            StepOutcome::Success => "SUCCESS",
            StepOutcome::Failed => "FAILED",
        };
        let mut line = match &self.target {
            Some(target) => format!("{} \"{}\" -> {}", self.action, target, outcome),
            None => format!("{} -> {}", self.action, outcome),
        };
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" ({})", detail));
        }
        line
    }
}

/// A single execution of the agent loop against one goal/URL pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    pub test_id: String,
    pub status: RunStatus,
    pub url: String,
    pub instructions: String,
    pub desired_outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub history: Vec<ExecutedStepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestRun {
    /// Start a RUNNING run for an accepted request
    pub fn from_request(request: &RunRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: request.test_id.clone(),
            status: RunStatus::Running,
            url: request.url.clone(),
            instructions: request.instructions.clone(),
            desired_outcome: request.outcome.clone(),
            result: None,
            history: Vec::new(),
            screenshot: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// The most recent `window` entries, oldest first
    pub fn recent_history(&self, window: usize) -> &[ExecutedStepRecord] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    /// Append an executed step
    pub fn record(&mut self, entry: ExecutedStepRecord) -> Result<()> {
        self.ensure_running()?;
        self.history.push(entry);
        self.touch();
        Ok(())
    }

    /// Apply a finish decision: the only way a run reaches COMPLETED
    pub fn conclude(&mut self, success: bool, desc: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        self.status = if success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.result = Some(desc.into());
        self.touch();
        Ok(())
    }

    /// Fail the run with a human-readable result
    pub fn fail(&mut self, result: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        self.status = RunStatus::Failed;
        self.result = Some(result.into());
        self.touch();
        Ok(())
    }

    /// Record a system failure. Applies even after a terminal decision,
    /// since the crash write replaces whatever the loop concluded.
    pub fn crash(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    pub fn attach_screenshot(&mut self, screenshot: ScreenshotRef) {
        self.screenshot = Some(screenshot);
        self.touch();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(PilotError::InvalidTransition(
                self.id.clone(),
                self.status.to_string(),
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
