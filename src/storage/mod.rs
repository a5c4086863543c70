//! Storage module - where finished runs and their screenshots go
//!
//! Both collaborators sit behind traits so the invocation can be wired to a
//! real backend, the local filesystem, or memory in tests.

mod artifacts;
mod runs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{ExecutedStepRecord, RunStatus, TestRun};
use crate::core::Result;

pub use artifacts::LocalArtifactStore;
pub use runs::{JsonFileStore, MemoryRunStore};

/// Time-limited reference to a stored screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRef {
    pub uri: String,
    pub expires_at: DateTime<Utc>,
}

impl ScreenshotRef {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Terminal write after a normal loop exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedUpdate {
    pub status: RunStatus,
    pub result: Option<String>,
    pub screenshot_ref: Option<ScreenshotRef>,
    pub history: Vec<ExecutedStepRecord>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal write after a system failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashUpdate {
    pub status: RunStatus,
    pub error: String,
    pub updated_at: DateTime<Utc>,
}

/// The only two shapes a run record is ever finalized with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunUpdate {
    Finished(FinishedUpdate),
    Crashed(CrashUpdate),
}

impl RunUpdate {
    /// Completion shape from a run the loop concluded
    pub fn finished(run: &TestRun) -> Self {
        RunUpdate::Finished(FinishedUpdate {
            status: run.status,
            result: run.result.clone(),
            screenshot_ref: run.screenshot.clone(),
            history: run.history.clone(),
            updated_at: Utc::now(),
        })
    }

    /// Crash shape carrying the raw error message
    pub fn crashed(error: impl Into<String>) -> Self {
        RunUpdate::Crashed(CrashUpdate {
            status: RunStatus::Failed,
            error: error.into(),
            updated_at: Utc::now(),
        })
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunUpdate::Finished(u) => u.status,
            RunUpdate::Crashed(u) => u.status,
        }
    }

    /// Apply this update to a stored record in one step
    pub fn apply_to(&self, run: &mut TestRun) {
        match self {
            RunUpdate::Finished(u) => {
                run.status = u.status;
                run.result = u.result.clone();
                run.screenshot = u.screenshot_ref.clone();
                run.history = u.history.clone();
                run.updated_at = u.updated_at;
            }
            RunUpdate::Crashed(u) => {
                run.status = u.status;
                run.error = Some(u.error.clone());
                run.updated_at = u.updated_at;
            }
        }
    }
}

/// Run record persistence
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a freshly created RUNNING run
    async fn create(&self, run: &TestRun) -> Result<()>;

    /// Write the terminal state of a run
    async fn finalize(&self, run_id: &str, update: RunUpdate) -> Result<()>;
}

/// Screenshot persistence
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the final screenshot of a run
    async fn upload(&self, run_id: &str, png: &[u8]) -> Result<ScreenshotRef>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RunRequest;

    fn run() -> TestRun {
        TestRun::from_request(&RunRequest {
            url: "https://example.com".to_string(),
            instructions: "click pricing".to_string(),
            outcome: "pricing shown".to_string(),
            test_id: "tpl".to_string(),
        })
    }

    #[test]
    fn test_finished_shape() {
        let mut run = run();
        run.conclude(true, "pricing table visible").unwrap();
        let json = serde_json::to_value(RunUpdate::finished(&run)).unwrap();

        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["result"], "pricing table visible");
        assert!(json.get("history").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_crash_shape() {
        let json = serde_json::to_value(RunUpdate::crashed("browser exited")).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["error"], "browser exited");
    }

    #[test]
    fn test_apply_crash_keeps_history() {
        let mut stored = run();
        RunUpdate::crashed("navigation timeout").apply_to(&mut stored);
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("navigation timeout"));
        assert!(stored.result.is_none());
    }
}
