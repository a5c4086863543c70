//! Run invocation
//!
//! One inbound request becomes one run: reset the host, open a browser,
//! drive the loop, capture the final screenshot and hand the terminal state
//! to storage. The browser is released on every path.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;

use crate::agent::orchestrator::{AgentLoop, LoopExit};
use crate::agent::run_state::TestRun;
use crate::browser::{BrowserLauncher, PageDriver};
use crate::core::{PilotError, Result};
use crate::host::EnvironmentReset;
use crate::storage::{ArtifactStore, RunStore, RunUpdate};

/// Inbound trigger for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRequest {
    pub url: String,
    pub instructions: String,
    pub outcome: String,
    pub test_id: String,
}

impl RunRequest {
    /// Parse a request body. Missing fields surface from [`validate`](Self::validate).
    pub fn from_json(body: &str) -> Result<Self> {
        let request: RunRequest = serde_json::from_str(body)
            .map_err(|e| PilotError::invalid_request(format!("malformed body: {}", e)))?;
        Ok(request)
    }

    /// Every field is required; blank counts as missing
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("url", &self.url),
            ("instructions", &self.instructions),
            ("outcome", &self.outcome),
            ("testId", &self.test_id),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(PilotError::invalid_request(format!(
                    "missing required field '{}'",
                    field
                )));
            }
        }

        let url = Url::parse(self.url.trim()).map_err(|e| {
            PilotError::invalid_request(format!("url '{}' is not valid: {}", self.url, e))
        })?;
        match url.scheme() {
            "http" | "https" | "file" => Ok(()),
            other => Err(PilotError::invalid_request(format!(
                "unsupported url scheme '{}'",
                other
            ))),
        }
    }
}

/// Wires the collaborators of a run together
pub struct RunInvocation {
    env: Arc<dyn EnvironmentReset>,
    launcher: Arc<dyn BrowserLauncher>,
    agent: AgentLoop,
    runs: Arc<dyn RunStore>,
    artifacts: Arc<dyn ArtifactStore>,
    navigation_timeout: Duration,
}

impl RunInvocation {
    pub fn new(
        env: Arc<dyn EnvironmentReset>,
        launcher: Arc<dyn BrowserLauncher>,
        agent: AgentLoop,
        runs: Arc<dyn RunStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            env,
            launcher,
            agent,
            runs,
            artifacts,
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Execute one request end to end.
    ///
    /// Returns `Err` only when the request is rejected or storage refuses the
    /// record. Browser and loop failures end as a FAILED run carrying the raw
    /// error message.
    pub async fn execute(&self, request: RunRequest) -> Result<TestRun> {
        request.validate()?;

        match self.env.reset().await {
            Ok(report) => info!(
                killed = report.killed,
                purged = report.purged,
                "host cleanup finished"
            ),
            Err(e) => warn!(error = %e, "host cleanup failed, continuing"),
        }

        let mut run = TestRun::from_request(&request);
        self.runs.create(&run).await?;
        info!(run_id = %run.id, test_id = %run.test_id, url = %run.url, "run started");

        match self.drive(&mut run).await {
            Ok(exit) => {
                info!(run_id = %run.id, status = %run.status, exit = ?exit, "run finished");
                self.runs
                    .finalize(&run.id, RunUpdate::finished(&run))
                    .await?;
            }
            Err(e) => {
                let message = e.to_string();
                error!(run_id = %run.id, error = %message, "run crashed");
                run.crash(message.clone());
                self.runs
                    .finalize(&run.id, RunUpdate::crashed(message))
                    .await?;
            }
        }

        Ok(run)
    }

    async fn drive(&self, run: &mut TestRun) -> Result<LoopExit> {
        let page = self.launcher.launch().await?;
        let outcome = self.drive_page(page.as_ref(), run).await;

        if let Err(e) = page.close().await {
            warn!(run_id = %run.id, error = %e, "failed to close browser");
        }

        outcome
    }

    async fn drive_page(&self, page: &dyn PageDriver, run: &mut TestRun) -> Result<LoopExit> {
        tokio::time::timeout(self.navigation_timeout, page.goto(&run.url))
            .await
            .map_err(|_| {
                PilotError::Timeout(
                    self.navigation_timeout.as_millis() as u64,
                    format!("navigating to {}", run.url),
                )
            })??;

        let exit = self.agent.run(page, run).await?;

        let png = page.screenshot().await?;
        let screenshot = self.artifacts.upload(&run.id, &png).await?;
        run.attach_screenshot(screenshot);

        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RunRequest {
        RunRequest {
            url: "https://shop.example.com".to_string(),
            instructions: "add a hat to the cart".to_string(),
            outcome: "cart shows 1 item".to_string(),
            test_id: "tpl-hat".to_string(),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
        let mut file = request();
        file.url = "file:///tmp/login.html".to_string();
        assert!(file.validate().is_ok());
    }

    #[test]
    fn test_blank_field_rejected() {
        let mut req = request();
        req.outcome = "   ".to_string();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, PilotError::InvalidRequest(_)));
        assert!(err.to_string().contains("outcome"));
    }

    #[test]
    fn test_missing_field_in_body_rejected() {
        let req = RunRequest::from_json(
            r#"{"url": "https://example.com", "instructions": "x", "outcome": "y"}"#,
        )
        .unwrap();
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("testId"));
    }

    #[test]
    fn test_bad_url_rejected() {
        let mut req = request();
        req.url = "example.com/login".to_string();
        assert!(req.validate().is_err());

        req.url = "ftp://example.com".to_string();
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }
}
