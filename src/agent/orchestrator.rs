//! Agent loop
//!
//! Drives one run: snapshot → oracle → execute, until the oracle finishes,
//! the decision is unusable, or the step cap is reached.

use tracing::{debug, info, warn};

use crate::agent::decision::{Decision, WaitReason};
use crate::agent::oracle::{DecisionOracle, Goal};
use crate::agent::run_state::{ExecutedStepRecord, TestRun, DECISION_FAILURE, MAX_STEPS_EXCEEDED};
use crate::browser::{PageDriver, Snapshotter, StepExecutor};
use crate::core::config::AgentConfig;
use crate::core::{Config, Result};

/// How a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The oracle issued `finish`
    Finished,
    /// The oracle returned no usable action
    DecisionFailure,
    /// The step cap was reached
    StepBudgetExhausted,
}

/// Owns iteration count, history and termination for a run
pub struct AgentLoop {
    oracle: DecisionOracle,
    snapshotter: Snapshotter,
    executor: StepExecutor,
    settings: AgentConfig,
}

impl AgentLoop {
    pub fn new(oracle: DecisionOracle, executor: StepExecutor, settings: AgentConfig) -> Self {
        Self {
            oracle,
            snapshotter: Snapshotter::new(settings.text_cap).with_timeout(executor.action_timeout()),
            executor,
            settings,
        }
    }

    pub fn from_config(oracle: DecisionOracle, config: &Config) -> Self {
        Self::new(
            oracle,
            StepExecutor::new(config.browser.action_timeout()),
            config.agent.clone(),
        )
    }

    /// Drive the run to a terminal state.
    ///
    /// Step-level failures become FAILED history entries. Errors returned here
    /// are system failures (the page stopped answering); the run is left
    /// RUNNING for the caller to record as a crash.
    pub async fn run(&self, page: &dyn PageDriver, run: &mut TestRun) -> Result<LoopExit> {
        let goal = Goal::new(run.instructions.clone(), run.desired_outcome.clone());

        for step in 1..=self.settings.max_steps {
            let snapshot = self.snapshotter.capture(page).await?;
            let history = run.recent_history(self.settings.history_window);
            let decision = self.oracle.decide(&goal, history, &snapshot).await;

            info!(
                run_id = %run.id,
                step,
                max_steps = self.settings.max_steps,
                action = decision.action_name(),
                target = decision.target_label().unwrap_or(""),
                "decision"
            );

            match decision {
                Decision::Finish { success, desc } => {
                    run.conclude(success, desc)?;
                    return Ok(LoopExit::Finished);
                }
                Decision::Unusable { raw } => {
                    warn!(run_id = %run.id, step, raw = %raw, "oracle returned no usable action");
                    run.fail(DECISION_FAILURE)?;
                    return Ok(LoopExit::DecisionFailure);
                }
                Decision::Wait { reason } => {
                    if reason == WaitReason::OracleUnavailable {
                        warn!(run_id = %run.id, step, "oracle unavailable, stalling");
                    }
                    tokio::time::sleep(self.settings.wait_delay()).await;
                    continue;
                }
                action => {
                    let target = action.target_label().map(str::to_string);
                    let entry = match self.executor.execute(page, &action).await {
                        Ok(report) => {
                            debug!(run_id = %run.id, step, tier = ?report.tier, "step succeeded");
                            ExecutedStepRecord::success(action.action_name(), target)
                        }
                        Err(e) => {
                            warn!(run_id = %run.id, step, error = %e, "step failed");
                            ExecutedStepRecord::failed(action.action_name(), target, e.to_string())
                        }
                    };
                    run.record(entry)?;
                }
            }

            tokio::time::sleep(self.settings.settle_delay()).await;
        }

        info!(run_id = %run.id, max_steps = self.settings.max_steps, "step budget exhausted");
        run.fail(MAX_STEPS_EXCEEDED)?;
        Ok(LoopExit::StepBudgetExhausted)
    }
}
