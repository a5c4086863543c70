//! Agent module - the run state machine and what drives it
//!
//! Contains the decision oracle client, the agent loop and the invocation
//! that wraps one run from request to stored result.

pub mod decision;
pub mod invocation;
pub mod oracle;
pub mod orchestrator;
pub mod run_state;

pub use decision::{Decision, WaitReason};
pub use invocation::{RunInvocation, RunRequest};
pub use oracle::{DecisionOracle, Goal};
pub use orchestrator::{AgentLoop, LoopExit};
pub use run_state::{
    ExecutedStepRecord, RunStatus, StepOutcome, TestRun, DECISION_FAILURE, MAX_STEPS_EXCEEDED,
};
