//! qa-pilot - Autonomous Functional-Test Executor
//!
//! Given a URL, natural-language instructions and a desired outcome, qa-pilot
//! opens a real browser, shows an LLM the visible interactive elements and
//! executes the step it proposes, until the LLM declares the goal met or
//! failed, or the step cap is reached.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Text-generation providers (Ollama, Gemini) behind one trait
//! - **Browser**: Page driver seam, DOM snapshot, locator, step executor, Chromium backend
//! - **Agent**: Decision oracle, agent loop, run state machine and invocation
//! - **Storage**: Run records and screenshot artifacts
//! - **Host**: Pre-run cleanup of orphaned browsers and temp files
//! - **CLI**: Subcommand handlers
//!
//! # Usage
//!
//! ```rust,no_run
//! use qa_pilot::cli::commands::build_invocation;
//! use qa_pilot::llm::create_provider;
//! use qa_pilot::{Config, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> qa_pilot::Result<()> {
//!     let config = Config::load();
//!     let provider = create_provider(&config)?;
//!     let run = build_invocation(&config, provider)
//!         .execute(RunRequest {
//!             url: "https://example.com/login".into(),
//!             instructions: "Log in with user test and password test".into(),
//!             outcome: "The dashboard is shown".into(),
//!             test_id: "login-smoke".into(),
//!         })
//!         .await?;
//!     println!("{} {:?}", run.status, run.result);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod browser;
pub mod cli;
pub mod core;
pub mod host;
pub mod llm;
pub mod storage;

// Re-export commonly used items
pub use agent::{AgentLoop, Decision, RunInvocation, RunRequest, RunStatus, TestRun};
pub use crate::core::{Config, PilotError, Result};
