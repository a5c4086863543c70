//! CLI command handlers

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{ConfigAction, RunArgs};
use crate::agent::{AgentLoop, DecisionOracle, RunInvocation, RunRequest, TestRun};
use crate::browser::ChromiumLauncher;
use crate::core::{Config, PilotError, Result};
use crate::host::{CleanupReport, EnvironmentReset, HostCleanup};
use crate::llm::{create_provider, LLMProvider};
use crate::storage::{JsonFileStore, LocalArtifactStore};

/// Apply `run` flags that change configuration
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if args.headed {
        config.browser.headless = false;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(model) = &args.model {
        config.oracle.model = model.clone();
    }
}

/// Build the request from `--request` and the individual flags
pub fn build_request(args: &RunArgs) -> Result<RunRequest> {
    let mut request = match &args.request {
        Some(path) => {
            let body = std::fs::read_to_string(path).map_err(|e| {
                PilotError::invalid_request(format!("cannot read {}: {}", path.display(), e))
            })?;
            RunRequest::from_json(&body)?
        }
        None => RunRequest::default(),
    };

    if let Some(url) = &args.url {
        request.url = url.clone();
    }
    if let Some(instructions) = &args.instructions {
        request.instructions = instructions.clone();
    }
    if let Some(outcome) = &args.outcome {
        request.outcome = outcome.clone();
    }
    if let Some(test_id) = &args.test_id {
        request.test_id = test_id.clone();
    }

    request.validate()?;
    Ok(request)
}

/// Wire the production collaborators
pub fn build_invocation(config: &Config, provider: Arc<dyn LLMProvider>) -> RunInvocation {
    let oracle = DecisionOracle::from_config(provider, &config.oracle);
    let agent = AgentLoop::from_config(oracle, config);

    RunInvocation::new(
        Arc::new(HostCleanup::from_config(&config.cleanup)),
        Arc::new(ChromiumLauncher::from_config(&config.browser)),
        agent,
        Arc::new(JsonFileStore::new(&config.storage.runs_dir)),
        Arc::new(LocalArtifactStore::new(
            &config.storage.artifacts_dir,
            Duration::from_secs(config.storage.link_ttl_secs),
        )),
    )
    .with_navigation_timeout(config.browser.navigation_timeout())
}

/// `run`: execute one invocation and return the final run
pub async fn run(mut config: Config, args: &RunArgs) -> Result<TestRun> {
    apply_overrides(&mut config, args);
    config.validate()?;
    let request = build_request(args)?;

    let provider = create_provider(&config)?;
    // An unreachable oracle only stalls the run, so this is advisory
    match provider.is_model_available(&config.oracle.model).await {
        Ok(true) => {}
        Ok(false) => warn!(
            provider = provider.name(),
            model = %config.oracle.model,
            "model not listed by provider"
        ),
        Err(e) => warn!(provider = provider.name(), error = %e, "oracle not reachable"),
    }

    info!(
        provider = provider.name(),
        model = %config.oracle.model,
        max_steps = config.agent.max_steps,
        headless = config.browser.headless,
        "starting run"
    );

    build_invocation(&config, provider).execute(request).await
}

/// `cleanup`: one reset pass
pub async fn cleanup(config: &Config) -> Result<CleanupReport> {
    HostCleanup::from_config(&config.cleanup).reset().await
}

/// `config <action>`: text to print
pub fn config(config: &Config, action: ConfigAction) -> Result<String> {
    match action {
        ConfigAction::Show => toml::to_string_pretty(config)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e))),
        ConfigAction::Init => {
            let path = Config::default().save()?;
            Ok(format!("Wrote default configuration to {}", path.display()))
        }
        ConfigAction::Path => Ok(Config::config_file().display().to_string()),
    }
}
