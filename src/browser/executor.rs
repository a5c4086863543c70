//! Step executor
//!
//! Performs click / fill / press decisions against the page. Element-scoped
//! actions walk the escalation chain until one tier succeeds.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::{within, ElementRef, InteractionTier, LocatorResolver, PageDriver};
use crate::agent::Decision;
use crate::core::{PilotError, Result};

/// Interaction tiers in the order they are tried
pub const ESCALATION: [InteractionTier; 3] = [
    InteractionTier::Standard,
    InteractionTier::Forced,
    InteractionTier::Script,
];

/// What a successful step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Tier that succeeded, for element-scoped actions
    pub tier: Option<InteractionTier>,
}

/// Executes oracle decisions through a page driver
#[derive(Debug, Clone)]
pub struct StepExecutor {
    resolver: LocatorResolver,
    action_timeout: Duration,
}

impl StepExecutor {
    pub fn new(action_timeout: Duration) -> Self {
        Self {
            resolver: LocatorResolver::new().with_timeout(action_timeout),
            action_timeout,
        }
    }

    /// Bound applied to every page operation a step makes
    pub fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    /// Execute one decision. Any error is a step failure for the caller to record.
    pub async fn execute(&self, page: &dyn PageDriver, decision: &Decision) -> Result<StepReport> {
        match decision {
            Decision::Click { target } => {
                let element = self.resolver.resolve(page, target).await?;
                let el = &element;
                let tier = self
                    .escalate("click", move |tier| page.click(el, tier))
                    .await?;
                Ok(StepReport { tier: Some(tier) })
            }
            Decision::Fill { target, value } => {
                let element = self.resolver.resolve(page, target).await?;
                let el = &element;
                let value = value.as_str();
                let tier = self
                    .escalate("fill", move |tier| page.fill(el, value, tier))
                    .await?;
                self.after_fill(page, &element).await;
                Ok(StepReport { tier: Some(tier) })
            }
            Decision::Press { key } => {
                if key.trim().is_empty() {
                    return Err(PilotError::interaction("press decision has no key"));
                }
                self.bounded("press", page.press_key(key)).await?;
                Ok(StepReport { tier: None })
            }
            other => Err(PilotError::Other(format!(
                "'{}' is not an executable step",
                other.action_name()
            ))),
        }
    }

    /// Try each tier in order; the first success short-circuits
    async fn escalate<'a, F>(&self, action: &str, mut attempt: F) -> Result<InteractionTier>
    where
        F: FnMut(InteractionTier) -> BoxFuture<'a, Result<()>>,
    {
        let mut failures = Vec::with_capacity(ESCALATION.len());

        for tier in ESCALATION {
            match self.bounded(action, attempt(tier)).await {
                Ok(()) => {
                    debug!(action, %tier, "interaction succeeded");
                    return Ok(tier);
                }
                Err(e) => {
                    debug!(action, %tier, error = %e, "interaction tier failed, escalating");
                    failures.push(format!("{}: {}", tier, e));
                }
            }
        }

        Err(PilotError::interaction(format!(
            "{} failed at every tier ({})",
            action,
            failures.join("; ")
        )))
    }

    async fn bounded<'a>(&self, action: &str, fut: BoxFuture<'a, Result<()>>) -> Result<()> {
        within(self.action_timeout, action, fut).await
    }

    /// Notify listeners and blur the field so validation on blur runs
    async fn after_fill(&self, page: &dyn PageDriver, element: &ElementRef) {
        if let Err(e) = self.bounded("input event", page.dispatch_input(element)).await {
            warn!(element = %element, error = %e, "input notification after fill failed");
        }
        if let Err(e) = self.bounded("tab", page.press_key("Tab")).await {
            warn!(element = %element, error = %e, "focus advance after fill failed");
        }
    }
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
