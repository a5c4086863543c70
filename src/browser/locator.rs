//! Locator resolution
//!
//! Strategies in fallback order:
//! 1. Bare identifier - exact `id`, then exact `name`
//! 2. Placeholder text
//! 3. Accessible label
//! 4. Button-role accessible name
//! 5. Link-role accessible name
//! 6. Any visible text
//!
//! A level only runs when every level before it matched nothing. Within the
//! winning level the first element in document order is taken.

use std::time::Duration;

use tracing::debug;

use super::{within, AriaRole, ElementQuery, ElementRef, PageDriver, DEFAULT_PAGE_TIMEOUT};
use crate::core::{PilotError, Result};

/// Maps a natural-language target to a concrete element
#[derive(Debug, Clone, Copy)]
pub struct LocatorResolver {
    query_timeout: Duration,
}

impl LocatorResolver {
    pub fn new() -> Self {
        Self {
            query_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    /// Bound on each individual query, not on the whole chain
    pub fn with_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// The ordered queries tried for a target
    pub fn chain(target: &str) -> Vec<ElementQuery> {
        let target = target.trim();
        let mut chain = Vec::with_capacity(7);

        if is_bare_identifier(target) {
            chain.push(ElementQuery::Id(target.to_string()));
            chain.push(ElementQuery::Name(target.to_string()));
        }

        chain.push(ElementQuery::Placeholder(target.to_string()));
        chain.push(ElementQuery::Label(target.to_string()));
        chain.push(ElementQuery::Role {
            role: AriaRole::Button,
            name: target.to_string(),
        });
        chain.push(ElementQuery::Role {
            role: AriaRole::Link,
            name: target.to_string(),
        });
        chain.push(ElementQuery::Text(target.to_string()));
        chain
    }

    /// Resolve a target, or fail with [`PilotError::ElementNotFound`]
    pub async fn resolve(&self, page: &dyn PageDriver, target: &str) -> Result<ElementRef> {
        if target.trim().is_empty() {
            return Err(PilotError::ElementNotFound("<empty target>".to_string()));
        }

        for query in Self::chain(target) {
            let what = format!("{} query for '{}'", query.kind(), target);
            let matches = within(self.query_timeout, &what, page.query(&query)).await?;
            if let Some(first) = matches.into_iter().next() {
                debug!(target, strategy = query.kind(), element = %first, "resolved locator");
                return Ok(first);
            }
        }

        debug!(target, "no strategy matched");
        Err(PilotError::ElementNotFound(target.to_string()))
    }
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Letters, digits, `_` and `-` only
pub fn is_bare_identifier(target: &str) -> bool {
    !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
