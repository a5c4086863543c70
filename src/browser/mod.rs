//! Browser module - the page seam and everything that acts through it
//!
//! The agent loop only talks to a [`PageDriver`]. The production driver is
//! backed by Chromium over CDP; tests use an in-memory page.

mod chromium;
mod executor;
mod locator;
mod scripts;
mod snapshot;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{PilotError, Result};

pub use chromium::{profile_prefix, ChromiumLauncher, ChromiumPage};
pub use executor::{StepExecutor, ESCALATION};
pub use locator::{is_bare_identifier, LocatorResolver};
pub use snapshot::{is_visible, ElementDescriptor, Snapshot, Snapshotter};

/// Default bound on a single page operation
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Await a page operation, failing with [`PilotError::Timeout`] once `limit` passes
pub(crate) async fn within<T, F>(limit: Duration, what: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(PilotError::Timeout(limit.as_millis() as u64, what.to_string())),
    }
}

/// Opaque handle to an element found on the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ARIA roles the locator queries by accessible name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AriaRole {
    Button,
    Link,
}

impl AriaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AriaRole::Button => "button",
            AriaRole::Link => "link",
        }
    }
}

/// A single element lookup. Results come back in document order.
///
/// `Id` and `Name` match exactly; every other query is a case-insensitive
/// substring match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    Id(String),
    Name(String),
    Placeholder(String),
    Label(String),
    Role { role: AriaRole, name: String },
    Text(String),
}

impl ElementQuery {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ElementQuery::Id(_) => "id",
            ElementQuery::Name(_) => "name",
            ElementQuery::Placeholder(_) => "placeholder",
            ElementQuery::Label(_) => "label",
            ElementQuery::Role {
                role: AriaRole::Button,
                ..
            } => "button",
            ElementQuery::Role {
                role: AriaRole::Link,
                ..
            } => "link",
            ElementQuery::Text(_) => "text",
        }
    }
}

/// How hard an interaction pushes past the page's own checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionTier {
    /// Native input after actionability checks, bounded by the action timeout
    Standard,
    /// Native input with actionability checks skipped
    Forced,
    /// Direct DOM manipulation from a page script
    Script,
}

impl std::fmt::Display for InteractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionTier::Standard => write!(f, "standard"),
            InteractionTier::Forced => write!(f, "forced"),
            InteractionTier::Script => write!(f, "script"),
        }
    }
}

/// An interactive element as reported by the page, before visibility filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawElement {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub text: Option<String>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
    /// Computed `display`
    pub display: String,
    /// Computed `visibility`
    pub visibility: String,
    /// Computed `opacity`
    pub opacity: String,
    /// Whether the element produces any layout box
    #[serde(default = "default_rendered")]
    pub rendered: bool,
}

fn default_rendered() -> bool {
    true
}

/// One exclusive page in one exclusive browser process
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to settle
    async fn goto(&self, url: &str) -> Result<()>;

    /// Every element matching the interactive selector set, in document order
    async fn interactive_elements(&self) -> Result<Vec<RawElement>>;

    /// Run a lookup; an empty vector means no match
    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementRef>>;

    /// Click an element using one interaction tier
    async fn click(&self, element: &ElementRef, tier: InteractionTier) -> Result<()>;

    /// Replace an element's value using one interaction tier
    async fn fill(&self, element: &ElementRef, value: &str, tier: InteractionTier) -> Result<()>;

    /// Fire an `input` event on an element
    async fn dispatch_input(&self, element: &ElementRef) -> Result<()>;

    /// Press a named key at page level
    async fn press_key(&self, key: &str) -> Result<()>;

    /// PNG of the current page
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the page and its browser process. Safe to call twice.
    async fn close(&self) -> Result<()>;
}

/// Starts a fresh browser for one run
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}
