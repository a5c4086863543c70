//! Shared fakes for integration tests
//!
//! `FakePage` keeps a tiny DOM in memory and answers element queries with
//! the same matching rules the Chromium page scripts use. `ScriptedProvider`
//! replays canned oracle replies.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use qa_pilot::agent::{AgentLoop, DecisionOracle};
use qa_pilot::browser::{
    AriaRole, BrowserLauncher, ElementQuery, ElementRef, InteractionTier, PageDriver, RawElement,
    StepExecutor,
};
use qa_pilot::core::config::AgentConfig;
use qa_pilot::core::{Message, PilotError, Result};
use qa_pilot::host::{CleanupReport, EnvironmentReset};
use qa_pilot::llm::{GenerateOptions, LLMProvider, LLMResponse};
use qa_pilot::storage::{ArtifactStore, ScreenshotRef};

/// Shared, ordered record of collaborator calls
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(events: &Option<Events>, event: impl Into<String>) {
    if let Some(events) = events {
        events.lock().unwrap().push(event.into());
    }
}

// ---------------------------------------------------------------------------
// Fake DOM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input_type: Option<String>,
    pub text: Option<String>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
    pub role: Option<String>,
    pub href: bool,
    pub value: Option<String>,
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub rendered: bool,
    /// Tiers at which interactions with this element are rejected
    pub reject: HashSet<InteractionTier>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            name: None,
            input_type: None,
            text: None,
            placeholder: None,
            label: None,
            role: None,
            href: false,
            value: None,
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            rendered: true,
            reject: HashSet::new(),
        }
    }

    pub fn input(id: &str) -> Self {
        let mut el = Self::new("input").id(id).name(id);
        el.input_type = Some("text".to_string());
        el.value = Some(String::new());
        el
    }

    pub fn button(text: &str) -> Self {
        Self::new("button").text(text)
    }

    pub fn link(text: &str) -> Self {
        let mut el = Self::new("a").text(text);
        el.href = true;
        el
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn input_type(mut self, t: &str) -> Self {
        self.input_type = Some(t.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn display(mut self, display: &str) -> Self {
        self.display = display.to_string();
        self
    }

    pub fn visibility(mut self, visibility: &str) -> Self {
        self.visibility = visibility.to_string();
        self
    }

    pub fn opacity(mut self, opacity: &str) -> Self {
        self.opacity = opacity.to_string();
        self
    }

    pub fn unrendered(mut self) -> Self {
        self.rendered = false;
        self
    }

    pub fn rejecting(mut self, tiers: &[InteractionTier]) -> Self {
        self.reject.extend(tiers.iter().copied());
        self
    }

    fn raw(&self) -> RawElement {
        RawElement {
            tag: self.tag.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            input_type: self.input_type.clone(),
            text: self.text.clone(),
            placeholder: self.placeholder.clone(),
            label: self.label.clone(),
            value: self.value.clone(),
            display: self.display.clone(),
            visibility: self.visibility.clone(),
            opacity: self.opacity.clone(),
            rendered: self.rendered,
        }
    }

    fn accessible_name(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.text.clone())
            .or_else(|| self.value.clone())
            .unwrap_or_default()
    }

    fn is_button(&self) -> bool {
        self.tag == "button"
            || (self.tag == "input"
                && matches!(
                    self.input_type.as_deref(),
                    Some("button") | Some("submit") | Some("reset")
                ))
            || self.role.as_deref() == Some("button")
    }

    fn is_link(&self) -> bool {
        (self.tag == "a" && self.href) || self.role.as_deref() == Some("link")
    }

    fn is_editable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }
}

fn contains_ci(haystack: &Option<String>, needle: &str) -> bool {
    haystack
        .as_deref()
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct PageState {
    elements: Vec<FakeElement>,
    visited: Vec<String>,
    clicks: Vec<(String, InteractionTier)>,
    fills: Vec<(String, String, InteractionTier)>,
    input_events: Vec<String>,
    keys: Vec<String>,
    snapshots: usize,
    closes: usize,
    fail_goto: bool,
    fail_snapshot_after: Option<usize>,
    fail_screenshot: bool,
    unresponsive: bool,
}

/// In-memory page. Clones share state, so a test keeps one handle while the
/// launcher hands another to the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
    events: Option<Events>,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        let page = Self::default();
        page.state.lock().unwrap().elements = elements;
        page
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = Some(events);
        self
    }

    pub fn failing_goto(self) -> Self {
        self.state.lock().unwrap().fail_goto = true;
        self
    }

    /// Inventory reads succeed `n` times, then fail
    pub fn failing_snapshot_after(self, n: usize) -> Self {
        self.state.lock().unwrap().fail_snapshot_after = Some(n);
        self
    }

    /// Inventory reads and element queries never complete
    pub fn unresponsive(self) -> Self {
        self.state.lock().unwrap().unresponsive = true;
        self
    }

    fn stalls(&self) -> bool {
        self.state.lock().unwrap().unresponsive
    }

    pub fn failing_screenshot(self) -> Self {
        self.state.lock().unwrap().fail_screenshot = true;
        self
    }

    pub fn value_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .iter()
            .find(|el| el.id.as_deref() == Some(id))
            .and_then(|el| el.value.clone())
    }

    pub fn clicks(&self) -> Vec<(String, InteractionTier)> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String, InteractionTier)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn input_events(&self) -> Vec<String> {
        self.state.lock().unwrap().input_events.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().keys.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn snapshots(&self) -> usize {
        self.state.lock().unwrap().snapshots
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn is_closed(&self) -> bool {
        self.closes() > 0
    }

    fn index(element: &ElementRef) -> Result<usize> {
        element
            .as_str()
            .parse()
            .map_err(|_| PilotError::browser(format!("bad ref {}", element)))
    }

    fn describe(el: &FakeElement) -> String {
        el.id
            .clone()
            .or_else(|| el.text.clone())
            .unwrap_or_else(|| el.tag.clone())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        push(&self.events, "goto");
        let mut state = self.state.lock().unwrap();
        if state.fail_goto {
            return Err(PilotError::browser(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        state.visited.push(url.to_string());
        Ok(())
    }

    async fn interactive_elements(&self) -> Result<Vec<RawElement>> {
        if self.stalls() {
            futures::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_snapshot_after {
            if state.snapshots >= limit {
                return Err(PilotError::browser("Target closed"));
            }
        }
        state.snapshots += 1;
        Ok(state.elements.iter().map(FakeElement::raw).collect())
    }

    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementRef>> {
        if self.stalls() {
            futures::future::pending::<()>().await;
        }
        let state = self.state.lock().unwrap();
        let matches = |el: &FakeElement| match query {
            ElementQuery::Id(id) => el.id.as_deref() == Some(id.as_str()),
            ElementQuery::Name(name) => el.name.as_deref() == Some(name.as_str()),
            ElementQuery::Placeholder(p) => contains_ci(&el.placeholder, p),
            ElementQuery::Label(l) => contains_ci(&el.label, l),
            ElementQuery::Role {
                role: AriaRole::Button,
                name,
            } => el.is_button() && contains_ci(&Some(el.accessible_name()), name),
            ElementQuery::Role {
                role: AriaRole::Link,
                name,
            } => el.is_link() && contains_ci(&Some(el.accessible_name()), name),
            ElementQuery::Text(t) => contains_ci(&el.text, t),
        };

        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| matches(el))
            .map(|(i, _)| ElementRef::new(i.to_string()))
            .collect())
    }

    async fn click(&self, element: &ElementRef, tier: InteractionTier) -> Result<()> {
        let index = Self::index(element)?;
        let mut state = self.state.lock().unwrap();
        let el = state
            .elements
            .get(index)
            .ok_or_else(|| PilotError::browser("element detached"))?;
        if el.reject.contains(&tier) {
            return Err(PilotError::interaction(format!(
                "{} rejected {} click",
                Self::describe(el),
                tier
            )));
        }
        let label = Self::describe(el);
        state.clicks.push((label.clone(), tier));
        drop(state);
        push(&self.events, format!("click:{}", label));
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str, tier: InteractionTier) -> Result<()> {
        let index = Self::index(element)?;
        let mut state = self.state.lock().unwrap();
        let el = state
            .elements
            .get_mut(index)
            .ok_or_else(|| PilotError::browser("element detached"))?;
        if el.reject.contains(&tier) {
            return Err(PilotError::interaction(format!(
                "{} rejected {} fill",
                Self::describe(el),
                tier
            )));
        }
        if !el.is_editable() {
            return Err(PilotError::interaction("element is not editable"));
        }
        el.value = Some(value.to_string());
        let label = Self::describe(el);
        state.fills.push((label, value.to_string(), tier));
        Ok(())
    }

    async fn dispatch_input(&self, element: &ElementRef) -> Result<()> {
        let index = Self::index(element)?;
        let mut state = self.state.lock().unwrap();
        let label = state
            .elements
            .get(index)
            .map(Self::describe)
            .ok_or_else(|| PilotError::browser("element detached"))?;
        state.input_events.push(label);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.state.lock().unwrap().keys.push(key.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        push(&self.events, "screenshot");
        if self.state.lock().unwrap().fail_screenshot {
            return Err(PilotError::browser("screenshot failed: Target closed"));
        }
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&self) -> Result<()> {
        push(&self.events, "close");
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Launcher, host reset, artifacts
// ---------------------------------------------------------------------------

pub struct FakeLauncher {
    page: FakePage,
    fail: bool,
    launches: AtomicUsize,
    events: Option<Events>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            fail: false,
            launches: AtomicUsize::new(0),
            events: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = Some(events);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        push(&self.events, "launch");
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PilotError::browser(
                "failed to launch browser: Could not auto detect a chrome executable",
            ));
        }
        Ok(Box::new(self.page.clone()))
    }
}

pub struct FakeReset {
    fail: bool,
    calls: AtomicUsize,
    events: Option<Events>,
}

impl FakeReset {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
            events: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = Some(events);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnvironmentReset for FakeReset {
    async fn reset(&self) -> Result<CleanupReport> {
        push(&self.events, "reset");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PilotError::Other("cannot scan /proc".to_string()));
        }
        Ok(CleanupReport {
            killed: 1,
            purged: 2,
            failures: 0,
        })
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    uploads: Mutex<Vec<(String, usize)>>,
}

impl MemoryArtifacts {
    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn upload(&self, run_id: &str, png: &[u8]) -> Result<ScreenshotRef> {
        self.uploads
            .lock()
            .unwrap()
            .push((run_id.to_string(), png.len()));
        Ok(ScreenshotRef {
            uri: format!("memory://screenshots/{}.png", run_id),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Replays replies in order; once the queue is empty the fallback repeats
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every reply succeeds with the given text
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn repeating(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompt of every call, in order
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|messages| messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        _options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages.to_vec());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply.map(|content| LLMResponse::text(content, model)),
            None => match &self.fallback {
                Some(reply) => Ok(LLMResponse::text(reply.clone(), model)),
                None => Err(PilotError::oracle("connection refused")),
            },
        }
    }

    async fn is_model_available(&self, _model: &str) -> Result<bool> {
        Ok(true)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted".to_string()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Agent settings with every delay at zero
pub fn fast_settings() -> AgentConfig {
    AgentConfig {
        settle_delay_ms: 0,
        wait_delay_ms: 0,
        ..AgentConfig::default()
    }
}

pub fn oracle(provider: Arc<ScriptedProvider>) -> DecisionOracle {
    DecisionOracle::new(provider, "scripted").with_retry(3, Duration::ZERO)
}

pub fn agent_loop(provider: Arc<ScriptedProvider>) -> AgentLoop {
    agent_loop_with(provider, fast_settings())
}

pub fn agent_loop_with(provider: Arc<ScriptedProvider>, settings: AgentConfig) -> AgentLoop {
    AgentLoop::new(
        oracle(provider),
        StepExecutor::new(Duration::from_secs(1)),
        settings,
    )
}

/// The log-in form used across tests
pub fn login_page() -> FakePage {
    FakePage::new(vec![
        FakeElement::input("user").placeholder("Username"),
        FakeElement::input("pass")
            .placeholder("Password")
            .input_type("password"),
        FakeElement::button("Sign In").id("submit"),
        FakeElement::link("Forgot password?"),
    ])
}
