//! Chromium backend over CDP
//!
//! Each launch starts a private Chromium with a throwaway profile directory
//! named `<prefix><owner pid>-<random>`. Host cleanup reads the owner pid back
//! out of the directory name and the browser command line, and only reclaims
//! what belongs to a process that no longer exists.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::scripts;
use super::{BrowserLauncher, ElementQuery, ElementRef, InteractionTier, PageDriver, RawElement};
use crate::core::config::BrowserConfig;
use crate::core::{PilotError, Result};

/// Launches one Chromium per run
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: BrowserConfig,
}

impl ChromiumLauncher {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn cdp_config(&self, profile: &TempDir) -> Result<CdpConfig> {
        let mut builder = CdpConfig::builder()
            .no_sandbox()
            .user_data_dir(profile.path())
            .window_size(self.config.window_width, self.config.window_height)
            .request_timeout(self.config.navigation_timeout())
            .args(vec![
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--no-first-run",
                "--no-default-browser-check",
                "--mute-audio",
            ]);

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(path) = &self.config.executable_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| PilotError::browser(format!("invalid browser config: {}", e)))
    }
}

/// Profile directory prefix tagged with this process as owner
pub fn profile_prefix(base: &str) -> String {
    format!("{}{}-", base, std::process::id())
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        let profile = tempfile::Builder::new()
            .prefix(&profile_prefix(&self.config.profile_prefix))
            .tempdir()?;
        let cdp_config = self.cdp_config(&profile)?;

        info!(
            headless = self.config.headless,
            executable = ?self.config.executable_path,
            profile = %profile.path().display(),
            "launching chromium"
        );

        let (mut browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| PilotError::browser(format!("failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "browser close after failed page open");
                }
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(PilotError::browser(format!("failed to open page: {}", e)));
            }
        };

        Ok(Box::new(ChromiumPage {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            profile: Mutex::new(Some(profile)),
            page,
        }))
    }
}

/// Status object returned by the interaction scripts
#[derive(Debug, Deserialize)]
struct ScriptStatus {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// A live page in a browser owned by one run
pub struct ChromiumPage {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    profile: Mutex<Option<TempDir>>,
    page: Page,
}

impl ChromiumPage {
    async fn eval_json<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let raw: String = self
            .page
            .evaluate_expression(script)
            .await
            .map_err(|e| PilotError::browser(format!("script evaluation failed: {}", e)))?
            .into_value()
            .map_err(|e| PilotError::browser(format!("unexpected script result: {}", e)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn run_script(&self, script: String) -> Result<()> {
        let status: ScriptStatus = self.eval_json(script).await?;
        if status.ok {
            Ok(())
        } else {
            Err(PilotError::interaction(
                status.reason.unwrap_or_else(|| "rejected by page".to_string()),
            ))
        }
    }

    async fn element(&self, element: &ElementRef) -> Result<Element> {
        self.page
            .find_element(scripts::ref_selector(element))
            .await
            .map_err(|e| PilotError::ElementNotFound(format!("ref {} ({})", element, e)))
    }

    async fn type_into(&self, element: &ElementRef, value: &str) -> Result<()> {
        let handle = self.element(element).await?;
        handle
            .focus()
            .await
            .map_err(|e| PilotError::interaction(format!("focus failed: {}", e)))?;
        self.run_script(scripts::clear_value(element)).await?;
        handle
            .type_str(value)
            .await
            .map_err(|e| PilotError::interaction(format!("typing failed: {}", e)))?;
        Ok(())
    }

    async fn dispatch_key(&self, spec: &KeySpec) -> Result<()> {
        let down_type = if spec.text.is_some() {
            DispatchKeyEventType::KeyDown
        } else {
            DispatchKeyEventType::RawKeyDown
        };

        let mut down = DispatchKeyEventParams::builder()
            .r#type(down_type)
            .key(spec.key.clone())
            .code(spec.code.clone())
            .windows_virtual_key_code(spec.key_code);
        if let Some(text) = &spec.text {
            down = down.text(text.clone());
        }
        let down = down
            .build()
            .map_err(|e| PilotError::interaction(format!("failed to build key event: {}", e)))?;
        self.page
            .execute(down)
            .await
            .map_err(|e| PilotError::interaction(format!("key down failed: {}", e)))?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(spec.key.clone())
            .code(spec.code.clone())
            .windows_virtual_key_code(spec.key_code)
            .build()
            .map_err(|e| PilotError::interaction(format!("failed to build key event: {}", e)))?;
        self.page
            .execute(up)
            .await
            .map_err(|e| PilotError::interaction(format!("key up failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PilotError::browser(format!("navigation to {} failed: {}", url, e)))?;
        debug!(url, "navigated");
        Ok(())
    }

    async fn interactive_elements(&self) -> Result<Vec<RawElement>> {
        self.eval_json(scripts::inventory()).await
    }

    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementRef>> {
        let refs: Vec<String> = self.eval_json(scripts::query(query)).await?;
        Ok(refs.into_iter().map(ElementRef::new).collect())
    }

    async fn click(&self, element: &ElementRef, tier: InteractionTier) -> Result<()> {
        match tier {
            InteractionTier::Standard => {
                self.run_script(scripts::actionability(element)).await?;
                self.element(element)
                    .await?
                    .click()
                    .await
                    .map_err(|e| PilotError::interaction(format!("click failed: {}", e)))?;
            }
            InteractionTier::Forced => {
                self.element(element)
                    .await?
                    .click()
                    .await
                    .map_err(|e| PilotError::interaction(format!("click failed: {}", e)))?;
            }
            InteractionTier::Script => {
                self.run_script(scripts::script_click(element)).await?;
            }
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str, tier: InteractionTier) -> Result<()> {
        match tier {
            InteractionTier::Standard => {
                self.run_script(scripts::actionability(element)).await?;
                self.type_into(element, value).await
            }
            InteractionTier::Forced => self.type_into(element, value).await,
            InteractionTier::Script => self.run_script(scripts::script_fill(element, value)).await,
        }
    }

    async fn dispatch_input(&self, element: &ElementRef) -> Result<()> {
        self.run_script(scripts::dispatch_input(element)).await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let spec = key_spec(key)
            .ok_or_else(|| PilotError::interaction(format!("unsupported key '{}'", key)))?;
        self.dispatch_key(&spec).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| PilotError::browser(format!("screenshot failed: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "waiting for browser exit failed");
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        // Dropping the TempDir removes the profile
        drop(self.profile.lock().await.take());

        info!("browser closed");
        closed
            .map(|_| ())
            .map_err(|e| PilotError::browser(format!("browser close failed: {}", e)))
    }
}

/// CDP key event fields for a named key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub key: String,
    pub code: String,
    pub key_code: i64,
    pub text: Option<String>,
}

impl KeySpec {
    fn new(key: &str, code: &str, key_code: i64, text: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: text.map(str::to_string),
        }
    }
}

/// Map a key name from a decision to its CDP event fields.
///
/// Names are case-insensitive; a single printable character types itself.
pub fn key_spec(name: &str) -> Option<KeySpec> {
    let trimmed = name.trim();
    let spec = match trimmed.to_ascii_lowercase().as_str() {
        "enter" | "return" => KeySpec::new("Enter", "Enter", 13, Some("\r")),
        "tab" => KeySpec::new("Tab", "Tab", 9, None),
        "escape" | "esc" => KeySpec::new("Escape", "Escape", 27, None),
        "backspace" => KeySpec::new("Backspace", "Backspace", 8, None),
        "delete" | "del" => KeySpec::new("Delete", "Delete", 46, None),
        "space" => KeySpec::new(" ", "Space", 32, Some(" ")),
        "arrowup" | "up" => KeySpec::new("ArrowUp", "ArrowUp", 38, None),
        "arrowdown" | "down" => KeySpec::new("ArrowDown", "ArrowDown", 40, None),
        "arrowleft" | "left" => KeySpec::new("ArrowLeft", "ArrowLeft", 37, None),
        "arrowright" | "right" => KeySpec::new("ArrowRight", "ArrowRight", 39, None),
        "home" => KeySpec::new("Home", "Home", 36, None),
        "end" => KeySpec::new("End", "End", 35, None),
        "pageup" => KeySpec::new("PageUp", "PageUp", 33, None),
        "pagedown" => KeySpec::new("PageDown", "PageDown", 34, None),
        "insert" | "ins" => KeySpec::new("Insert", "Insert", 45, None),
        "shift" => KeySpec::new("Shift", "ShiftLeft", 16, None),
        "control" | "ctrl" => KeySpec::new("Control", "ControlLeft", 17, None),
        "alt" | "option" => KeySpec::new("Alt", "AltLeft", 18, None),
        "meta" | "cmd" | "command" => KeySpec::new("Meta", "MetaLeft", 91, None),
        lower if function_key(lower).is_some() => {
            let n = function_key(lower)?;
            let name = format!("F{}", n);
            KeySpec::new(&name, &name, 111 + n as i64, None)
        }
        _ => {
            let mut chars = trimmed.chars();
            let c = chars.next()?;
            if chars.next().is_some() || c.is_control() {
                return None;
            }
            let code = if c.is_ascii_alphabetic() {
                format!("Key{}", c.to_ascii_uppercase())
            } else if c.is_ascii_digit() {
                format!("Digit{}", c)
            } else {
                String::new()
            };
            let key_code = if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase() as i64
            } else {
                0
            };
            let text = c.to_string();
            KeySpec {
                key: text.clone(),
                code,
                key_code,
                text: Some(text),
            }
        }
    };
    Some(spec)
}

/// `f1` through `f12`
fn function_key(lower: &str) -> Option<u8> {
    let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
    (1..=12).contains(&n).then_some(n)
}
