//! Browser resource for PortalFlow.
//!
//! A task session borrows exactly one [`BrowserPage`] for its whole lifetime
//! and must hand it back through [`BrowserPage::close`]. This crate provides:
//! - The [`BrowserDriver`] / [`BrowserPage`] seams the orchestrator talks to
//! - Typed interactions with mandatory, bounded timeouts
//! - A Playwright-backed driver that keeps one Node.js process per page alive
//!   across disconnected HTTP calls

mod error;
mod playwright;

pub use error::{BrowserError, Result};
pub use playwright::{PlaywrightDriver, RuntimeProbe};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Upper bound accepted for any single interaction.
pub const MAX_INTERACTION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchOptions {
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub slow_mo_ms: u64,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: default_headless(),
            slow_mo_ms: 0,
            launch_timeout_secs: default_launch_timeout_secs(),
        }
    }
}

impl LaunchOptions {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs.max(1))
    }
}

/// Load state a navigation waits for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_playwright(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Attached,
    #[default]
    Visible,
    Hidden,
}

/// A single page action. Selector strings are passed to the engine verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        selector: String,
    },
    Fill {
        selector: String,
        text: String,
    },
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        delay_ms: u64,
    },
    SelectOption {
        selector: String,
        value: String,
    },
    Check {
        selector: String,
    },
    /// Checks every checkbox matched by the selector.
    CheckAll {
        selector: String,
    },
    Hover {
        selector: String,
    },
    WaitForSelector {
        selector: String,
        #[serde(default)]
        state: WaitState,
    },
    TextContent {
        selector: String,
    },
    Exists {
        selector: String,
    },
    Title,
    Pause {
        ms: u64,
    },
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Action::Click { selector } => format!("click {}", selector),
            Action::Fill { selector, .. } => format!("fill {}", selector),
            Action::Type { selector, .. } => format!("type into {}", selector),
            Action::SelectOption { selector, value } => {
                format!("select '{}' in {}", value, selector)
            }
            Action::Check { selector } => format!("check {}", selector),
            Action::CheckAll { selector } => format!("check all {}", selector),
            Action::Hover { selector } => format!("hover {}", selector),
            Action::WaitForSelector { selector, state } => {
                format!("{} to be {:?}", selector, state).to_lowercase()
            }
            Action::TextContent { selector } => format!("text of {}", selector),
            Action::Exists { selector } => format!("presence of {}", selector),
            Action::Title => "page title".to_string(),
            Action::Pause { ms } => format!("pause {}ms", ms),
        }
    }
}

/// An [`Action`] paired with the timeout it must finish within.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    #[serde(flatten)]
    pub action: Action,
    pub timeout_ms: u64,
}

impl Interaction {
    pub fn new(action: Action, timeout: Duration) -> Self {
        Self {
            action,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Area captured by [`BrowserPage::screenshot`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureRegion {
    FullPage,
    Viewport,
    Element { selector: String },
}

impl CaptureRegion {
    pub fn element(selector: impl Into<String>) -> Self {
        CaptureRegion::Element {
            selector: selector.into(),
        }
    }
}

/// Opens browser pages. One call yields one exclusively owned page.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>>;
}

/// A live page. Every operation suspends until the engine answers or the
/// given timeout elapses.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(&mut self, url: &str, wait_until: WaitUntil, timeout: Duration)
    -> Result<()>;

    async fn interact(&mut self, interaction: Interaction) -> Result<Value>;

    async fn screenshot(&mut self, region: CaptureRegion, timeout: Duration) -> Result<Vec<u8>>;

    /// Runs `script` (a JavaScript function source) in the page with `arg`.
    async fn evaluate(&mut self, script: &str, arg: Value, timeout: Duration) -> Result<Value>;

    /// Releases the page. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Rejects zero and oversized timeouts before they reach the engine.
pub fn ensure_bounded(timeout: Duration, operation: &str) -> Result<()> {
    if timeout.is_zero() {
        return Err(BrowserError::InvalidTimeout(format!(
            "{} requires a non-zero timeout",
            operation
        )));
    }
    if timeout > MAX_INTERACTION_TIMEOUT {
        return Err(BrowserError::InvalidTimeout(format!(
            "{} timeout of {} ms exceeds the {} ms limit",
            operation,
            timeout.as_millis(),
            MAX_INTERACTION_TIMEOUT.as_millis()
        )));
    }
    Ok(())
}

fn default_headless() -> bool {
    true
}

fn default_launch_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interaction_serializes_flat_with_type_tag() {
        let interaction = Interaction::new(
            Action::Fill {
                selector: "#regNumber".to_string(),
                text: "DL01AB1234".to_string(),
            },
            Duration::from_secs(5),
        );

        let value = serde_json::to_value(&interaction).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "fill",
                "selector": "#regNumber",
                "text": "DL01AB1234",
                "timeout_ms": 5000
            })
        );
    }

    #[test]
    fn wait_state_defaults_to_visible() {
        let parsed: Interaction = serde_json::from_value(json!({
            "type": "wait_for_selector",
            "selector": "#otpForm",
            "timeout_ms": 10000
        }))
        .unwrap();

        assert_eq!(
            parsed.action,
            Action::WaitForSelector {
                selector: "#otpForm".to_string(),
                state: WaitState::Visible,
            }
        );
        assert_eq!(parsed.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_and_oversized_timeouts_are_rejected() {
        assert!(ensure_bounded(Duration::ZERO, "click").is_err());
        assert!(ensure_bounded(Duration::from_secs(600), "click").is_err());
        assert!(ensure_bounded(Duration::from_secs(15), "click").is_ok());
    }

    #[test]
    fn capture_region_element_helper() {
        let region = CaptureRegion::element("#captchaDisplay");
        let value = serde_json::to_value(&region).unwrap();
        assert_eq!(value, json!({"kind": "element", "selector": "#captchaDisplay"}));
    }
}
