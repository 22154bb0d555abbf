//! Scripted stand-in for the browser and the portals behind it.
//!
//! Every interaction succeeds unless scripted otherwise. Selectors can be made
//! to never appear, to carry text, or to only appear once the right CAPTCHA
//! answer was entered.

use async_trait::async_trait;
use parking_lot::Mutex;
use portalflow_browser::{
    Action, BrowserDriver, BrowserError, BrowserPage, CaptureRegion, Interaction, LaunchOptions,
    Result, WaitUntil,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// PNG signature followed by a marker, enough to tell captures apart.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, b'f', b'a', b'k', b'e'];

#[derive(Debug, Clone, PartialEq)]
pub enum FakeEvent {
    Navigate(String),
    Interact(Action),
    Screenshot(CaptureRegion),
    Evaluate { script: String, arg: Value },
    Close,
}

#[derive(Debug, Clone)]
struct CaptchaGate {
    input: String,
    answer: String,
    gated: Vec<String>,
    validation_global: Option<String>,
}

#[derive(Default)]
struct Script {
    texts: HashMap<String, String>,
    present: HashSet<String>,
    missing: HashSet<String>,
    captcha: Option<CaptchaGate>,
    hold: Option<(String, Arc<Notify>, Arc<Notify>)>,
    fail_open: bool,
}

#[derive(Default)]
struct Shared {
    opens: AtomicUsize,
    closes: AtomicUsize,
    script: Mutex<Script>,
    events: Mutex<Vec<FakeEvent>>,
}

/// Lets a test pause a page mid-step.
pub struct HoldHandle {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl HoldHandle {
    /// Resolves once a page is waiting on the held selector.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    shared: Arc<Shared>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open(self) -> Self {
        self.shared.script.lock().fail_open = true;
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.shared
            .script
            .lock()
            .texts
            .insert(selector.to_string(), text.to_string());
        self
    }

    /// Makes `exists` report the selector as present.
    pub fn with_present(self, selector: &str) -> Self {
        self.shared
            .script
            .lock()
            .present
            .insert(selector.to_string());
        self
    }

    /// Waiting for the selector always times out.
    pub fn with_missing(self, selector: &str) -> Self {
        self.shared
            .script
            .lock()
            .missing
            .insert(selector.to_string());
        self
    }

    /// The `gated` selectors only appear after `answer` was entered into
    /// `input`, or injected through `validation_global`.
    pub fn with_captcha(
        self,
        input: &str,
        answer: &str,
        gated: &[&str],
        validation_global: Option<&str>,
    ) -> Self {
        self.shared.script.lock().captcha = Some(CaptchaGate {
            input: input.to_string(),
            answer: answer.to_string(),
            gated: gated.iter().map(|selector| selector.to_string()).collect(),
            validation_global: validation_global.map(str::to_string),
        });
        self
    }

    /// Blocks any wait on `selector` until the handle is released.
    pub fn hold_at(&self, selector: &str) -> HoldHandle {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.shared.script.lock().hold =
            Some((selector.to_string(), reached.clone(), release.clone()));
        HoldHandle { reached, release }
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.opens().saturating_sub(self.closes())
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.shared.events.lock().clone()
    }

    /// Last value written into `selector` by fill or type.
    pub fn entered(&self, selector: &str) -> Option<String> {
        self.events().into_iter().rev().find_map(|event| match event {
            FakeEvent::Interact(Action::Fill { selector: s, text })
            | FakeEvent::Interact(Action::Type {
                selector: s, text, ..
            }) if s == selector => Some(text),
            _ => None,
        })
    }

    pub fn evaluations(&self) -> Vec<(String, Value)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                FakeEvent::Evaluate { script, arg } => Some((script, arg)),
                _ => None,
            })
            .collect()
    }

    /// A page that is not tracked by `opens`.
    pub fn page(&self) -> Box<dyn BrowserPage> {
        Box::new(FakePage::new(self.shared.clone()))
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open(&self, _options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
        if self.shared.script.lock().fail_open {
            return Err(BrowserError::Launch("fake driver refused to open".to_string()));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage::new(self.shared.clone())))
    }
}

pub struct FakePage {
    shared: Arc<Shared>,
    closed: bool,
    captcha_attempt: Option<String>,
    injected: Option<String>,
}

impl FakePage {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            closed: false,
            captcha_attempt: None,
            injected: None,
        }
    }

    fn record(&self, event: FakeEvent) {
        self.shared.events.lock().push(event);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }

    fn is_visible(&self, selector: &str) -> bool {
        let script = self.shared.script.lock();
        if script.missing.contains(selector) {
            return false;
        }
        match &script.captcha {
            Some(gate) if gate.gated.iter().any(|gated| gated == selector) => {
                let typed = self.captcha_attempt.as_deref() == Some(gate.answer.as_str());
                let injected = self.injected.is_some() && self.injected == self.captcha_attempt;
                typed || injected
            }
            _ => true,
        }
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<Value> {
        let hold = self.shared.script.lock().hold.clone();
        if let Some((held, reached, release)) = hold
            && held == selector
        {
            reached.notify_one();
            release.notified().await;
        }

        if self.is_visible(selector) {
            Ok(Value::Bool(true))
        } else {
            Err(BrowserError::Timeout {
                operation: format!("{} to be visible", selector),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&mut self, url: &str, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.record(FakeEvent::Navigate(url.to_string()));
        Ok(())
    }

    async fn interact(&mut self, interaction: Interaction) -> Result<Value> {
        self.ensure_open()?;
        let timeout = interaction.timeout();
        self.record(FakeEvent::Interact(interaction.action.clone()));

        match interaction.action {
            Action::Fill { selector, text } | Action::Type { selector, text, .. } => {
                let is_captcha_input = self
                    .shared
                    .script
                    .lock()
                    .captcha
                    .as_ref()
                    .is_some_and(|gate| gate.input == selector);
                if is_captcha_input {
                    self.captcha_attempt = Some(text);
                }
                Ok(Value::Null)
            }
            Action::WaitForSelector { selector, .. } => self.wait_for(&selector, timeout).await,
            Action::TextContent { selector } => {
                if !self.is_visible(&selector) {
                    return Err(BrowserError::Timeout {
                        operation: format!("text of {}", selector),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                let text = self.shared.script.lock().texts.get(&selector).cloned();
                Ok(text.map(Value::String).unwrap_or(Value::Null))
            }
            Action::Exists { selector } => Ok(Value::Bool(
                self.shared.script.lock().present.contains(&selector),
            )),
            Action::CheckAll { .. } => Ok(Value::from(3)),
            Action::Title => Ok(Value::String("Fake Portal".to_string())),
            _ => Ok(Value::Null),
        }
    }

    async fn screenshot(&mut self, region: CaptureRegion, _timeout: Duration) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.record(FakeEvent::Screenshot(region));
        Ok(FAKE_PNG.to_vec())
    }

    async fn evaluate(&mut self, script: &str, arg: Value, _timeout: Duration) -> Result<Value> {
        self.ensure_open()?;
        self.record(FakeEvent::Evaluate {
            script: script.to_string(),
            arg: arg.clone(),
        });

        let global = self
            .shared
            .script
            .lock()
            .captcha
            .as_ref()
            .and_then(|gate| gate.validation_global.clone());
        if let (Some(global), Some(pair)) = (global, arg.as_array())
            && pair.len() == 2
            && pair[0].as_str() == Some(global.as_str())
        {
            self.injected = pair[1].as_str().map(str::to_string);
        }
        Ok(Value::Null)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.record(FakeEvent::Close);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
