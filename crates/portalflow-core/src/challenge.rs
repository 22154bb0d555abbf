//! CAPTCHA artifacts and the ways a caller's solution reaches the portal.

use crate::config::{ChallengePolicy, Tier, Timeouts};
use crate::error::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use portalflow_browser::{Action, BrowserPage, CaptureRegion, Interaction};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeArtifact {
    pub session_id: String,
    pub image_bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Tag of the step that produced the image.
    pub produced_at_step: &'static str,
}

impl ChallengeArtifact {
    pub fn png(session_id: impl Into<String>, image_bytes: Vec<u8>, step: &'static str) -> Self {
        Self {
            session_id: session_id.into(),
            image_bytes,
            mime_type: "image/png",
            produced_at_step: step,
        }
    }

    pub fn to_data_uri(&self) -> String {
        data_uri(self.mime_type, &self.image_bytes)
    }
}

pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
}

/// Screenshot of the challenge element.
pub async fn capture(page: &mut dyn BrowserPage, selector: &str, timeouts: &Timeouts) -> Result<Vec<u8>> {
    let bytes = page
        .screenshot(CaptureRegion::element(selector), timeouts.get(Tier::Standard))
        .await?;
    debug!(selector, bytes = bytes.len(), "Captured challenge image");
    Ok(bytes)
}

/// Artifacts waiting to be handed to the caller, one per session.
#[derive(Default)]
pub struct ChallengeStore {
    artifacts: Mutex<HashMap<String, ChallengeArtifact>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, artifact: ChallengeArtifact) {
        self.artifacts
            .lock()
            .insert(artifact.session_id.clone(), artifact);
    }

    /// Hands the artifact over. A second take returns `None`.
    pub fn take(&self, session_id: &str) -> Option<ChallengeArtifact> {
        self.artifacts.lock().remove(session_id)
    }

    pub fn discard(&self, session_id: &str) {
        self.artifacts.lock().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where and how a solution is entered.
#[derive(Debug, Clone)]
pub struct ChallengeInput<'a> {
    pub input_selector: &'a str,
    pub solution: &'a str,
    pub validation_global: Option<&'a str>,
    /// Type key by key with this delay instead of filling at once.
    pub typing_delay_ms: Option<u64>,
}

#[async_trait]
pub trait ChallengeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        page: &mut dyn BrowserPage,
        input: &ChallengeInput<'_>,
        timeouts: &Timeouts,
    ) -> Result<()>;
}

/// Types the caller's answer into the portal, exactly as a person would.
pub struct VisualSolve;

#[async_trait]
impl ChallengeStrategy for VisualSolve {
    fn name(&self) -> &'static str {
        "visual_solve"
    }

    async fn apply(
        &self,
        page: &mut dyn BrowserPage,
        input: &ChallengeInput<'_>,
        timeouts: &Timeouts,
    ) -> Result<()> {
        let action = match input.typing_delay_ms {
            Some(delay_ms) => Action::Type {
                selector: input.input_selector.to_string(),
                text: input.solution.to_string(),
                delay_ms,
            },
            None => Action::Fill {
                selector: input.input_selector.to_string(),
                text: input.solution.to_string(),
            },
        };
        page.interact(Interaction::new(action, timeouts.get(Tier::Quick)))
            .await?;
        Ok(())
    }
}

/// Visual solve plus writing the answer into the portal's client-side
/// validation global. Only valid against portals under our control.
pub struct TrustedInjection;

const INJECT_SCRIPT: &str = "([name, value]) => { window[name] = value; }";

#[async_trait]
impl ChallengeStrategy for TrustedInjection {
    fn name(&self) -> &'static str {
        "trusted_injection"
    }

    async fn apply(
        &self,
        page: &mut dyn BrowserPage,
        input: &ChallengeInput<'_>,
        timeouts: &Timeouts,
    ) -> Result<()> {
        VisualSolve.apply(page, input, timeouts).await?;
        if let Some(global) = input.validation_global {
            page.evaluate(
                INJECT_SCRIPT,
                json!([global, input.solution]),
                timeouts.get(Tier::Quick),
            )
            .await?;
            debug!(global, "Injected challenge solution");
        }
        Ok(())
    }
}

/// Injection needs both a declared validation global and explicit opt-in.
pub fn select_strategy(
    policy: &ChallengePolicy,
    validation_global: Option<&str>,
) -> &'static dyn ChallengeStrategy {
    if policy.allow_trusted_injection && validation_global.is_some() {
        &TrustedInjection
    } else {
        &VisualSolve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_is_taken_exactly_once() {
        let store = ChallengeStore::new();
        store.put(ChallengeArtifact::png("s1", vec![1, 2, 3], "request_captcha"));

        let artifact = store.take("s1").unwrap();
        assert_eq!(artifact.image_bytes, vec![1, 2, 3]);
        assert!(store.take("s1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn data_uri_is_base64_png() {
        let artifact = ChallengeArtifact::png("s1", b"png".to_vec(), "request_captcha");
        assert_eq!(artifact.to_data_uri(), "data:image/png;base64,cG5n");
    }

    #[test]
    fn injection_requires_policy_and_declared_global() {
        let allowed = ChallengePolicy {
            allow_trusted_injection: true,
        };
        let denied = ChallengePolicy::default();

        assert_eq!(select_strategy(&allowed, Some("captchaCode")).name(), "trusted_injection");
        assert_eq!(select_strategy(&allowed, None).name(), "visual_solve");
        assert_eq!(select_strategy(&denied, Some("captchaCode")).name(), "visual_solve");
    }

    #[test]
    fn discard_drops_pending_artifact() {
        let store = ChallengeStore::new();
        store.put(ChallengeArtifact::png("s2", vec![9], "fill_form"));
        store.discard("s2");
        assert!(store.take("s2").is_none());
    }
}
