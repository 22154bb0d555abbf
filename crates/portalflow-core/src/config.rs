use crate::error::{OrchestratorError, Result};
use portalflow_browser::{LaunchOptions, MAX_INTERACTION_TIMEOUT};
use std::time::Duration;

/// How long a single interaction may take. Quick UI transitions get the
/// shortest budget, page loads the longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Quick,
    Standard,
    Slow,
    Navigation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub quick: Duration,
    pub standard: Duration,
    pub slow: Duration,
    pub navigation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(5),
            standard: Duration::from_secs(10),
            slow: Duration::from_secs(15),
            navigation: Duration::from_secs(25),
        }
    }
}

impl Timeouts {
    pub fn get(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Quick => self.quick,
            Tier::Standard => self.standard,
            Tier::Slow => self.slow,
            Tier::Navigation => self.navigation,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("quick", self.quick),
            ("standard", self.standard),
            ("slow", self.slow),
            ("navigation", self.navigation),
        ] {
            if value.is_zero() {
                return Err(OrchestratorError::Config(format!(
                    "timeouts.{} must be greater than zero",
                    name
                )));
            }
            if value > MAX_INTERACTION_TIMEOUT {
                return Err(OrchestratorError::Config(format!(
                    "timeouts.{} must not exceed {} seconds",
                    name,
                    MAX_INTERACTION_TIMEOUT.as_secs()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    pub vahan: String,
    pub passport: String,
    pub eid: String,
}

impl Default for PortalUrls {
    fn default() -> Self {
        Self {
            vahan: "http://localhost:3000".to_string(),
            passport: "http://localhost:5000/mock-pastport-website.html".to_string(),
            eid: "http://localhost:5000/eid-mock-portal.html".to_string(),
        }
    }
}

/// Writing answers into a portal's client-side validation state is only
/// acceptable against controlled test doubles, so it is off unless enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengePolicy {
    pub allow_trusted_injection: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub timeouts: Timeouts,
    pub portals: PortalUrls,
    pub challenge: ChallengePolicy,
    pub launch: LaunchOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            timeouts: Timeouts::default(),
            portals: PortalUrls::default(),
            challenge: ChallengePolicy::default(),
            launch: LaunchOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl.is_zero() {
            return Err(OrchestratorError::Config(
                "sessions.ttl must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(OrchestratorError::Config(
                "sessions.sweep_interval must be greater than zero".to_string(),
            ));
        }
        self.timeouts.validate()
    }
}
