//! Portal interactions behind every [`StepId`].

mod eid;
mod passport;
mod vahan;

use crate::challenge::{self, ChallengeInput, ChallengeStrategy};
use crate::config::{PortalUrls, Tier, Timeouts};
use crate::error::{OrchestratorError, Result};
use crate::fields::AccumulatedFields;
use crate::protocol::{StepDefinition, StepId};
use portalflow_browser::{Action, BrowserPage, Interaction, WaitState, WaitUntil};
use serde_json::Value;

/// What a step left behind.
#[derive(Debug)]
pub enum StepEffect {
    Advanced { challenge: Option<Vec<u8>> },
    Completed(Value),
}

impl StepEffect {
    pub fn advanced() -> Self {
        StepEffect::Advanced { challenge: None }
    }

    pub fn challenge(image: Vec<u8>) -> Self {
        StepEffect::Advanced {
            challenge: Some(image),
        }
    }
}

/// Page wrapper that attaches a timeout tier to every call.
pub struct PortalPage<'a> {
    page: &'a mut dyn BrowserPage,
    timeouts: &'a Timeouts,
}

impl<'a> PortalPage<'a> {
    pub fn new(page: &'a mut dyn BrowserPage, timeouts: &'a Timeouts) -> Self {
        Self { page, timeouts }
    }

    async fn act(&mut self, action: Action, tier: Tier) -> Result<Value> {
        let interaction = Interaction::new(action, self.timeouts.get(tier));
        Ok(self.page.interact(interaction).await?)
    }

    pub async fn goto(&mut self, url: &str) -> Result<()> {
        self.page
            .navigate(url, WaitUntil::DomContentLoaded, self.timeouts.get(Tier::Navigation))
            .await?;
        Ok(())
    }

    pub async fn click(&mut self, selector: &str) -> Result<()> {
        self.act(
            Action::Click {
                selector: selector.to_string(),
            },
            Tier::Quick,
        )
        .await
        .map(|_| ())
    }

    pub async fn fill(&mut self, selector: &str, text: &str) -> Result<()> {
        self.act(
            Action::Fill {
                selector: selector.to_string(),
                text: text.to_string(),
            },
            Tier::Quick,
        )
        .await
        .map(|_| ())
    }

    /// Clears the field, then types key by key.
    pub async fn retype(&mut self, selector: &str, text: &str) -> Result<()> {
        self.fill(selector, "").await?;
        self.type_text(selector, text).await
    }

    pub async fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        self.act(
            Action::Type {
                selector: selector.to_string(),
                text: text.to_string(),
                delay_ms: 50,
            },
            Tier::Standard,
        )
        .await
        .map(|_| ())
    }

    pub async fn select(&mut self, selector: &str, value: &str) -> Result<()> {
        self.act(
            Action::SelectOption {
                selector: selector.to_string(),
                value: value.to_string(),
            },
            Tier::Quick,
        )
        .await
        .map(|_| ())
    }

    pub async fn check(&mut self, selector: &str) -> Result<()> {
        self.act(
            Action::Check {
                selector: selector.to_string(),
            },
            Tier::Quick,
        )
        .await
        .map(|_| ())
    }

    pub async fn check_all(&mut self, selector: &str) -> Result<()> {
        self.act(
            Action::CheckAll {
                selector: selector.to_string(),
            },
            Tier::Standard,
        )
        .await
        .map(|_| ())
    }

    pub async fn hover(&mut self, selector: &str) -> Result<()> {
        self.act(
            Action::Hover {
                selector: selector.to_string(),
            },
            Tier::Quick,
        )
        .await
        .map(|_| ())
    }

    pub async fn wait_for(&mut self, selector: &str, tier: Tier) -> Result<()> {
        self.act(
            Action::WaitForSelector {
                selector: selector.to_string(),
                state: WaitState::Visible,
            },
            tier,
        )
        .await
        .map(|_| ())
    }

    pub async fn text(&mut self, selector: &str) -> Result<Option<String>> {
        let value = self
            .act(
                Action::TextContent {
                    selector: selector.to_string(),
                },
                Tier::Quick,
            )
            .await?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string))
    }

    pub async fn text_or(&mut self, selector: &str, fallback: &str) -> Result<String> {
        Ok(self
            .text(selector)
            .await?
            .unwrap_or_else(|| fallback.to_string()))
    }

    pub async fn exists(&mut self, selector: &str) -> Result<bool> {
        let value = self
            .act(
                Action::Exists {
                    selector: selector.to_string(),
                },
                Tier::Quick,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn pause(&mut self, ms: u64) -> Result<()> {
        self.act(Action::Pause { ms }, Tier::Quick).await.map(|_| ())
    }

    pub async fn evaluate(&mut self, script: &str, arg: Value) -> Result<Value> {
        Ok(self
            .page
            .evaluate(script, arg, self.timeouts.get(Tier::Quick))
            .await?)
    }

    pub async fn capture(&mut self, selector: &str) -> Result<Vec<u8>> {
        challenge::capture(&mut *self.page, selector, self.timeouts).await
    }
}

/// Everything a step needs for one run.
pub struct StepContext<'a> {
    pub step: &'a StepDefinition,
    pub page: PortalPage<'a>,
    pub fields: &'a AccumulatedFields,
    pub urls: &'a PortalUrls,
    pub strategy: &'a dyn ChallengeStrategy,
}

impl StepContext<'_> {
    /// Enters the caller's answer from `field` through the session strategy.
    pub async fn solve_challenge(
        &mut self,
        input_selector: &str,
        field: &str,
        typing_delay_ms: Option<u64>,
    ) -> Result<()> {
        let fields = self.fields;
        let solution = fields.require(field)?;
        let input = ChallengeInput {
            input_selector,
            solution,
            validation_global: self.step.validation_global,
            typing_delay_ms,
        };
        self.strategy
            .apply(&mut *self.page.page, &input, self.page.timeouts)
            .await
    }
}

pub async fn run_step(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    match ctx.step.id {
        StepId::VahanSearchCaptcha => vahan::open_search(ctx).await,
        StepId::VahanSearchResult => vahan::search_result(ctx).await,
        StepId::VahanSendOtp => vahan::send_otp(ctx).await,
        StepId::VahanVerifyOtp => vahan::verify_otp(ctx).await,
        StepId::VahanLocateVehicle => vahan::locate_vehicle(ctx).await,
        StepId::VahanConfirmVehicle => vahan::confirm_vehicle(ctx).await,
        StepId::VahanRegisterVehicle => vahan::register_vehicle(ctx).await,
        StepId::VahanTransferOwnership => vahan::transfer_ownership(ctx).await,
        StepId::VahanUpdateContacts => vahan::update_contacts(ctx).await,
        StepId::PassportLogin => passport::login(ctx).await,
        StepId::PassportApplication => passport::fill_application(ctx).await,
        StepId::PassportSubmit => passport::submit(ctx).await,
        StepId::EidOpenRegister => eid::open_view(ctx, eid::View::Register).await,
        StepId::EidRegisterForm => eid::register_form(ctx).await,
        StepId::EidRegisterSubmit => eid::register_submit(ctx).await,
        StepId::EidOpenSearch => eid::open_view(ctx, eid::View::Search).await,
        StepId::EidSearch => eid::search(ctx).await,
        StepId::EidOpenUpdate => eid::open_view(ctx, eid::View::Update).await,
        StepId::EidFindUser => eid::find_user(ctx).await,
        StepId::EidEditFields => eid::edit_fields(ctx).await,
        StepId::EidUpdateSubmit => eid::update_submit(ctx).await,
    }
}

/// Waits for `selector`; when it never shows up and `flag` is present the
/// portal has rejected the challenge answer.
async fn wait_or_challenge_rejected(
    page: &mut PortalPage<'_>,
    selector: &str,
    flag: &str,
) -> Result<()> {
    match page.wait_for(selector, Tier::Slow).await {
        Err(OrchestratorError::PortalInteractionTimeout { operation, hint }) => {
            if page.exists(flag).await.unwrap_or(false) {
                Err(OrchestratorError::PortalRejected(
                    "Incorrect CAPTCHA. Please try again.".to_string(),
                ))
            } else {
                Err(OrchestratorError::PortalInteractionTimeout { operation, hint })
            }
        }
        other => other,
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
