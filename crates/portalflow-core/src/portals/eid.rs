//! E-ID portal: registration, lookup and updates, all behind one dropdown.

use super::{StepContext, StepEffect, today, wait_or_challenge_rejected};
use crate::config::Tier;
use crate::error::{OrchestratorError, Result};
use serde_json::{Map, Value, json};
use tracing::debug;

const CAPTCHA_INPUT: &str = "#captchaInput";
const CAPTCHA_ERROR: &str = "#captchaError:not(.hidden)";
const TYPING_DELAY_MS: u64 = 50;

const EDITABLE: [(&str, &str); 3] = [
    ("name", "update-name"),
    ("phone", "update-phone"),
    ("address", "update-address"),
];

const IS_READONLY: &str = "(id) => document.getElementById(id)?.hasAttribute('readonly') ?? false";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum View {
    Register,
    Search,
    Update,
}

impl View {
    fn nav(self) -> &'static str {
        match self {
            View::Register => "#navRegister",
            View::Search => "#navSearch",
            View::Update => "#navUpdate",
        }
    }

    fn active(self) -> &'static str {
        match self {
            View::Register => "#registerView.active",
            View::Search => "#searchView.active",
            View::Update => "#updateView.active",
        }
    }
}

pub(super) async fn open_view(ctx: &mut StepContext<'_>, view: View) -> Result<StepEffect> {
    let url = ctx.urls.eid.clone();
    ctx.page.goto(&url).await?;
    ctx.page.wait_for("nav.bg-blue-800", Tier::Standard).await?;
    ctx.page.hover("nav .dropdown:first-child").await?;
    ctx.page.wait_for(view.nav(), Tier::Quick).await?;
    ctx.page.click(view.nav()).await?;
    ctx.page.wait_for(view.active(), Tier::Standard).await?;
    debug!(?view, "E-ID view opened");
    Ok(StepEffect::advanced())
}

/// Waits for the CAPTCHA view and captures it whole.
async fn capture_challenge(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    ctx.page.wait_for("#captchaView.active", Tier::Standard).await?;
    ctx.page.wait_for("#captchaText", Tier::Quick).await?;
    let image = ctx.page.capture("#captchaView").await?;
    Ok(StepEffect::challenge(image))
}

/// Enters the CAPTCHA and waits for either outcome box. An error box is a
/// portal rejection carrying the portal's own message.
async fn submit_challenge(
    ctx: &mut StepContext<'_>,
    success: &str,
    error: &str,
    message: &str,
    fallback: &str,
) -> Result<()> {
    ctx.solve_challenge(CAPTCHA_INPUT, "captcha", Some(TYPING_DELAY_MS))
        .await?;
    ctx.page.click("#verifyCaptchaButton").await?;
    wait_or_challenge_rejected(
        &mut ctx.page,
        &format!("{}, {}", success, error),
        CAPTCHA_ERROR,
    )
    .await?;

    if ctx.page.exists(error).await? {
        let reason = ctx.page.text_or(message, fallback).await?;
        return Err(OrchestratorError::PortalRejected(reason));
    }
    Ok(())
}

pub(super) async fn register_form(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.wait_for("#registerForm", Tier::Quick).await?;
    ctx.page.type_text("#reg-name", fields.require("name")?).await?;
    // Date inputs ignore typed text in some locales.
    ctx.page
        .evaluate(
            "(date) => { document.getElementById('reg-dob').value = date; }",
            Value::String(fields.require("dob")?.to_string()),
        )
        .await?;
    ctx.page.select("#reg-gender", fields.require("gender")?).await?;
    ctx.page.type_text("#reg-phone", fields.require("phone")?).await?;
    ctx.page
        .type_text("#reg-address", fields.require("address")?)
        .await?;
    ctx.page.click("#registerButton").await?;
    capture_challenge(ctx).await
}

pub(super) async fn register_submit(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    submit_challenge(
        ctx,
        "#registerSuccessBox:not(.hidden)",
        "#registerErrorBox:not(.hidden)",
        "#registerErrorMessage",
        "Registration failed.",
    )
    .await?;

    let eid = ctx.page.text_or("#newEIdNumber", "N/A").await?;
    Ok(StepEffect::Completed(json!({
        "eId": eid,
        "name": fields.require("name")?,
        "status": "REGISTERED",
        "issuedDate": today(),
    })))
}

pub(super) async fn search(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.wait_for("#eid-number-search", Tier::Quick).await?;
    ctx.page
        .retype("#eid-number-search", fields.require("eId")?)
        .await?;
    ctx.page.click("#searchButton").await?;
    ctx.page
        .wait_for(
            "#resultsCard:not(.hidden), #searchErrorBox:not(.hidden)",
            Tier::Slow,
        )
        .await?;

    if ctx.page.exists("#searchErrorBox:not(.hidden)").await? {
        let reason = ctx
            .page
            .text_or("#searchErrorMessage", "E-ID not found.")
            .await?;
        return Err(OrchestratorError::PortalRejected(reason));
    }

    Ok(StepEffect::Completed(json!({
        "eId": ctx.page.text_or("#res-eid", "N/A").await?,
        "issuedDate": ctx.page.text_or("#res-issued", "N/A").await?,
        "status": "FOUND",
        "message": "E-ID found. Note: Personal information is masked for security.",
    })))
}

pub(super) async fn find_user(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.wait_for("#eid-number-update", Tier::Quick).await?;
    ctx.page
        .retype("#eid-number-update", fields.require("eId")?)
        .await?;
    ctx.page.click("#findUserButton").await?;
    ctx.page
        .wait_for(
            "#updateStep2:not(.hidden), #updateFindErrorBox:not(.hidden)",
            Tier::Slow,
        )
        .await?;

    if ctx.page.exists("#updateFindErrorBox:not(.hidden)").await? {
        let reason = ctx
            .page
            .text_or("#updateFindErrorMessage", "User not found.")
            .await?;
        return Err(OrchestratorError::PortalRejected(reason));
    }
    Ok(StepEffect::advanced())
}

pub(super) async fn edit_fields(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page
        .wait_for("#updateStep2:not(.hidden)", Tier::Quick)
        .await?;

    for (name, input) in EDITABLE {
        let Some(value) = fields.get(name) else {
            continue;
        };
        let readonly = ctx
            .page
            .evaluate(IS_READONLY, Value::String(input.to_string()))
            .await?;
        if readonly.as_bool().unwrap_or(false) {
            ctx.page
                .click(&format!("button[data-field=\"{}\"]", input))
                .await?;
            ctx.page.pause(300).await?;
        }
        ctx.page.retype(&format!("#{}", input), value).await?;
    }

    ctx.page.click("#updateSaveChangesButton").await?;
    capture_challenge(ctx).await
}

pub(super) async fn update_submit(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    submit_challenge(
        ctx,
        "#updateSuccessBox:not(.hidden)",
        "#updateErrorBox:not(.hidden)",
        "#updateErrorMessage",
        "Update failed.",
    )
    .await?;

    let mut result = Map::new();
    result.insert("eId".to_string(), json!(fields.require("eId")?));
    result.insert("status".to_string(), json!("UPDATED"));
    result.insert(
        "message".to_string(),
        json!("E-ID information updated successfully."),
    );
    for (name, _) in EDITABLE {
        if let Some(value) = fields.get(name) {
            result.insert(name.to_string(), json!(value));
        }
    }
    Ok(StepEffect::Completed(Value::Object(result)))
}
