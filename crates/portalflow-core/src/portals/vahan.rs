//! VAHAN vehicle registry.

use super::{StepContext, StepEffect, today};
use crate::config::Tier;
use crate::error::Result;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::debug;

const RESULT_CARD: &str = "#resultCard";
const RECEIPT_MODAL: &str = "#receiptModal.show";
const RECEIPT_TEXT: &str = "#receiptContentOutput";
const DEFAULT_AMOUNT: &str = "500000";

const RESULT_FIELDS: [(&str, &str); 7] = [
    ("regNo", "#res_regNo"),
    ("regDate", "#res_regDate"),
    ("rto", "#res_rto"),
    ("model", "#res_model"),
    ("ownerName", "#res_ownerName"),
    ("mobile", "#res_mobile"),
    ("insStatus", "#res_insStatus"),
];

static REG_NO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Vehicle Reg\. No: ([A-Z0-9]+)").expect("invalid reg no regex"));
static APPLICATION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Application ID: ([A-Z0-9]+)").expect("invalid application id regex")
});
static NEW_OWNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"New Owner: ([A-Z\s]+)").expect("invalid new owner regex"));

#[derive(Debug, Default, PartialEq, Eq)]
struct Receipt {
    application_id: Option<String>,
    registration_number: Option<String>,
    new_owner: Option<String>,
}

fn parse_receipt(text: &str) -> Receipt {
    let capture = |regex: &Regex| {
        regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    };
    Receipt {
        application_id: capture(&APPLICATION_ID),
        registration_number: capture(&REG_NO),
        new_owner: capture(&NEW_OWNER),
    }
}

/// Fills the search form on the page already showing the portal and
/// captures the CAPTCHA.
async fn request_captcha(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.fill("#regNumber", fields.require("regNo")?).await?;
    ctx.page.select("#stateSelect", fields.require("state")?).await?;
    let image = ctx.page.capture("#captchaDisplay").await?;
    Ok(StepEffect::challenge(image))
}

/// Submits the CAPTCHA answer from `field` and waits for the result card.
async fn submit_search(ctx: &mut StepContext<'_>, field: &str) -> Result<()> {
    ctx.solve_challenge("#captchaInput", field, None).await?;
    ctx.page.click("button[type=\"submit\"]").await?;
    ctx.page.wait_for(RESULT_CARD, Tier::Standard).await
}

pub(super) async fn open_search(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let url = ctx.urls.vahan.clone();
    ctx.page.goto(&url).await?;
    request_captcha(ctx).await
}

pub(super) async fn search_result(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    submit_search(ctx, "captcha").await?;

    let mut details = Map::new();
    for (key, selector) in RESULT_FIELDS {
        let value = ctx.page.text_or(selector, "N/A").await?;
        details.insert(key.to_string(), Value::String(value));
    }
    debug!(reg_no = ?details.get("regNo"), "Vehicle details extracted");
    Ok(StepEffect::Completed(Value::Object(details)))
}

pub(super) async fn send_otp(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    let url = ctx.urls.vahan.clone();
    ctx.page.goto(&url).await?;
    ctx.page.click("#loginBtn").await?;
    ctx.page.wait_for("#loginModal.show", Tier::Quick).await?;
    ctx.page.fill("#loginEmail", fields.require("email")?).await?;
    ctx.page.click("#sendOtpBtn").await?;
    ctx.page.wait_for("#otpForm", Tier::Standard).await?;
    Ok(StepEffect::advanced())
}

pub(super) async fn verify_otp(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.fill("#loginOTP", fields.require("otp")?).await?;
    ctx.page.click("#verifyOtpBtn").await?;
    ctx.page.wait_for("#logoutBtn", Tier::Standard).await?;
    Ok(StepEffect::advanced())
}

pub(super) async fn locate_vehicle(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    request_captcha(ctx).await
}

pub(super) async fn confirm_vehicle(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    submit_search(ctx, "searchCaptcha").await?;
    ctx.page
        .evaluate(
            "() => document.getElementById('resultCard')?.scrollIntoView({ behavior: 'smooth' })",
            Value::Null,
        )
        .await?;
    ctx.page.pause(1000).await?;
    Ok(StepEffect::advanced())
}

async fn read_receipt(ctx: &mut StepContext<'_>) -> Result<Receipt> {
    ctx.page.wait_for(RECEIPT_MODAL, Tier::Slow).await?;
    let text = ctx.page.text_or(RECEIPT_TEXT, "").await?;
    Ok(parse_receipt(&text))
}

pub(super) async fn register_vehicle(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.page.click("a[onclick*=\"services\"]").await?;
    ctx.page.pause(1000).await?;
    ctx.page
        .click(".service-card:has-text(\"New Vehicle Registration\")")
        .await?;
    ctx.page.wait_for("#newRegModal.show", Tier::Quick).await?;

    ctx.page.fill("#newReg_ownerName", fields.require("ownerName")?).await?;
    ctx.page.fill("#newReg_fatherName", fields.require("fatherName")?).await?;
    ctx.page.fill("#newReg_mobile", fields.require("mobile")?).await?;
    ctx.page.fill("#newReg_email", fields.require("email")?).await?;
    ctx.page.fill("#newReg_address", fields.require("address")?).await?;
    ctx.page.fill("#newReg_class", fields.require("vehicleClass")?).await?;
    ctx.page.fill("#newReg_model", fields.require("model")?).await?;
    ctx.page.select("#newReg_fuel", fields.require("fuel")?).await?;
    if let Some(color) = fields.get("color") {
        ctx.page.fill("#newReg_color", color).await?;
    }
    ctx.page
        .fill("#newReg_amount", fields.get("price").unwrap_or(DEFAULT_AMOUNT))
        .await?;
    ctx.page.select("#newReg_rto", fields.require("rto")?).await?;
    ctx.page.check_all("#newRegModal input[type=\"checkbox\"]").await?;
    ctx.page.click("#newRegForm button[type=\"submit\"]").await?;

    let receipt = read_receipt(ctx).await?;
    Ok(StepEffect::Completed(json!({
        "applicationId": receipt.application_id.unwrap_or_else(|| "N/A".to_string()),
        "registrationNumber": receipt.registration_number.unwrap_or_else(|| "N/A".to_string()),
        "status": "COMPLETED",
    })))
}

pub(super) async fn transfer_ownership(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    let new_owner_name = fields.require("newOwnerName")?;

    ctx.page.click("button[onclick=\"showTransferModal()\"]").await?;
    ctx.page.wait_for("#transferModal.show", Tier::Quick).await?;

    ctx.page.fill("#trans_newOwner", new_owner_name).await?;
    ctx.page.fill("#trans_newFather", fields.require("newOwnerFather")?).await?;
    ctx.page.fill("#trans_newMobile", fields.require("newOwnerMobile")?).await?;
    ctx.page.fill("#trans_newEmail", fields.require("newOwnerEmail")?).await?;
    ctx.page.fill("#trans_newAddress", fields.require("newOwnerAddress")?).await?;
    ctx.page
        .fill("#trans_amount", fields.get("saleAmount").unwrap_or(DEFAULT_AMOUNT))
        .await?;
    ctx.page.fill("#trans_date", &today()).await?;
    ctx.page.check_all("#transferModal input[type=\"checkbox\"]").await?;
    ctx.page.click("#transferForm button[type=\"submit\"]").await?;

    let receipt = read_receipt(ctx).await?;
    Ok(StepEffect::Completed(json!({
        "applicationId": receipt.application_id.unwrap_or_else(|| "N/A".to_string()),
        "vehicleRegNo": fields.require("regNo")?,
        "newOwner": receipt.new_owner.unwrap_or_else(|| new_owner_name.to_string()),
        "status": "COMPLETED",
    })))
}

pub(super) async fn update_contacts(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    let new_address = fields.require("newAddress")?;
    let new_mobile = fields.require("newMobile")?;
    // The portal keeps contact email in sync with the login email.
    let email = fields.require("email")?;

    ctx.page
        .click("button[onclick=\"showUpdateDetailsModal()\"]")
        .await?;
    ctx.page.wait_for("#updateDetailsModal.show", Tier::Quick).await?;
    ctx.page.fill("#addr_newAddress", new_address).await?;
    ctx.page.fill("#addr_newMobile", new_mobile).await?;
    ctx.page.fill("#addr_newEmail", email).await?;
    ctx.page
        .check_all("#updateDetailsModal input[type=\"checkbox\"]")
        .await?;
    ctx.page.click("#updateDetailsForm button[type=\"submit\"]").await?;

    let receipt = read_receipt(ctx).await?;
    Ok(StepEffect::Completed(json!({
        "applicationId": receipt.application_id.unwrap_or_else(|| "N/A".to_string()),
        "vehicleRegNo": fields.require("regNo")?,
        "newAddress": new_address,
        "newMobile": new_mobile,
        "newEmail": email,
        "status": "COMPLETED",
    })))
}
