//! Passport Seva, fresh application.

use super::{StepContext, StepEffect};
use crate::config::Tier;
use crate::error::Result;
use serde_json::json;
use tracing::debug;

const NEXT: &str = "#nextBtn";

pub(super) async fn login(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    let url = ctx.urls.passport.clone();
    ctx.page.goto(&url).await?;
    ctx.page.fill("#loginName", fields.require("loginName")?).await?;
    ctx.page.fill("#loginEmail", fields.require("loginEmail")?).await?;
    ctx.page
        .fill("#loginPassword", fields.require("loginPassword")?)
        .await?;
    ctx.page.click("#loginForm button[type=\"submit\"]").await?;
    ctx.page.wait_for("#mainApp", Tier::Standard).await?;
    Ok(StepEffect::advanced())
}

/// Moves the wizard on and waits for `stage` to become active.
async fn next_stage(ctx: &mut StepContext<'_>, stage: u8) -> Result<()> {
    ctx.page.click(NEXT).await?;
    ctx.page
        .wait_for(&format!("#fresh_stage{}.active", stage), Tier::Standard)
        .await
}

/// Walks all five form stages and captures the CAPTCHA on the review page.
pub(super) async fn fill_application(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;

    ctx.page.click("a[onclick*=\"services\"]").await?;
    ctx.page.wait_for("#servicesPage.active", Tier::Quick).await?;
    ctx.page.click(".service-card:has-text(\"Fresh Passport\")").await?;
    ctx.page.wait_for("#applicationPage.active", Tier::Quick).await?;

    ctx.page
        .check(&format!(
            "input[name=\"applicationType\"][value=\"{}\"]",
            fields.require("serviceType")?
        ))
        .await?;
    ctx.page
        .check(&format!(
            "input[name=\"bookletType\"][value=\"{}\"]",
            fields.require("bookletType")?
        ))
        .await?;
    next_stage(ctx, 2).await?;

    ctx.page.fill("#givenName", fields.require("givenName")?).await?;
    ctx.page.fill("#surname", fields.require("surname")?).await?;
    ctx.page.select("#gender", fields.require("gender")?).await?;
    ctx.page.fill("#dob", fields.require("dob")?).await?;
    ctx.page.fill("#placeOfBirth", fields.require("placeOfBirth")?).await?;
    ctx.page
        .select("#maritalStatus", fields.require("maritalStatus")?)
        .await?;
    ctx.page.select("#citizenship", "Birth").await?;
    ctx.page.select("#employment", fields.require("employment")?).await?;
    ctx.page.select("#education", "Graduate And Above").await?;
    ctx.page.check("input[name=\"nonECR\"][value=\"yes\"]").await?;
    next_stage(ctx, 3).await?;

    ctx.page
        .fill("#fatherGivenName", fields.require("fatherGivenName")?)
        .await?;
    ctx.page
        .fill("#motherGivenName", fields.require("motherGivenName")?)
        .await?;
    next_stage(ctx, 4).await?;

    let house_no = fields.require("houseNo")?;
    ctx.page.fill("#houseNo", house_no).await?;
    ctx.page.fill("#city", fields.require("city")?).await?;
    ctx.page.fill("#pincode", fields.require("pincode")?).await?;
    ctx.page.select("#state", fields.require("state")?).await?;
    ctx.page.fill("#mobile", fields.require("mobile")?).await?;
    ctx.page.fill("#email", fields.require("loginEmail")?).await?;
    next_stage(ctx, 5).await?;

    ctx.page
        .fill("#emergencyName", fields.require("emergencyName")?)
        .await?;
    ctx.page
        .fill("#emergencyMobile", fields.require("emergencyMobile")?)
        .await?;
    ctx.page.fill("#emergencyAddress", house_no).await?;
    next_stage(ctx, 6).await?;
    debug!("Passport form stages filled");

    ctx.page.click("button:has-text(\"Confirm\")").await?;
    ctx.page.wait_for("#verificationSection", Tier::Standard).await?;
    let image = ctx.page.capture("#captchaCode").await?;
    Ok(StepEffect::challenge(image))
}

pub(super) async fn submit(ctx: &mut StepContext<'_>) -> Result<StepEffect> {
    let fields = ctx.fields;
    ctx.solve_challenge("#captchaInput", "captcha", None).await?;
    ctx.page.click("button:has-text(\"Verify & Submit\")").await?;
    ctx.page.wait_for("#successModal.show", Tier::Slow).await?;
    let reference = ctx.page.text_or("#refNumber", "N/A").await?;

    Ok(StepEffect::Completed(json!({
        "applicationId": reference,
        "applicantName": fields.require("givenName")?,
        "status": "Submitted",
        "processingTime": "30 days",
    })))
}
