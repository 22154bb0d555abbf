use super::*;
use crate::config::ChallengePolicy;
use crate::error::ErrorKind;
use crate::session::InMemorySessionStore;
use crate::testkit::{FakeDriver, FakeEvent};
use serde_json::json;
use std::time::Duration;

const CAPTCHA_INPUT: &str = "#captchaInput";

fn orchestrator(driver: &FakeDriver) -> Orchestrator {
    with_config(driver, OrchestratorConfig::default())
}

fn with_config(driver: &FakeDriver, config: OrchestratorConfig) -> Orchestrator {
    let store = Arc::new(InMemorySessionStore::new(
        Arc::new(driver.clone()),
        config.launch.clone(),
    ));
    Orchestrator::new(store, Arc::new(ChallengeStore::new()), config).unwrap()
}

fn request(task: TaskType, session: Option<&str>, fields: &[(&str, &str)]) -> TaskRequest {
    let mut request = TaskRequest::new(task);
    if let Some(id) = session {
        request = request.with_session(id);
    }
    fields
        .iter()
        .fold(request, |request, (name, value)| request.with_field(name, value))
}

fn search_driver() -> FakeDriver {
    FakeDriver::new()
        .with_captcha(CAPTCHA_INPUT, "X7K2P", &["#resultCard"], None)
        .with_text("#res_regNo", "DL01AB1234")
        .with_text("#res_ownerName", "Ravi Kumar")
}

async fn request_captcha(orchestrator: &Orchestrator) -> String {
    let response = orchestrator
        .execute(request(
            TaskType::Search,
            None,
            &[("regNo", "DL01AB1234"), ("state", "DL")],
        ))
        .await;
    assert!(response.success, "{}", response.message);
    response.session_id.unwrap()
}

#[tokio::test]
async fn search_runs_captcha_round_trip_and_cleans_up() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);

    let first = orchestrator
        .execute(request(
            TaskType::Search,
            None,
            &[("regNo", "DL01AB1234"), ("state", "DL")],
        ))
        .await;
    assert!(first.success);
    assert_eq!(first.step, "captcha_sent");
    assert_eq!(first.required_fields, Some(vec!["captcha".to_string()]));
    assert!(
        first
            .challenge_image
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
    assert_eq!(driver.open_pages(), 1);
    assert_eq!(driver.entered("#regNumber").as_deref(), Some("DL01AB1234"));

    let session_id = first.session_id.unwrap();
    let second = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("captcha", "X7K2P")],
        ))
        .await;
    assert!(second.success, "{}", second.message);
    assert_eq!(second.step, "completed");
    assert_eq!(second.message, "Vehicle details retrieved successfully");
    let data = second.data.unwrap();
    assert_eq!(data["regNo"], json!("DL01AB1234"));
    assert_eq!(data["ownerName"], json!("Ravi Kumar"));
    assert_eq!(data["model"], json!("N/A"));

    assert_eq!(orchestrator.sessions().len().await, 0);
    assert_eq!(driver.closes(), 1);
    assert!(orchestrator.challenges().is_empty());
}

#[tokio::test]
async fn unknown_session_is_reported_as_expired() {
    let driver = FakeDriver::new();
    let orchestrator = orchestrator(&driver);

    let response = orchestrator
        .execute(request(
            TaskType::Search,
            Some("c0ffee00-0000-4000-8000-000000000000"),
            &[("captcha", "X7K2P")],
        ))
        .await;

    assert!(!response.success);
    assert_eq!(response.step, "failed");
    assert_eq!(response.error_kind, Some(ErrorKind::SessionExpiredOrNotFound));
    assert!(response.message.contains("expired"));
    assert_eq!(response.status_code(), 404);
    assert_eq!(driver.opens(), 0);
}

#[tokio::test]
async fn wrong_captcha_fails_and_removes_session() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = request_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("captcha", "WRONG")],
        ))
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::PortalInteractionTimeout));
    assert!(response.message.contains("CAPTCHA"));
    assert!(
        response
            .diagnostic_image
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
    assert!(driver.events().contains(&FakeEvent::Screenshot(CaptureRegion::FullPage)));
    assert_eq!(orchestrator.sessions().len().await, 0);
    assert_eq!(driver.closes(), 1);

    let retry = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("captcha", "X7K2P")],
        ))
        .await;
    assert_eq!(retry.error_kind, Some(ErrorKind::SessionExpiredOrNotFound));
    assert_eq!(driver.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_session_expires_after_ttl() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let sweeper = orchestrator.spawn_sweeper();
    let session_id = request_captcha(&orchestrator).await;

    tokio::time::sleep(Duration::from_secs(16 * 60)).await;

    let response = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("captcha", "X7K2P")],
        ))
        .await;
    assert_eq!(response.error_kind, Some(ErrorKind::SessionExpiredOrNotFound));
    assert!(response.message.contains("expired"));
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.open_pages(), 0);

    sweeper.abort();
}

#[tokio::test]
async fn register_walks_otp_login_then_form() {
    let driver = FakeDriver::new().with_text(
        "#receiptContentOutput",
        "Application ID: APP7781\nVehicle Reg. No: DL01XY0001\n",
    );
    let orchestrator = orchestrator(&driver);

    let sent = orchestrator
        .execute(request(
            TaskType::Register,
            None,
            &[("email", "owner@example.com")],
        ))
        .await;
    assert_eq!(sent.step, "otp_sent");
    assert_eq!(sent.required_fields, Some(vec!["otp".to_string()]));
    assert!(sent.challenge_image.is_none());
    let session_id = sent.session_id.unwrap();

    let logged_in = orchestrator
        .execute(request(TaskType::Register, Some(&session_id), &[("otp", "123456")]))
        .await;
    assert_eq!(logged_in.step, "logged_in");
    assert_eq!(logged_in.required_fields.unwrap().len(), 8);

    let completed = orchestrator
        .execute(request(
            TaskType::Register,
            Some(&session_id),
            &[
                ("ownerName", "Ravi Kumar"),
                ("fatherName", "Suresh Kumar"),
                ("mobile", "9876543210"),
                ("address", "12 MG Road, Delhi"),
                ("vehicleClass", "LMV"),
                ("model", "Swift"),
                ("fuel", "Petrol"),
                ("rto", "DL01"),
            ],
        ))
        .await;
    assert!(completed.success, "{}", completed.message);
    assert_eq!(completed.message, "Vehicle registered successfully");
    let data = completed.data.unwrap();
    assert_eq!(data["applicationId"], json!("APP7781"));
    assert_eq!(data["registrationNumber"], json!("DL01XY0001"));

    assert_eq!(driver.entered("#newReg_email").as_deref(), Some("owner@example.com"));
    assert_eq!(driver.entered("#newReg_amount").as_deref(), Some("500000"));
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn eid_search_chains_open_and_search_in_one_call() {
    let driver = FakeDriver::new()
        .with_text("#res-eid", "EID-2024-0042")
        .with_text("#res-issued", "2024-01-17");
    let orchestrator = orchestrator(&driver);

    let response = orchestrator
        .execute(request(TaskType::EidSearch, None, &[("eId", "EID-2024-0042")]))
        .await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.step, "completed");
    let data = response.data.unwrap();
    assert_eq!(data["eId"], json!("EID-2024-0042"));
    assert_eq!(data["status"], json!("FOUND"));

    let events = driver.events();
    assert_eq!(
        events.first(),
        Some(&FakeEvent::Navigate(
            "http://localhost:5000/eid-mock-portal.html".to_string()
        ))
    );
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn eid_search_without_number_stops_at_open_view() {
    let driver = FakeDriver::new();
    let orchestrator = orchestrator(&driver);

    let response = orchestrator
        .execute(request(TaskType::EidSearch, None, &[]))
        .await;

    assert_eq!(response.step, "ready_for_search");
    assert_eq!(response.required_fields, Some(vec!["eId".to_string()]));
    assert_eq!(driver.open_pages(), 1);
}

const PASSPORT_FORM: [(&str, &str); 18] = [
    ("serviceType", "Fresh"),
    ("bookletType", "36"),
    ("givenName", "Asha"),
    ("surname", "Verma"),
    ("gender", "Female"),
    ("dob", "1994-06-02"),
    ("placeOfBirth", "Jaipur"),
    ("maritalStatus", "Single"),
    ("employment", "Private"),
    ("fatherGivenName", "Ramesh"),
    ("motherGivenName", "Sunita"),
    ("houseNo", "221"),
    ("city", "Jaipur"),
    ("pincode", "302001"),
    ("state", "Rajasthan"),
    ("mobile", "9123456780"),
    ("emergencyName", "Ramesh Verma"),
    ("emergencyMobile", "9988776655"),
];

async fn passport_at_captcha(orchestrator: &Orchestrator) -> String {
    let login = orchestrator
        .execute(request(
            TaskType::PassportFresh,
            None,
            &[
                ("loginName", "asha"),
                ("loginEmail", "asha@example.com"),
                ("loginPassword", "secret"),
            ],
        ))
        .await;
    assert_eq!(login.step, "logged_in", "{}", login.message);
    let session_id = login.session_id.unwrap();

    let form = orchestrator
        .execute(request(TaskType::PassportFresh, Some(&session_id), &PASSPORT_FORM))
        .await;
    assert_eq!(form.step, "captcha_sent", "{}", form.message);
    assert!(form.challenge_image.is_some());
    session_id
}

fn passport_driver() -> FakeDriver {
    FakeDriver::new()
        .with_captcha(CAPTCHA_INPUT, "Q9W3E", &["#successModal.show"], Some("captchaCode"))
        .with_text("#refNumber", "PSK-556677")
}

#[tokio::test]
async fn passport_injection_only_when_enabled() {
    let driver = passport_driver();
    let config = OrchestratorConfig {
        challenge: ChallengePolicy {
            allow_trusted_injection: true,
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = with_config(&driver, config);
    let session_id = passport_at_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(
            TaskType::PassportFresh,
            Some(&session_id),
            &[("captcha", "misread")],
        ))
        .await;

    assert!(response.success, "{}", response.message);
    let data = response.data.unwrap();
    assert_eq!(data["applicationId"], json!("PSK-556677"));
    assert_eq!(data["applicantName"], json!("Asha"));
    assert!(
        driver
            .evaluations()
            .iter()
            .any(|(_, arg)| arg == &json!(["captchaCode", "misread"]))
    );
    assert_eq!(driver.entered("#email").as_deref(), Some("asha@example.com"));
}

#[tokio::test]
async fn passport_visual_solve_by_default() {
    let driver = passport_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = passport_at_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(
            TaskType::PassportFresh,
            Some(&session_id),
            &[("captcha", "misread")],
        ))
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::PortalInteractionTimeout));
    assert!(
        !driver
            .evaluations()
            .iter()
            .any(|(_, arg)| arg == &json!(["captchaCode", "misread"]))
    );
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn concurrent_call_on_busy_session_is_rejected() {
    let driver = FakeDriver::new();
    let hold = driver.hold_at("#resultCard");
    let orchestrator = Arc::new(orchestrator(&driver));
    let session_id = request_captcha(&orchestrator).await;

    let running = {
        let orchestrator = orchestrator.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            orchestrator
                .execute(request(
                    TaskType::Search,
                    Some(&session_id),
                    &[("captcha", "X7K2P")],
                ))
                .await
        })
    };
    hold.reached().await;

    let rejected = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("captcha", "X7K2P")],
        ))
        .await;
    assert_eq!(rejected.error_kind, Some(ErrorKind::SessionBusy));
    assert_eq!(rejected.status_code(), 409);
    assert_eq!(driver.closes(), 0);

    hold.release();
    let finished = running.await.unwrap();
    assert!(finished.success, "{}", finished.message);
    assert_eq!(finished.step, "completed");
    assert_eq!(driver.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_spares_session_while_a_call_drives_it() {
    let driver = FakeDriver::new();
    let hold = driver.hold_at("#logoutBtn");
    let orchestrator = Arc::new(with_config(
        &driver,
        OrchestratorConfig {
            session_ttl: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(1),
            ..OrchestratorConfig::default()
        },
    ));
    let sweeper = orchestrator.spawn_sweeper();

    let sent = orchestrator
        .execute(request(
            TaskType::Register,
            None,
            &[("email", "owner@example.com")],
        ))
        .await;
    assert_eq!(sent.step, "otp_sent");
    let session_id = sent.session_id.unwrap();

    let running = {
        let orchestrator = orchestrator.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            orchestrator
                .execute(request(
                    TaskType::Register,
                    Some(&session_id),
                    &[("otp", "123456")],
                ))
                .await
        })
    };
    hold.reached().await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(orchestrator.sessions().len().await, 1);
    assert_eq!(driver.closes(), 0);

    hold.release();
    let logged_in = running.await.unwrap();
    assert!(logged_in.success, "{}", logged_in.message);
    assert_eq!(logged_in.step, "logged_in");
    assert_eq!(logged_in.session_id.as_deref(), Some(session_id.as_str()));
    assert!(orchestrator.sessions().get(&session_id).await.is_ok());
    assert_eq!(driver.open_pages(), 1);

    sweeper.abort();
}

fn vehicle_lookup_driver() -> FakeDriver {
    FakeDriver::new()
        .with_captcha(CAPTCHA_INPUT, "K9M3T", &["#resultCard"], None)
        .with_text(
            "#receiptContentOutput",
            "Application ID: TRF1001\nVehicle Reg. No: DL01AB1234\nNew Owner: PRIYA SHARMA\n",
        )
}

/// Logs in and requests the search CAPTCHA; returns the session id.
async fn transfer_at_search_captcha(orchestrator: &Orchestrator) -> String {
    let sent = orchestrator
        .execute(request(
            TaskType::Transfer,
            None,
            &[("email", "seller@example.com")],
        ))
        .await;
    assert_eq!(sent.step, "otp_sent", "{}", sent.message);
    let session_id = sent.session_id.unwrap();

    let logged_in = orchestrator
        .execute(request(TaskType::Transfer, Some(&session_id), &[("otp", "654321")]))
        .await;
    assert_eq!(logged_in.step, "logged_in", "{}", logged_in.message);
    assert_eq!(
        logged_in.required_fields,
        Some(vec!["regNo".to_string(), "state".to_string()])
    );

    let captcha = orchestrator
        .execute(request(
            TaskType::Transfer,
            Some(&session_id),
            &[("regNo", "DL01AB1234"), ("state", "DL")],
        ))
        .await;
    assert_eq!(captcha.step, "captcha_sent", "{}", captcha.message);
    assert!(captcha.challenge_image.is_some());
    assert_eq!(
        captcha.required_fields,
        Some(vec!["searchCaptcha".to_string()])
    );
    session_id
}

#[tokio::test]
async fn transfer_walks_login_search_and_new_owner() {
    let driver = vehicle_lookup_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = transfer_at_search_captcha(&orchestrator).await;

    let found = orchestrator
        .execute(request(
            TaskType::Transfer,
            Some(&session_id),
            &[("searchCaptcha", "K9M3T")],
        ))
        .await;
    assert_eq!(found.step, "vehicle_found", "{}", found.message);
    assert_eq!(found.required_fields.unwrap().len(), 5);

    let completed = orchestrator
        .execute(request(
            TaskType::Transfer,
            Some(&session_id),
            &[
                ("newOwnerName", "Priya Sharma"),
                ("newOwnerFather", "Anil Sharma"),
                ("newOwnerMobile", "9811122233"),
                ("newOwnerEmail", "priya@example.com"),
                ("newOwnerAddress", "7 Park Street, Kolkata"),
            ],
        ))
        .await;
    assert!(completed.success, "{}", completed.message);
    assert_eq!(completed.step, "completed");
    assert_eq!(completed.message, "Ownership transferred successfully");
    let data = completed.data.unwrap();
    assert_eq!(data["applicationId"], json!("TRF1001"));
    assert_eq!(data["vehicleRegNo"], json!("DL01AB1234"));
    assert_eq!(data["newOwner"], json!("PRIYA SHARMA"));
    assert_eq!(driver.entered("#trans_amount").as_deref(), Some("500000"));

    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert_eq!(orchestrator.sessions().len().await, 0);
    assert!(orchestrator.challenges().is_empty());
}

#[tokio::test]
async fn wrong_search_captcha_tears_transfer_down() {
    let driver = vehicle_lookup_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = transfer_at_search_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(
            TaskType::Transfer,
            Some(&session_id),
            &[("searchCaptcha", "WRONG")],
        ))
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind, Some(ErrorKind::PortalInteractionTimeout));
    assert!(response.diagnostic_image.is_some());
    assert_eq!(driver.closes(), 1);
    assert_eq!(orchestrator.sessions().len().await, 0);

    let retry = orchestrator
        .execute(request(
            TaskType::Transfer,
            Some(&session_id),
            &[("searchCaptcha", "K9M3T")],
        ))
        .await;
    assert_eq!(retry.error_kind, Some(ErrorKind::SessionExpiredOrNotFound));
}

#[tokio::test]
async fn eid_update_chains_to_captcha_from_first_call() {
    let driver = FakeDriver::new().with_captcha(
        CAPTCHA_INPUT,
        "AB12C",
        &["#updateSuccessBox:not(.hidden), #updateErrorBox:not(.hidden)"],
        None,
    );
    let orchestrator = orchestrator(&driver);

    let edited = orchestrator
        .execute(request(
            TaskType::EidUpdate,
            None,
            &[("eId", "EID-2024-0042"), ("phone", "9000022222")],
        ))
        .await;
    assert_eq!(edited.step, "captcha_sent", "{}", edited.message);
    assert!(edited.challenge_image.is_some());
    assert_eq!(edited.required_fields, Some(vec!["captcha".to_string()]));
    assert_eq!(driver.entered("#eid-number-update").as_deref(), Some("EID-2024-0042"));
    assert_eq!(driver.entered("#update-phone").as_deref(), Some("9000022222"));
    assert!(driver.entered("#update-address").is_none());
    let session_id = edited.session_id.unwrap();

    let completed = orchestrator
        .execute(request(TaskType::EidUpdate, Some(&session_id), &[("captcha", "AB12C")]))
        .await;
    assert!(completed.success, "{}", completed.message);
    assert_eq!(completed.message, "E-ID updated successfully");
    let data = completed.data.unwrap();
    assert_eq!(data["status"], json!("UPDATED"));
    assert_eq!(data["phone"], json!("9000022222"));
    assert!(data.get("name").is_none());

    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert_eq!(orchestrator.sessions().len().await, 0);
}

#[tokio::test]
async fn browser_unavailable_registers_no_session() {
    let driver = FakeDriver::new().failing_open();
    let orchestrator = orchestrator(&driver);

    let response = orchestrator
        .execute(request(
            TaskType::Search,
            None,
            &[("regNo", "DL01AB1234"), ("state", "DL")],
        ))
        .await;

    assert_eq!(response.error_kind, Some(ErrorKind::ResourceUnavailable));
    assert_eq!(response.status_code(), 503);
    assert_eq!(orchestrator.sessions().len().await, 0);
}

#[tokio::test]
async fn invalid_first_call_opens_no_browser() {
    let driver = FakeDriver::new();
    let orchestrator = orchestrator(&driver);

    let response = orchestrator
        .execute(request(TaskType::Search, None, &[("regNo", "DL01AB1234")]))
        .await;

    assert_eq!(response.error_kind, Some(ErrorKind::InputInvalid));
    assert!(response.message.contains("state"));
    assert_eq!(driver.opens(), 0);
}

#[tokio::test]
async fn repeating_a_completed_step_tears_session_down() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = request_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(
            request(TaskType::Search, Some(&session_id), &[])
                .with_step("request_captcha"),
        )
        .await;

    assert_eq!(response.error_kind, Some(ErrorKind::InputInvalid));
    assert!(response.message.contains("already been completed"));
    assert_eq!(orchestrator.sessions().len().await, 0);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn accumulated_field_cannot_be_changed() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = request_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(
            TaskType::Search,
            Some(&session_id),
            &[("regNo", "MH12ZZ9999"), ("captcha", "X7K2P")],
        ))
        .await;

    assert_eq!(response.error_kind, Some(ErrorKind::InputInvalid));
    assert!(response.message.contains("regNo"));
    assert!(driver.entered(CAPTCHA_INPUT).is_none());
}

#[tokio::test]
async fn session_of_another_task_is_rejected() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = request_captcha(&orchestrator).await;

    let response = orchestrator
        .execute(request(TaskType::EidSearch, Some(&session_id), &[("eId", "EID-1")]))
        .await;

    assert_eq!(response.error_kind, Some(ErrorKind::InputInvalid));
    assert!(response.message.contains("belongs to task 'search'"));
}

#[tokio::test]
async fn eid_portal_error_is_passed_through() {
    let driver = FakeDriver::new()
        .with_present("#registerErrorBox:not(.hidden)")
        .with_text("#registerErrorMessage", "Phone number already registered");
    let orchestrator = orchestrator(&driver);

    let opened = orchestrator
        .execute(request(TaskType::EidRegister, None, &[]))
        .await;
    assert_eq!(opened.step, "ready_for_form");
    let session_id = opened.session_id.unwrap();

    let form = orchestrator
        .execute(request(
            TaskType::EidRegister,
            Some(&session_id),
            &[
                ("name", "Kavya Nair"),
                ("dob", "1990-03-14"),
                ("gender", "Female"),
                ("phone", "9000011111"),
                ("address", "4 Lake View, Kochi"),
            ],
        ))
        .await;
    assert_eq!(form.step, "captcha_sent");
    assert!(form.challenge_image.is_some());

    let submitted = orchestrator
        .execute(request(TaskType::EidRegister, Some(&session_id), &[("captcha", "AB12C")]))
        .await;
    assert_eq!(submitted.error_kind, Some(ErrorKind::PortalRejected));
    assert_eq!(submitted.message, "Phone number already registered");
    assert_eq!(submitted.status_code(), 422);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn eid_flagged_captcha_reads_as_incorrect() {
    let driver = FakeDriver::new()
        .with_captcha(
            CAPTCHA_INPUT,
            "AB12C",
            &["#updateSuccessBox:not(.hidden), #updateErrorBox:not(.hidden)"],
            None,
        )
        .with_present("#captchaError:not(.hidden)");
    let orchestrator = orchestrator(&driver);

    let found = orchestrator
        .execute(request(TaskType::EidUpdate, None, &[("eId", "EID-2024-0042")]))
        .await;
    assert_eq!(found.step, "user_found", "{}", found.message);
    let session_id = found.session_id.unwrap();

    let edited = orchestrator
        .execute(request(TaskType::EidUpdate, Some(&session_id), &[("phone", "9000022222")]))
        .await;
    assert_eq!(edited.step, "captcha_sent");
    assert_eq!(driver.entered("#update-phone").as_deref(), Some("9000022222"));
    assert!(driver.entered("#update-name").is_none());

    let submitted = orchestrator
        .execute(request(TaskType::EidUpdate, Some(&session_id), &[("captcha", "ZZZZZ")]))
        .await;
    assert_eq!(submitted.error_kind, Some(ErrorKind::PortalRejected));
    assert_eq!(submitted.message, "Incorrect CAPTCHA. Please try again.");
}

#[tokio::test]
async fn abandon_closes_the_page_once() {
    let driver = search_driver();
    let orchestrator = orchestrator(&driver);
    let session_id = request_captcha(&orchestrator).await;

    assert!(orchestrator.abandon(&session_id).await);
    assert!(!orchestrator.abandon(&session_id).await);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn step_position_only_moves_forward() {
    let driver = FakeDriver::new();
    let orchestrator = orchestrator(&driver);

    let sent = orchestrator
        .execute(request(TaskType::Transfer, None, &[("email", "a@example.com")]))
        .await;
    let session_id = sent.session_id.unwrap();
    let session = orchestrator.sessions().get(&session_id).await.unwrap();
    assert_eq!(session.claim().await.current_tag(), Some("send_otp"));

    orchestrator
        .execute(request(TaskType::Transfer, Some(&session_id), &[("otp", "111111")]))
        .await;
    let state = session.claim().await;
    assert_eq!(state.current_step(), Some(1));
    assert_eq!(state.current_tag(), Some("verify_otp"));
}

#[test]
fn request_parses_reserved_keys_and_fields() {
    let request = TaskRequest::from_json(
        None,
        json!({
            "taskType": "search",
            "sessionId": "abc",
            "step": "submit_captcha",
            "captcha": "X7K2P"
        }),
    )
    .unwrap();

    assert_eq!(request.task, TaskType::Search);
    assert_eq!(request.session_id.as_deref(), Some("abc"));
    assert_eq!(request.step.as_deref(), Some("submit_captcha"));
    assert_eq!(request.fields.len(), 1);
    assert_eq!(request.fields.get("captcha"), Some("X7K2P"));
}

#[test]
fn route_task_conflicting_with_body_is_rejected() {
    let err = TaskRequest::from_json(
        Some(TaskType::EidSearch),
        json!({ "taskType": "search", "eId": "EID-1" }),
    )
    .unwrap_err();
    assert!(matches!(err, OrchestratorError::InputInvalid(_)));

    let err = TaskRequest::from_json(None, json!({ "regNo": "DL01" })).unwrap_err();
    assert!(err.to_string().contains("taskType"));
}
