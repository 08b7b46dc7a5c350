//! End-to-end tests for the employer onboarding wizard.

mod common;

use common::TestApp;
use identity_service::models::{Credential, Role};
use identity_service::services::CredentialStore;
use serde_json::json;

const MOBILE: &str = "+911234567890";
const EMAIL: &str = "founder@acme.example";

async fn start(app: &TestApp) -> String {
    let (status, body) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["step"], 1);
    body["session_token"].as_str().unwrap().to_string()
}

async fn advance_to_details(app: &TestApp) -> String {
    let token = start(app).await;

    let mobile_code = app.notifier.last_code_for(MOBILE).unwrap();
    let (status, body) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": mobile_code }),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["step"], 2);

    let (status, body) = app
        .post_json(
            "/onboarding/email/send",
            json!({ "session_token": token, "email": EMAIL }),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["step"], 3);

    let email_code = app.notifier.last_code_for(EMAIL).unwrap();
    let (status, body) = app
        .post_json(
            "/onboarding/email/verify",
            json!({ "session_token": token, "code": email_code }),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["step"], 4);

    token
}

fn details_body(token: &str) -> serde_json::Value {
    json!({
        "session_token": token,
        "first_name": "Asha",
        "last_name": "Verma",
        "password": "a-strong-password",
        "confirm_password": "a-strong-password",
        "location": "Bengaluru",
        "company_name": "Acme Hiring Ltd"
    })
}

#[tokio::test]
async fn full_wizard_flow_creates_credential_and_tokens() {
    let app = TestApp::spawn().await;
    let token = advance_to_details(&app).await;

    let (status, body) = app.post_json("/onboarding/details", details_body(&token)).await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["step"], 5);

    // Optional document upload does not advance the step.
    let (status, body) = app
        .post_json(
            "/onboarding/documents",
            json!({
                "session_token": token,
                "file_name": "registration-certificate.pdf",
                "content_type": "application/pdf"
            }),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert!(body["upload_url"].as_str().unwrap().contains("upload"));

    let (status, body) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 201, "unexpected body: {}", body);
    assert_eq!(body["user"]["role"], "employer");
    assert_eq!(body["user"]["is_email_verified"], true);
    assert_eq!(body["user"]["is_mobile_verified"], true);
    assert!(!body["tokens"]["access_token"].as_str().unwrap().is_empty());
    assert!(!body["tokens"]["refresh_token"].as_str().unwrap().is_empty());

    // The credential and its company record were materialized.
    let user = app.store.find_by_email(EMAIL).await.unwrap().unwrap();
    assert!(user.external_id.is_some());
    let companies = app.store.companies_for(user.user_id);
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].company_name, "Acme Hiring Ltd");

    // The wizard state is destroyed on completion.
    let (status, _) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 410);

    // The issued tokens are immediately usable.
    let access = body["tokens"]["access_token"].as_str().unwrap();
    let (status, body) = app
        .post_json("/auth/introspect", json!({ "token": access }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn wizard_follows_the_documented_example_scenario() {
    let app = TestApp::spawn_with(|c| c.otp.dev_fixed_code = Some("123456".to_string())).await;

    let (status, body) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 200);
    let token = body["session_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": "123456" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["step"], 2);

    let (status, body) = app
        .post_json(
            "/onboarding/email/send",
            json!({ "session_token": token, "email": "a@b.com" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["step"], 3);

    // Wrong code fails without consuming anything.
    let (status, _) = app
        .post_json(
            "/onboarding/email/verify",
            json!({ "session_token": token, "code": "000000" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = app
        .post_json(
            "/onboarding/email/verify",
            json!({ "session_token": token, "code": "123456" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["step"], 4);
}

#[tokio::test]
async fn out_of_order_steps_fail_with_precondition() {
    let app = TestApp::spawn().await;
    let token = start(&app).await;

    // Email code before the mobile is verified.
    let (status, _) = app
        .post_json(
            "/onboarding/email/send",
            json!({ "session_token": token, "email": EMAIL }),
        )
        .await;
    assert_eq!(status, 412);

    // Details before either verification.
    let (status, _) = app.post_json("/onboarding/details", details_body(&token)).await;
    assert_eq!(status, 412);

    // Document upload before details.
    let (status, _) = app
        .post_json(
            "/onboarding/documents",
            json!({
                "session_token": token,
                "file_name": "cert.pdf",
                "content_type": "application/pdf"
            }),
        )
        .await;
    assert_eq!(status, 412);

    // Completion before details.
    let (status, _) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 412);
}

#[tokio::test]
async fn mobile_verify_is_idempotent_after_success() {
    let app = TestApp::spawn().await;
    let token = start(&app).await;

    let code = app.notifier.last_code_for(MOBILE).unwrap();
    let (status, _) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": code }),
        )
        .await;
    assert_eq!(status, 200);

    // A repeat submission succeeds without re-checking the code.
    let (status, body) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": "000000" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["step"], 2);
}

#[tokio::test]
async fn registered_mobile_and_email_conflict() {
    let app = TestApp::spawn().await;
    app.seed_user_with("existing@acme.example", "password-123", |c| {
        c.mobile = Some(MOBILE.to_string());
    })
    .await;

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 409);

    // A different mobile gets through, but the taken email conflicts.
    let (status, body) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": "+911234567891" }))
        .await;
    assert_eq!(status, 200);
    let token = body["session_token"].as_str().unwrap().to_string();
    let code = app.notifier.last_code_for("+911234567891").unwrap();
    let (status, _) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": code }),
        )
        .await;
    assert_eq!(status, 200);

    let (status, _) = app
        .post_json(
            "/onboarding/email/send",
            json!({ "session_token": token, "email": "existing@acme.example" }),
        )
        .await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn expired_session_reports_gone_on_every_step() {
    let app = TestApp::spawn_with(|c| c.onboarding.session_ttl_seconds = 1).await;
    let token = start(&app).await;

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;

    let (status, _) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": token, "code": "123456" }),
        )
        .await;
    assert_eq!(status, 410);

    let (status, _) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 410);

    // An unknown token behaves exactly like an expired one.
    let (status, _) = app
        .post_json(
            "/onboarding/mobile/verify",
            json!({ "session_token": "deadbeef", "code": "123456" }),
        )
        .await;
    assert_eq!(status, 410);
}

#[tokio::test]
async fn password_confirmation_mismatch_is_rejected() {
    let app = TestApp::spawn().await;
    let token = advance_to_details(&app).await;

    let mut body = details_body(&token);
    body["confirm_password"] = json!("something-else-entirely");
    let (status, _) = app.post_json("/onboarding/details", body).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn existing_upstream_identity_is_fetched_not_failed() {
    let app = TestApp::spawn().await;
    app.provider.seed(EMAIL, "ext-preexisting");

    let token = advance_to_details(&app).await;
    let (status, _) = app.post_json("/onboarding/details", details_body(&token)).await;
    assert_eq!(status, 200);

    let (status, body) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 201, "unexpected body: {}", body);

    let user = app.store.find_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(user.external_id.as_deref(), Some("ext-preexisting"));
}

#[tokio::test]
async fn duplicate_finalization_race_surfaces_conflict() {
    let app = TestApp::spawn().await;
    let token = advance_to_details(&app).await;
    let (status, _) = app.post_json("/onboarding/details", details_body(&token)).await;
    assert_eq!(status, 200);

    // Another registration claimed the email between details and completion.
    let rival = Credential::new(EMAIL.to_string(), None, None, Role::Employer);
    app.store.insert(&rival).await.unwrap();

    let (status, _) = app
        .post_json("/onboarding/complete", json!({ "session_token": token }))
        .await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn malformed_mobile_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": "12345678" }))
        .await;
    assert_eq!(status, 400);

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": "+12ab5678" }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn code_resend_interval_is_enforced_across_sessions() {
    let app = TestApp::spawn_with(|c| c.otp.resend_interval_seconds = 60).await;

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 200);

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 429);
}

#[tokio::test]
async fn code_volume_is_capped_per_identity() {
    let app = TestApp::spawn_with(|c| c.otp.rate_limit_max = 2).await;

    for _ in 0..2 {
        let (status, _) = app
            .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
            .await;
        assert_eq!(status, 200);
    }

    let (status, _) = app
        .post_json("/onboarding/mobile/send", json!({ "mobile": MOBILE }))
        .await;
    assert_eq!(status, 429);
}
