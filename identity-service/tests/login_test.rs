//! Login, email verification, social login and introspection tests.

mod common;

use common::TestApp;
use identity_service::services::{CredentialStore, SocialIdentity};
use serde_json::json;

const EMAIL: &str = "worker@example.com";
const PASSWORD: &str = "correct-horse-battery";

#[tokio::test]
async fn login_returns_token_pair_and_updates_last_login() {
    let app = TestApp::spawn().await;
    let user = app.seed_user(EMAIL, PASSWORD).await;

    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["user"]["email"], EMAIL);
    assert_eq!(body["tokens"]["token_type"], "Bearer");
    assert!(!body["tokens"]["access_token"].as_str().unwrap().is_empty());

    let stored = app.store.find_by_id(user.user_id).await.unwrap().unwrap();
    assert!(stored.last_login_utc.is_some());
}

#[tokio::test]
async fn login_is_case_insensitive_on_email() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;

    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "email": "Worker@Example.COM", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;

    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": "nope-nope" }))
        .await;
    assert_eq!(status, 401);
    let wrong_password_error = body["error"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json(
            "/auth/login",
            json!({ "email": "ghost@example.com", "password": "nope-nope" }),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"].as_str().unwrap(), wrong_password_error);
}

#[tokio::test]
async fn deactivated_account_cannot_login() {
    let app = TestApp::spawn().await;
    app.seed_user_with(EMAIL, PASSWORD, |c| c.is_active = false).await;

    let (status, _) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn unverified_login_triggers_code_and_returns_verification_required() {
    let app = TestApp::spawn_with(|c| c.otp.resend_interval_seconds = 60).await;
    app.seed_user_with(EMAIL, PASSWORD, |c| c.is_email_verified = false)
        .await;

    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "verification_required");
    assert!(body.get("tokens").is_none());
    assert_eq!(app.notifier.sent_count(), 1);

    // Logging in again inside the resend interval does not spam codes.
    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "verification_required");
    assert_eq!(app.notifier.sent_count(), 1);

    // Submitting the delivered code verifies the email and unblocks login.
    let code = app.notifier.last_code_for(EMAIL).unwrap();
    let (status, _) = app
        .post_json("/auth/verify-email", json!({ "email": EMAIL, "code": code }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 200);
    assert!(body["tokens"]["access_token"].as_str().is_some());
}

#[tokio::test]
async fn social_login_materializes_passwordless_credential() {
    let app = TestApp::spawn().await;
    app.social.set_identity(SocialIdentity {
        subject: "google-oauth2-12345".to_string(),
        email: "social@example.com".to_string(),
        email_verified: true,
        name: Some("Sam Social".to_string()),
    });

    let (status, body) = app
        .post_json(
            "/auth/social",
            json!({ "provider": "google", "access_token": "provider-token" }),
        )
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    assert_eq!(body["user"]["email"], "social@example.com");
    assert_eq!(body["user"]["is_email_verified"], true);

    let stored = app
        .store
        .find_by_email("social@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.password_hash.is_none());
    assert_eq!(stored.external_id.as_deref(), Some("google-oauth2-12345"));

    // No password was ever set, so password login stays closed.
    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "email": "social@example.com", "password": "anything-at-all" }),
        )
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn social_login_with_unsupported_provider_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post_json(
            "/auth/social",
            json!({ "provider": "myspace", "access_token": "token" }),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn introspection_reflects_session_revocation() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;

    let (_, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    let access = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json("/auth/introspect", json!({ "token": access }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["active"], true);
    assert_eq!(body["email"], EMAIL);

    let (status, _) = app
        .post_json_auth("/auth/logout-all", json!({}), &access)
        .await;
    assert_eq!(status, 200);

    // The session is gone, so the still-unexpired JWT introspects inactive.
    let (status, body) = app
        .post_json("/auth/introspect", json!({ "token": access }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["active"], false);
    assert!(body.get("email").is_none());
}

#[tokio::test]
async fn garbage_token_introspects_inactive() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post_json("/auth/introspect", json!({ "token": "not.a.jwt" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;

    let (_, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    let access = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json_auth(
            "/auth/password",
            json!({ "current_password": "wrong-current", "new_password": "new-password-123" }),
            &access,
        )
        .await;
    assert_eq!(status, 401);

    let (status, _) = app
        .post_json_auth(
            "/auth/password",
            json!({ "current_password": PASSWORD, "new_password": "new-password-123" }),
            &access,
        )
        .await;
    assert_eq!(status, 200);

    let (status, _) = app
        .post_json(
            "/auth/login",
            json!({ "email": EMAIL, "password": "new-password-123" }),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn deactivation_revokes_all_sessions() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;

    let (_, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    let access = body["tokens"]["access_token"].as_str().unwrap().to_string();
    let refresh = body["tokens"]["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json_auth("/auth/deactivate", json!({}), &access)
        .await;
    assert_eq!(status, 200);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, 401);

    let (status, _) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 401);
}
