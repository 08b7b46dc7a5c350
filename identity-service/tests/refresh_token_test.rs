//! Refresh rotation and concurrent-session cap tests.

mod common;

use common::TestApp;
use identity_service::services::SessionStore;
use serde_json::json;

const EMAIL: &str = "rotator@example.com";
const PASSWORD: &str = "correct-horse-battery";

async fn login(app: &TestApp) -> (String, String) {
    let (status, body) = app
        .post_json("/auth/login", json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    (
        body["tokens"]["access_token"].as_str().unwrap().to_string(),
        body["tokens"]["refresh_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn refresh_rotates_and_kills_the_previous_token() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;
    let (_, first_refresh) = login(&app).await;

    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": first_refresh }))
        .await;
    assert_eq!(status, 200, "unexpected body: {}", body);
    let second_refresh = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(second_refresh, first_refresh);

    // The first token is signed and unexpired, but rotation superseded it.
    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": first_refresh }))
        .await;
    assert_eq!(status, 401);

    // The rotated token keeps working.
    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": second_refresh }))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn rotation_does_not_grow_the_session_count() {
    let app = TestApp::spawn().await;
    let user = app.seed_user(EMAIL, PASSWORD).await;
    let (_, mut refresh) = login(&app).await;

    for _ in 0..3 {
        let (status, body) = app
            .post_json("/auth/refresh", json!({ "refresh_token": refresh }))
            .await;
        assert_eq!(status, 200);
        refresh = body["refresh_token"].as_str().unwrap().to_string();
    }

    assert_eq!(app.store.count_live_for_user(user.user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn session_cap_evicts_the_oldest_session() {
    let app = TestApp::spawn_with(|c| c.sessions.max_concurrent = 3).await;
    let user = app.seed_user(EMAIL, PASSWORD).await;

    let (_, first_refresh) = login(&app).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, _second) = login(&app).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, _third) = login(&app).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, fourth_refresh) = login(&app).await;

    // Cap = 3: the fourth login evicted exactly the oldest session.
    assert_eq!(app.store.count_live_for_user(user.user_id).await.unwrap(), 3);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": first_refresh }))
        .await;
    assert_eq!(status, 401);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": fourth_refresh }))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn logout_invalidates_exactly_one_session() {
    let app = TestApp::spawn().await;
    let user = app.seed_user(EMAIL, PASSWORD).await;

    let (_, refresh_a) = login(&app).await;
    let (_, refresh_b) = login(&app).await;
    assert_eq!(app.store.count_live_for_user(user.user_id).await.unwrap(), 2);

    let (status, _) = app
        .post_json("/auth/logout", json!({ "refresh_token": refresh_a }))
        .await;
    assert_eq!(status, 200);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh_a }))
        .await;
    assert_eq!(status, 401);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh_b }))
        .await;
    assert_eq!(status, 200);

    // Logout is idempotent.
    let (status, _) = app
        .post_json("/auth/logout", json!({ "refresh_token": refresh_a }))
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn access_token_cannot_be_used_as_refresh_token() {
    let app = TestApp::spawn().await;
    app.seed_user(EMAIL, PASSWORD).await;
    let (access, _) = login(&app).await;

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": access }))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn malformed_refresh_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": "junk.token.here" }))
        .await;
    assert_eq!(status, 401);
}
