mod common;

use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use common::{
    ADMIN, TEACHER, TestApp, at, body_json, credential, empty_request, json_request, subject,
};
use rollcall_core::{ErrorKind, HashScheme};
use rollcall_models::{Credential, Role};

const PASSWORD: &str = "correct horse battery";

async fn app_with_users() -> TestApp {
    let app = TestApp::new(at(8, 0));
    for (uin, role) in [("S1", Role::Student), (TEACHER, Role::Teacher), (ADMIN, Role::Admin)] {
        app.seed_credential(credential(uin, PASSWORD, role)).await;
    }
    app
}

fn login_body(uin: &str, password: &str) -> serde_json::Value {
    json!({ "uin": uin, "password": password })
}

#[tokio::test]
async fn test_login_success() {
    let app = app_with_users().await;

    let response = app
        .router()
        .oneshot(json_request("POST", "/api/auth/login", None, login_body("S1", PASSWORD)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["subject_id"], "S1");
    assert_eq!(body["role"], "student");

    let token = body["access_token"].as_str().unwrap();
    let actor = app.auth.authenticate(token).unwrap();
    assert_eq!(actor.subject_id, subject("S1"));
    assert_eq!(actor.role, Role::Student);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_uin_look_the_same() {
    let app = app_with_users().await;
    let router = app.router();

    let wrong = router
        .clone()
        .oneshot(json_request("POST", "/api/auth/login", None, login_body("S1", "nope")))
        .await
        .unwrap();
    let unknown = router
        .oneshot(json_request("POST", "/api/auth/login", None, login_body("S404", "nope")))
        .await
        .unwrap();

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn test_login_body_validation() {
    let app = app_with_users().await;
    let router = app.router();

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/auth/login", None, login_body("S1", "")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router
        .oneshot(json_request("POST", "/api/auth/login", None, json!({ "uin": "S1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "password is required");
}

#[tokio::test]
async fn test_legacy_digest_is_rotated_on_login() {
    let app = TestApp::new(at(8, 0));
    app.seed_credential(Credential {
        subject_id: subject("S1"),
        secret_hash: hex::encode(Sha256::digest(PASSWORD.as_bytes())),
        role: Role::Student,
    })
    .await;
    let cancel = CancellationToken::new();

    app.auth.login("S1", PASSWORD, &cancel).await.unwrap();

    let stored = app.credentials.stored_hash(&subject("S1")).unwrap();
    assert_eq!(HashScheme::detect(&stored), HashScheme::Bcrypt);

    // The rotated hash keeps working.
    app.auth.login("S1", PASSWORD, &cancel).await.unwrap();
}

#[tokio::test]
async fn test_login_fails_when_rotation_cannot_be_stored() {
    let app = TestApp::new(at(8, 0));
    let legacy = hex::encode(Sha256::digest(PASSWORD.as_bytes()));
    app.seed_credential(Credential {
        subject_id: subject("S1"),
        secret_hash: legacy.clone(),
        role: Role::Student,
    })
    .await;
    app.credentials.failures.fail_writes(true);

    let err = app
        .auth
        .login("S1", PASSWORD, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Upstream));
    assert_eq!(app.credentials.stored_hash(&subject("S1")).unwrap(), legacy);
}

#[tokio::test]
async fn test_lookup_is_retried_once() {
    let app = app_with_users().await;
    let cancel = CancellationToken::new();

    app.credentials.failures.fail_next_reads(1);
    app.auth.login("S1", PASSWORD, &cancel).await.unwrap();

    app.credentials.failures.fail_next_reads(2);
    let err = app.auth.login("S1", PASSWORD, &cancel).await.unwrap_err();
    assert!(err.is(ErrorKind::Upstream));
}

#[tokio::test]
async fn test_register_requires_admin() {
    let app = app_with_users().await;
    let router = app.router();
    let admin = app.bearer(ADMIN, Role::Admin);
    let teacher = app.bearer(TEACHER, Role::Teacher);
    let body = json!({ "uin": "S2", "password": "another password", "role": "student" });

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/auth/register", Some(&teacher), body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/auth/register", Some(&admin), body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["subject_id"], "S2");
    assert_eq!(created["role"], "student");

    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/auth/register", Some(&admin), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(json_request("POST", "/api/auth/login", None, login_body("S2", "another password")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = app_with_users().await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            Some(&app.bearer(ADMIN, Role::Admin)),
            json!({ "uin": "S4", "password": "short", "role": "student" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.credentials.stored_hash(&subject("S4")).is_none());
}

#[tokio::test]
async fn test_bearer_token_checks() {
    let app = app_with_users().await;
    let router = app.router();

    let response = router
        .clone()
        .oneshot(empty_request("GET", "/api/lessons/L-0900/attendance", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(empty_request(
            "GET",
            "/api/lessons/L-0900/attendance",
            Some("Bearer not.a.token"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["kind"], "unauthorized");

    let bearer = app.bearer(TEACHER, Role::Teacher);
    app.clock.advance(Duration::seconds(3600));
    let response = router
        .oneshot(empty_request("GET", "/api/lessons/L-0900/attendance", Some(&bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["kind"], "expired");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(at(8, 0));
    let response = app
        .router()
        .oneshot(empty_request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
