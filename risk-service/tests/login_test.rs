mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use risk_service::models::Role;
use risk_service::services::IdentityStore;

#[tokio::test]
async fn login_returns_bearer_and_refresh_tokens() {
    let app = TestApp::new();
    app.create_identity("alice", Role::User, &[]).await;

    let (status, body) = app.login_form("alice", PASSWORD, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert!(body["access_token"].as_str().unwrap().len() > 20);
    assert_eq!(body["refresh_token"].as_str().unwrap().len(), 43);
    assert_eq!(body["expires_in"], 30 * 60);
}

#[tokio::test]
async fn login_accepts_email_as_identifier() {
    let app = TestApp::new();
    app.create_identity("alice", Role::User, &[]).await;

    let (status, _) = app.login_form("alice@example.com", PASSWORD, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.login_form("Alice@Example.COM", PASSWORD, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_the_same() {
    let app = TestApp::new();
    app.create_identity("alice", Role::User, &[]).await;

    let (s1, b1) = app.login_form("nobody", PASSWORD, None).await;
    let (s2, b2) = app.login_form("alice", "wrong-password", None).await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, b2);
    assert_eq!(b1["code"], "invalid_credentials");
}

#[tokio::test]
async fn inactive_account_is_bad_request_after_password_check() {
    let app = TestApp::new();
    let mut identity = app.create_identity("alice", Role::User, &[]).await;
    identity.is_active = false;
    identity.username = "inactive".to_string();
    identity.email = "inactive@example.com".to_string();
    identity.identity_id = uuid::Uuid::new_v4();
    app.store.insert_identity(&identity).await.unwrap();

    let (status, body) = app.login_form("inactive", PASSWORD, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "inactive_account");

    // Wrong password on an inactive account still reads as bad credentials
    let (status, body) = app.login_form("inactive", "wrong-password", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app
        .call(axum::http::Method::GET, "/api/v1/users/me", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token");

    let (status, _) = app.get("/api/v1/users/me", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_profile_without_hash() {
    let app = TestApp::new();
    app.create_identity("alice", Role::Admin, &["risk_event.create"]).await;
    let tokens = app.login("alice").await;

    let (status, body) = app.get("/api/v1/users/me", &tokens.access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "Admin");
    assert_eq!(body["access"][0], "risk_event.create");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn refresh_mints_token_for_same_session() {
    let app = TestApp::new();
    app.create_identity("alice", Role::User, &[]).await;
    let tokens = app.login("alice").await;

    let (status, body) = app
        .call(
            axum::http::Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(serde_json::json!({ "refresh_token": tokens.refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("refresh_token").is_none());
    let refreshed = body["access_token"].as_str().unwrap().to_string();

    let (_, sessions) = app.get("/api/v1/sessions", &refreshed).await;
    let sessions = sessions.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["is_current"], true);
}

#[tokio::test]
async fn logout_kills_access_and_refresh_tokens() {
    let app = TestApp::new();
    app.create_identity("alice", Role::User, &[]).await;
    let tokens = app.login("alice").await;

    let (status, _) = app.post("/api/v1/auth/logout", &tokens.access, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get("/api/v1/users/me", &tokens.access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_revoked");

    let (status, body) = app
        .call(
            axum::http::Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(serde_json::json!({ "refresh_token": tokens.refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "session_revoked");
}

#[tokio::test]
async fn login_is_rate_limited_per_ip() {
    let mut config = common::test_config(true);
    config.rate_limit.login_attempts = 2;
    let app = TestApp::with_config(config);
    app.create_identity("alice", Role::User, &[]).await;

    let attempt = || {
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "203.0.113.7")
            .body(axum::body::Body::from("username=alice&password=wrong"))
            .unwrap()
    };

    for _ in 0..2 {
        let (status, _) = app.send(attempt()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = app.send(attempt()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");
}

#[tokio::test]
async fn health_reports_store_up() {
    let app = TestApp::new();
    let (status, body) = app
        .call(axum::http::Method::GET, "/health", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_evade_login_limit() {
    let mut config = common::test_config(true);
    config.rate_limit.login_attempts = 2;
    config.security.trusted_proxy_hops = 0;
    let app = TestApp::with_config(config);
    app.create_identity("alice", Role::User, &[]).await;

    let mut statuses = Vec::new();
    for i in 0..6 {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-forwarded-for", format!("198.51.100.{}", i))
            .extension(axum::extract::ConnectInfo(std::net::SocketAddr::from((
                [192, 0, 2, 44],
                51000,
            ))))
            .body(axum::body::Body::from("username=alice&password=wrong"))
            .unwrap();
        statuses.push(app.send(request).await.0);
    }

    assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED, StatusCode::UNAUTHORIZED]);
    assert!(statuses[2..]
        .iter()
        .all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn only_the_proxy_appended_hop_is_trusted() {
    let mut config = common::test_config(true);
    config.rate_limit.login_attempts = 2;
    let app = TestApp::with_config(config);
    app.create_identity("alice", Role::User, &[]).await;

    let mut statuses = Vec::new();
    for i in 0..3 {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-forwarded-for", format!("198.51.100.{}, 203.0.113.9", i))
            .body(axum::body::Body::from("username=alice&password=wrong"))
            .unwrap();
        statuses.push(app.send(request).await.0);
    }
    assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn malformed_login_form_gets_structured_error() {
    let app = TestApp::new();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(axum::body::Body::from("username=alice"))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
