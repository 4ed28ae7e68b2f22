#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use risk_service::{
    build_router,
    config::{
        ApprovalPolicy, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RiskConfig,
        SecondFactorConfig, SecurityConfig,
    },
    models::{CapabilitySet, Identity, Role},
    services::{IdentityStore, MemoryStore},
    utils::{hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "password123";

pub fn test_config(forbid_self_approval: bool) -> RiskConfig {
    RiskConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        environment: Environment::Dev,
        service_name: "risk-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            timeout_seconds: 5,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-that-is-at-least-32-bytes".to_string(),
            access_token_expiry_minutes: 30,
            session_expiry_days: 7,
        },
        second_factor: SecondFactorConfig {
            issuer: "Risk Register Test".to_string(),
        },
        approvals: ApprovalPolicy {
            forbid_self_approval,
            record_prefix: "INC".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            // Requests are built as if one proxy set x-forwarded-for
            trusted_proxy_hops: 1,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
        bootstrap_admin: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

/// Tokens from a successful login.
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(true))
    }

    pub fn with_config(config: RiskConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone()).expect("Failed to build app state");
        let router = build_router(state.clone());
        Self {
            router,
            store,
            state,
        }
    }

    pub async fn create_identity(&self, username: &str, role: Role, caps: &[&str]) -> Identity {
        let hash = hash_password(&Password::new(PASSWORD.to_string())).unwrap();
        let identity = Identity::new(
            username.to_string(),
            format!("{}@example.com", username),
            hash.into_string(),
            role,
            &CapabilitySet::from_strings(caps),
        );
        self.store.insert_identity(&identity).await.unwrap();
        identity
    }

    pub async fn login_form(&self, username: &str, password: &str, otp: Option<&str>) -> (StatusCode, Value) {
        let mut fields = vec![("username", username), ("password", password)];
        if let Some(code) = otp {
            fields.push(("otp", code));
        }
        let body = serde_urlencoded::to_string(&fields).unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::USER_AGENT, "integration-test")
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    pub async fn login(&self, username: &str) -> Tokens {
        let (status, body) = self.login_form(username, PASSWORD, None).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        Tokens {
            access: body["access_token"].as_str().unwrap().to_string(),
            refresh: body["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), body).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

/// Current code for a base32 secret returned by 2FA setup.
pub fn current_code(secret: &str) -> String {
    totp(secret).generate_current().unwrap()
}

/// Code for a specific unix time.
pub fn code_at(secret: &str, unix_seconds: u64) -> String {
    totp(secret).generate(unix_seconds)
}

fn totp(secret: &str) -> totp_rs::TOTP {
    totp_rs::TOTP::new(
        totp_rs::Algorithm::SHA1,
        6,
        1,
        30,
        totp_rs::Secret::Encoded(secret.to_string())
            .to_bytes()
            .unwrap(),
        None,
        "test".to_string(),
    )
    .unwrap()
}

pub fn create_payload() -> Value {
    serde_json::json!({
        "action": "create",
        "payload": {
            "reportTitle": "Server room flooding",
            "clientCode": "ACME",
            "riskDescription": "Water ingress under raised floor",
            "severity": "high",
            "date": "2025-03-14",
            "images": ["https://files.example.com/flood.jpg"]
        },
        "note": "Found during inspection"
    })
}
