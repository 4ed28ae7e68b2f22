pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use service_core::observability::init_metrics;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, RiskConfig};
use crate::services::{
    AdminService, ApprovalEngine, AuthService, JwtService, SecondFactorService, SessionRegistry,
    Store,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::sessions::list_sessions,
        handlers::sessions::revoke_session,
        handlers::two_factor::setup,
        handlers::two_factor::enable,
        handlers::two_factor::disable,
        handlers::users::get_me,
        handlers::users::create_user,
        handlers::users::delete_user,
        handlers::approvals::create_request,
        handlers::approvals::list_pending,
        handlers::approvals::list_mine,
        handlers::approvals::decide,
        handlers::approvals::get_risk_event,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginForm,
            dtos::auth::RefreshRequest,
            dtos::auth::TwoFactorEnableRequest,
            dtos::auth::TwoFactorSetupResponse,
            dtos::user::CreateUserRequest,
            dtos::approval::ProposeRequest,
            dtos::approval::DecisionResponse,
            services::TokenResponse,
            models::IdentityResponse,
            models::SessionInfo,
            models::ApprovalAction,
            models::ApprovalRequestResponse,
            models::RiskEvent,
            models::RiskEventPatch,
            models::Severity,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, token refresh and logout"),
        (name = "Sessions", description = "Per-login session management"),
        (name = "Two-Factor", description = "TOTP second factor"),
        (name = "User", description = "Identity profile and administration"),
        (name = "Approvals", description = "Maker-checker workflow for risk events"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: RiskConfig,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub approvals: ApprovalEngine,
    pub admin: AdminService,
    pub metrics: PrometheusHandle,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wires every service over one shared store.
    pub fn new(config: RiskConfig, store: Arc<dyn Store>) -> Result<Self, AppError> {
        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let sessions = SessionRegistry::new(store.clone(), config.jwt.session_expiry_days);
        let second_factor =
            SecondFactorService::new(store.clone(), config.second_factor.issuer.clone());
        let auth = AuthService::new(store.clone(), jwt, sessions, second_factor);
        let approvals = ApprovalEngine::new(store.clone(), config.approvals.clone());
        let admin = AdminService::new(store.clone());

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
            config.security.trusted_proxy_hops,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
            config.security.trusted_proxy_hops,
        );

        Ok(Self {
            config,
            store,
            auth,
            approvals,
            admin,
            metrics: init_metrics()?,
            login_rate_limiter,
            ip_rate_limiter,
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .inspect_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_router(state: AppState) -> Router {
    // Login with its own per-IP limiter
    let login_route = Router::new()
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/v1/sessions/:session_id",
            delete(handlers::sessions::revoke_session),
        )
        .route("/api/v1/2fa/setup", post(handlers::two_factor::setup))
        .route("/api/v1/2fa/enable", post(handlers::two_factor::enable))
        .route("/api/v1/2fa/disable", post(handlers::two_factor::disable))
        .route("/api/v1/users/me", get(handlers::users::get_me))
        .route("/api/v1/users", post(handlers::users::create_user))
        .route(
            "/api/v1/users/:identity_id",
            delete(handlers::users::delete_user),
        )
        .route(
            "/api/v1/risk-events/request",
            post(handlers::approvals::create_request),
        )
        .route(
            "/api/v1/risk-events/approvals/pending",
            get(handlers::approvals::list_pending),
        )
        .route(
            "/api/v1/risk-events/requests/mine",
            get(handlers::approvals::list_mine),
        )
        .route(
            "/api/v1/risk-events/approvals/:request_id/:action",
            post(handlers::approvals::decide),
        )
        .route(
            "/api/v1/risk-events/records/:incident_id",
            get(handlers::approvals::get_risk_event),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let cors = cors_layer(&state.config.security.allowed_origins);
    let ip_limiter = state.ip_rate_limiter.clone();

    app.route("/api/v1/auth/refresh", post(handlers::auth::refresh))
        .merge(login_route)
        .merge(protected)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
