use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::resolve_client_ip;
use std::net::SocketAddr;

use crate::{
    dtos::auth::{LoginForm, RefreshRequest},
    middleware::AuthUser,
    models::ClientMeta,
    services::LoginAttempt,
    utils::{FormBody, Password, ValidatedJson},
    AppState,
};

/// Caller details recorded on the session row.
fn client_meta(
    headers: &HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    trusted_proxy_hops: usize,
) -> ClientMeta {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.chars().take(512).collect());

    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let ip_address =
        resolve_client_ip(headers, peer, trusted_proxy_hops).map(|ip| ip.to_string());

    ClientMeta {
        user_agent,
        ip_address,
    }
}

/// Login with username or email, password and optional TOTP code
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Account inactive", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or second factor", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    FormBody(form): FormBody<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = LoginAttempt {
        login: form.username.trim().to_string(),
        password: Password::new(form.password),
        otp: form.otp,
        meta: client_meta(&headers, connect, state.config.security.trusted_proxy_hops),
    };

    let res = state.auth.login(attempt).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Exchange a refresh token for a new access token on the same session
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Session revoked or expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Revoke the session of the presented token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
