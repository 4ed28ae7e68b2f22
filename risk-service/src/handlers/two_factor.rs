use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{TwoFactorEnableRequest, TwoFactorSetupResponse},
    middleware::AuthUser,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Generate a TOTP secret and enrollment URI
#[utoipa::path(
    post,
    path = "/api/v1/2fa/setup",
    responses(
        (status = 200, description = "Secret generated", body = TwoFactorSetupResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 409, description = "2FA already enabled", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn setup(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.auth.second_factor().setup(&user.0.identity).await?;
    Ok(Json(TwoFactorSetupResponse {
        secret: enrollment.secret,
        qr_code_url: enrollment.qr_code_url,
        qr_code_png: enrollment.qr_code_png,
    }))
}

/// Confirm the set-up secret with a current code
#[utoipa::path(
    post,
    path = "/api/v1/2fa/enable",
    request_body = TwoFactorEnableRequest,
    responses(
        (status = 204, description = "2FA enabled"),
        (status = 400, description = "Invalid code or setup not started", body = ErrorResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn enable(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<TwoFactorEnableRequest>,
) -> Result<impl IntoResponse, AppError> {
    match state
        .auth
        .second_factor()
        .enable(&user.0.identity, req.token.trim())
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        // A wrong code here is a bad request, not an authentication failure
        Err(ServiceError::InvalidCode) => Err(AppError::domain(
            StatusCode::BAD_REQUEST,
            ServiceError::InvalidCode.code(),
            ServiceError::InvalidCode.to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Turn 2FA off
#[utoipa::path(
    post,
    path = "/api/v1/2fa/disable",
    responses(
        (status = 204, description = "2FA disabled"),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn disable(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth.second_factor().disable(&user.0.identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
