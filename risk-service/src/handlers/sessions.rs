use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{middleware::AuthUser, utils::parse_path_id, AppState};

/// List the caller's live sessions
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    responses(
        (status = 200, description = "Active sessions, newest first", body = [SessionInfo]),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let ctx = user.0;
    let sessions = state
        .auth
        .sessions()
        .list_active(ctx.identity.identity_id, ctx.session_id)
        .await?;
    Ok(Json(sessions))
}

/// Revoke one of the caller's sessions
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session id (UUID)")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 404, description = "No such session for this caller", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_path_id(&session_id, "Session")?;
    state
        .auth
        .sessions()
        .revoke(user.0.identity.identity_id, session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
