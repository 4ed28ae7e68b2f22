use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::user::CreateUserRequest,
    middleware::AuthUser,
    models::{CapabilitySet, IdentityResponse, Role},
    services::admin::NewIdentity,
    utils::{parse_path_id, Password, ValidatedJson},
    AppState,
};

/// Current caller's profile
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Caller profile", body = IdentityResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(user: AuthUser) -> Json<IdentityResponse> {
    Json(user.0.identity.sanitized())
}

/// Create an identity
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Identity created", body = IdentityResponse),
        (status = 403, description = "Missing user.manage", body = ErrorResponse),
        (status = 409, description = "Username or email taken", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new = NewIdentity {
        username: req.username,
        email: req.email,
        password: Password::new(req.password),
        first_name: req.first_name,
        last_name: req.last_name,
        role: req
            .role
            .as_deref()
            .map(Role::from_label)
            .unwrap_or(Role::User),
        capabilities: CapabilitySet::from_strings(&req.access),
    };

    let identity = state.admin.create_identity(&user.0.identity, new).await?;
    Ok((StatusCode::CREATED, Json(identity.sanitized())))
}

/// Delete an identity with its sessions and second-factor secret
#[utoipa::path(
    delete,
    path = "/api/v1/users/{identity_id}",
    params(
        ("identity_id" = String, Path, description = "Identity id (UUID)")
    ),
    responses(
        (status = 204, description = "Identity deleted"),
        (status = 403, description = "Missing user.manage", body = ErrorResponse),
        (status = 404, description = "Identity not found", body = ErrorResponse),
        (status = 409, description = "Identity referenced by approval requests", body = ErrorResponse),
        (status = 422, description = "Cannot delete yourself", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(identity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let identity_id = parse_path_id(&identity_id, "User")?;
    state
        .admin
        .delete_identity(&user.0.identity, identity_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
