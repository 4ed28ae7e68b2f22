use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use service_core::error::AppError;

use crate::{
    services::{AuthContext, ServiceError},
    AppState,
};

/// Bearer token from the `Authorization` header, if well formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware to require an access token bound to a live session
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(req.headers()).ok_or(ServiceError::InvalidToken)?;

    let ctx = state.auth.authenticate(token).await?;

    // Handlers read the resolved identity back through `AuthUser`
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Extractor for the caller resolved by `auth_middleware`
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(ctx.clone()))
    }
}
