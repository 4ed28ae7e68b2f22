use service_core::axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Inactive user")]
    InactiveAccount,

    #[error("2FA code required")]
    MissingCode,

    #[error("Invalid 2FA code")]
    InvalidCode,

    #[error("2FA is enabled but no secret is configured")]
    MisconfiguredSecret,

    #[error("2FA setup not initiated")]
    NotSetUp,

    #[error("2FA is already enabled")]
    AlreadyEnabled,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Session has been revoked or has expired")]
    SessionRevoked,

    #[error("Missing capability: {0}")]
    Forbidden(String),

    #[error("Requesters may not decide their own requests")]
    SelfApprovalForbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Request {0} has already been processed")]
    AlreadyProcessed(String),

    #[error("Failed to apply approved change: {0}")]
    ApplyFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::InactiveAccount => "inactive_account",
            ServiceError::MissingCode => "missing_code",
            ServiceError::InvalidCode => "invalid_code",
            ServiceError::MisconfiguredSecret => "misconfigured_secret",
            ServiceError::NotSetUp => "not_set_up",
            ServiceError::AlreadyEnabled => "already_enabled",
            ServiceError::InvalidToken => "invalid_token",
            ServiceError::SessionRevoked => "session_revoked",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::SelfApprovalForbidden => "self_approval_forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyProcessed(_) => "already_processed",
            ServiceError::ApplyFailed(_) => "apply_failed",
            ServiceError::Validation(_) => "validation_failed",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::StoreUnavailable(_) => "store_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidCredentials
            | ServiceError::MissingCode
            | ServiceError::InvalidCode
            | ServiceError::MisconfiguredSecret
            | ServiceError::InvalidToken
            | ServiceError::SessionRevoked => StatusCode::UNAUTHORIZED,
            ServiceError::InactiveAccount
            | ServiceError::NotSetUp
            | ServiceError::AlreadyProcessed(_) => StatusCode::BAD_REQUEST,
            ServiceError::Forbidden(_) | ServiceError::SelfApprovalForbidden => {
                StatusCode::FORBIDDEN
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyEnabled | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::ApplyFailed(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        let unavailable = matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        );
        let db_code = err
            .as_database_error()
            .and_then(|db| db.code().map(|c| c.into_owned()));

        if unavailable {
            return ServiceError::StoreUnavailable(err.to_string());
        }

        match db_code.as_deref() {
            // unique_violation, foreign_key_violation
            Some("23505") | Some("23503") => ServiceError::Conflict(err.to_string()),
            // query_canceled, raised by statement_timeout
            Some("57014") => ServiceError::StoreUnavailable(err.to_string()),
            _ => ServiceError::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = err.status();
        let code = err.code();
        match err {
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::ApplyFailed(cause) => {
                AppError::domain(status, code, "Failed to apply approved change").with_details(cause)
            }
            ServiceError::StoreUnavailable(cause) => {
                tracing::error!(cause = %cause, "Store unavailable");
                AppError::domain(status, code, "Store unavailable, retry later")
            }
            other => AppError::domain(status, code, other.to_string()),
        }
    }
}
