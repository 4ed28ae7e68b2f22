use axum::{
    extract::{FromRequest, Request},
    Form, Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::services::ServiceError;

/// JSON body that must also pass its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Form-encoded body whose rejections render as `AppError`.
pub struct FormBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for FormBody<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Form parse error: {}", e)))?;

        Ok(FormBody(value))
    }
}

/// Path ids that do not parse cannot name an existing `entity`.
pub fn parse_path_id(raw: &str, entity: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::NotFound(entity.to_string()))
}
