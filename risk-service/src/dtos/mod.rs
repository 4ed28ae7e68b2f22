pub mod approval;
pub mod auth;
pub mod user;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Incorrect username or password")]
    pub error: String,
    #[schema(example = "invalid_credentials")]
    pub code: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Request approved successfully")]
    pub message: String,
}
