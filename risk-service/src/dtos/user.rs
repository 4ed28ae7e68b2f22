use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    #[schema(example = "bob")]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// `Superadmin`, `Admin` or `user`.
    #[schema(example = "user")]
    pub role: Option<String>,

    /// Capability grants, e.g. `risk_event.create`.
    #[serde(default)]
    pub access: Vec<String>,
}
