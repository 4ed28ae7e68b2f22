use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Form-encoded login body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    /// Username or email.
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "password123")]
    pub password: String,
    /// Current TOTP code, required once 2FA is enabled.
    #[schema(example = "123456")]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorEnableRequest {
    #[validate(length(min = 1, max = 16, message = "Code is required"))]
    #[schema(example = "123456")]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    #[schema(example = "otpauth://totp/Risk%20Register:alice?secret=JBSWY3DPEHPK3PXP&issuer=Risk%20Register")]
    pub qr_code_url: String,
    pub qr_code_png: Option<String>,
}
