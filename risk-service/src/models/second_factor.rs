//! Second-factor secret model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Base32 TOTP secret owned by one identity. Present only between setup and
/// disable; whether it is active is tracked on the identity.
#[derive(Debug, Clone, FromRow)]
pub struct SecondFactorSecret {
    pub identity_id: Uuid,
    pub totp_secret: String,
    pub created_utc: DateTime<Utc>,
}

impl SecondFactorSecret {
    pub fn new(identity_id: Uuid, totp_secret: String) -> Self {
        Self {
            identity_id,
            totp_secret,
            created_utc: Utc::now(),
        }
    }
}

/// Material returned by setup for out-of-band enrollment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Enrollment {
    pub secret: String,
    /// `otpauth://` provisioning URI.
    pub qr_code_url: String,
    /// PNG rendering of the provisioning URI, base64-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_png: Option<String>,
}
