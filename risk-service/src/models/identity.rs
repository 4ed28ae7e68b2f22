//! Identity model - login accounts with role and capability grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::capability::CapabilitySet;

/// Role labels. Only `Superadmin` carries implicit authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Superadmin,
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "Superadmin",
            Role::Admin => "Admin",
            Role::User => "user",
        }
    }

    /// Unknown labels degrade to `User`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "superadmin" => Role::Superadmin,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// Identity entity.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub access: Vec<String>,
    pub is_active: bool,
    pub second_factor_enabled: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        role: Role,
        capabilities: &CapabilitySet,
    ) -> Self {
        let now = Utc::now();
        Self {
            identity_id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            first_name: None,
            last_name: None,
            role: role.as_str().to_string(),
            access: capabilities.to_strings(),
            is_active: true,
            second_factor_enabled: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_label(&self.role)
    }

    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_strings(&self.access)
    }

    /// Name stamped into audit fields.
    pub fn display_name(&self) -> &str {
        &self.username
    }

    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse::from(self)
    }
}

/// Identity as returned by the API (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub identity_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: String,
    pub access: Vec<String>,
    pub is_active: bool,
    pub second_factor_enabled: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(i: &Identity) -> Self {
        Self {
            identity_id: i.identity_id,
            username: i.username.clone(),
            email: i.email.clone(),
            first_name: i.first_name.clone(),
            last_name: i.last_name.clone(),
            role: i.role.clone(),
            access: i.access.clone(),
            is_active: i.is_active,
            second_factor_enabled: i.second_factor_enabled,
            created_utc: i.created_utc,
        }
    }
}
