//! Session model - one row per successful login.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Client details captured at login.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Session entity. Only the SHA-256 of the refresh credential is stored.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub refresh_token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub revoked: bool,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub last_active_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(
        identity_id: Uuid,
        refresh_token_hash: String,
        meta: ClientMeta,
        expiry_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            identity_id,
            refresh_token_hash,
            user_agent: meta.user_agent,
            ip_address: meta.ip_address,
            revoked: false,
            created_utc: now,
            expiry_utc: now + Duration::days(expiry_days),
            last_active_utc: now,
        }
    }

    /// Not revoked and not expired.
    pub fn is_valid(&self) -> bool {
        !self.revoked && self.expiry_utc > Utc::now()
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }
}

/// Session info for API responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub last_active_utc: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(s: Session, current: Uuid) -> Self {
        Self {
            is_current: s.session_id == current,
            session_id: s.session_id,
            user_agent: s.user_agent,
            ip_address: s.ip_address,
            created_utc: s.created_utc,
            expiry_utc: s.expiry_utc,
            last_active_utc: s.last_active_utc,
        }
    }
}
