//! Session registry: issue, list, revoke, and resolve login sessions.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ClientMeta, Session, SessionInfo};
use crate::services::{ServiceError, Store};

/// Refresh credential entropy.
const REFRESH_TOKEN_BYTES: usize = 32;

/// A new session with the only copy of its plaintext refresh credential.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn Store>,
    expiry_days: i64,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn Store>, expiry_days: i64) -> Self {
        Self { store, expiry_days }
    }

    pub async fn create(
        &self,
        identity_id: Uuid,
        meta: ClientMeta,
    ) -> Result<IssuedSession, ServiceError> {
        let refresh_token = generate_refresh_token();
        let session = Session::new(
            identity_id,
            hash_refresh_token(&refresh_token),
            meta,
            self.expiry_days,
        );
        self.store.insert_session(&session).await?;

        tracing::info!(identity_id = %identity_id, session_id = %session.session_id, "Session created");

        Ok(IssuedSession {
            session,
            refresh_token,
        })
    }

    pub async fn list_active(
        &self,
        identity_id: Uuid,
        current_session: Uuid,
    ) -> Result<Vec<SessionInfo>, ServiceError> {
        Ok(self
            .store
            .list_active_sessions(identity_id)
            .await?
            .into_iter()
            .map(|s| SessionInfo::from_session(s, current_session))
            .collect())
    }

    /// Idempotent for the owner; `NotFound` for anyone else.
    pub async fn revoke(&self, identity_id: Uuid, session_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.revoke_session(identity_id, session_id).await? {
            return Err(ServiceError::NotFound("Session".to_string()));
        }
        tracing::info!(identity_id = %identity_id, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Loads a session that is neither revoked nor expired.
    pub async fn resolve(&self, session_id: Uuid) -> Result<Session, ServiceError> {
        match self.store.find_session(session_id).await? {
            Some(session) if session.is_valid() => Ok(session),
            _ => Err(ServiceError::SessionRevoked),
        }
    }

    pub async fn resolve_refresh_token(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        match self
            .store
            .find_session_by_refresh_hash(&hash_refresh_token(refresh_token))
            .await?
        {
            Some(session) if session.is_valid() => Ok(session),
            _ => Err(ServiceError::SessionRevoked),
        }
    }

    /// Best effort; failures are logged and swallowed.
    pub async fn touch(&self, session_id: Uuid) {
        if let Err(e) = self.store.touch_session(session_id, Utc::now()).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to update session activity");
        }
    }
}

pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
