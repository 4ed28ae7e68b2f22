//! TOTP second factor: setup, enable, disable, and login-time verification.

use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::models::{Enrollment, Identity, SecondFactorSecret};
use crate::services::{ServiceError, Store};

const DIGITS: usize = 6;
/// Accepted steps either side of the current one.
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

#[derive(Clone)]
pub struct SecondFactorService {
    store: Arc<dyn Store>,
    issuer: String,
}

impl SecondFactorService {
    pub fn new(store: Arc<dyn Store>, issuer: String) -> Self {
        Self { store, issuer }
    }

    /// Builds a verifier for a stored base32 secret.
    pub fn totp(&self, secret_base32: &str, account: &str) -> Result<TOTP, ServiceError> {
        let bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))
    }

    /// Stores a fresh secret, replacing any unconfirmed one.
    #[tracing::instrument(skip(self, identity), fields(identity_id = %identity.identity_id))]
    pub async fn setup(&self, identity: &Identity) -> Result<Enrollment, ServiceError> {
        if identity.second_factor_enabled {
            return Err(ServiceError::AlreadyEnabled);
        }

        let secret = Secret::generate_secret().to_encoded().to_string();
        let totp = self.totp(&secret, &identity.username)?;

        self.store
            .upsert_secret(&SecondFactorSecret::new(identity.identity_id, secret.clone()))
            .await?;

        let qr_code_png = match totp.get_qr_base64() {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!(error = %e, "QR rendering failed, returning URI only");
                None
            }
        };

        tracing::info!("Second factor setup started");

        Ok(Enrollment {
            secret,
            qr_code_url: totp.get_url(),
            qr_code_png,
        })
    }

    /// Confirms the set-up secret with a current code and turns 2FA on.
    #[tracing::instrument(skip(self, identity, code), fields(identity_id = %identity.identity_id))]
    pub async fn enable(&self, identity: &Identity, code: &str) -> Result<(), ServiceError> {
        let secret = self
            .store
            .find_secret(identity.identity_id)
            .await?
            .ok_or(ServiceError::NotSetUp)?;

        if !self.check(&secret.totp_secret, &identity.username, code)? {
            tracing::warn!("Second factor enable rejected: bad code");
            return Err(ServiceError::InvalidCode);
        }

        self.store
            .set_second_factor_enabled(identity.identity_id, true)
            .await?;
        tracing::info!("Second factor enabled");
        Ok(())
    }

    /// Turns 2FA off and forgets the secret. No code is required.
    #[tracing::instrument(skip(self, identity), fields(identity_id = %identity.identity_id))]
    pub async fn disable(&self, identity: &Identity) -> Result<(), ServiceError> {
        self.store.disable_second_factor(identity.identity_id).await?;
        tracing::info!("Second factor disabled");
        Ok(())
    }

    /// Login-time check. A no-op for identities without 2FA.
    pub async fn verify(&self, identity: &Identity, code: Option<&str>) -> Result<(), ServiceError> {
        if !identity.second_factor_enabled {
            return Ok(());
        }

        let code = match code.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return Err(ServiceError::MissingCode),
        };

        let secret = self
            .store
            .find_secret(identity.identity_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(identity_id = %identity.identity_id, "2FA enabled without a stored secret");
                ServiceError::MisconfiguredSecret
            })?;

        if self.check(&secret.totp_secret, &identity.username, code)? {
            Ok(())
        } else {
            Err(ServiceError::InvalidCode)
        }
    }

    fn check(&self, secret: &str, account: &str, code: &str) -> Result<bool, ServiceError> {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        let totp = self.totp(secret, account)?;
        totp.check_current(&code)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("System clock error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CapabilitySet, Role};
    use crate::services::MemoryStore;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn identity() -> Identity {
        Identity::new(
            "carol".into(),
            "carol@example.com".into(),
            "hash".into(),
            Role::User,
            &CapabilitySet::new(),
        )
    }

    #[tokio::test]
    async fn enable_requires_setup_first() {
        let store = Arc::new(MemoryStore::new());
        let service = SecondFactorService::new(store, "Risk Register".into());
        let err = service.enable(&identity(), "123456").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotSetUp));
    }

    #[tokio::test]
    async fn setup_returns_provisioning_uri() {
        let store = Arc::new(MemoryStore::new());
        let service = SecondFactorService::new(store, "Risk Register".into());
        let enrollment = service.setup(&identity()).await.unwrap();

        assert!(enrollment.qr_code_url.starts_with("otpauth://totp/"));
        assert!(enrollment.qr_code_url.contains(&enrollment.secret));
    }

    #[tokio::test]
    async fn window_accepts_one_step_of_skew() {
        let store = Arc::new(MemoryStore::new());
        let service = SecondFactorService::new(store, "Risk Register".into());
        let id = identity();
        let enrollment = service.setup(&id).await.unwrap();
        let totp = service.totp(&enrollment.secret, &id.username).unwrap();

        let previous = totp.generate(now() - STEP_SECONDS);
        assert!(service.check(&enrollment.secret, &id.username, &previous).unwrap());

        let stale = totp.generate(now() - 4 * STEP_SECONDS);
        assert!(!service.check(&enrollment.secret, &id.username, &stale).unwrap());
        assert!(!service.check(&enrollment.secret, &id.username, "12ab56").unwrap());
    }
}
