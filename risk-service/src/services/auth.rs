use metrics::counter;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ClientMeta, Identity};
use crate::services::{
    JwtService, SecondFactorService, ServiceError, SessionRegistry, Store, TokenResponse,
};
use crate::utils::{dummy_hash, verify_password, Password, PasswordHashString};

/// Identity resolved from a validated access token, plus the session the
/// token was minted for. Passed explicitly to everything downstream.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    pub session_id: Uuid,
}

/// Login form contents.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    /// Username or email.
    pub login: String,
    pub password: Password,
    pub otp: Option<String>,
    pub meta: ClientMeta,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    jwt: JwtService,
    sessions: SessionRegistry,
    second_factor: SecondFactorService,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtService,
        sessions: SessionRegistry,
        second_factor: SecondFactorService,
    ) -> Self {
        Self {
            store,
            jwt,
            sessions,
            second_factor,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn second_factor(&self) -> &SecondFactorService {
        &self.second_factor
    }

    /// Password check. Unknown identifiers and wrong passwords fail the same way.
    pub async fn verify_credentials(
        &self,
        login: &str,
        password: &Password,
    ) -> Result<Identity, ServiceError> {
        let identity = match self.store.find_identity_by_login(login).await? {
            Some(identity) => identity,
            None => {
                if let Some(hash) = dummy_hash() {
                    let _ = verify_password(password, hash);
                }
                return Err(ServiceError::InvalidCredentials);
            }
        };

        verify_password(
            password,
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        if !identity.is_active {
            return Err(ServiceError::InactiveAccount);
        }

        Ok(identity)
    }

    #[tracing::instrument(skip(self, attempt), fields(ip = ?attempt.meta.ip_address))]
    pub async fn login(&self, attempt: LoginAttempt) -> Result<TokenResponse, ServiceError> {
        let result = self.try_login(attempt).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        counter!("login_attempts_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_login(&self, attempt: LoginAttempt) -> Result<TokenResponse, ServiceError> {
        let identity = self
            .verify_credentials(&attempt.login, &attempt.password)
            .await
            .inspect_err(|e| tracing::warn!(reason = e.code(), "Login rejected"))?;

        self.second_factor
            .verify(&identity, attempt.otp.as_deref())
            .await
            .inspect_err(|e| {
                tracing::warn!(identity_id = %identity.identity_id, reason = e.code(), "Second factor rejected")
            })?;

        let issued = self
            .sessions
            .create(identity.identity_id, attempt.meta)
            .await?;
        let access_token = self
            .jwt
            .generate_access_token(&identity.username, issued.session.session_id)?;

        tracing::info!(identity_id = %identity.identity_id, "Login succeeded");

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_token: Some(issued.refresh_token),
        })
    }

    /// Validates the token, then re-resolves its session so revoked or
    /// expired sessions stop authorising requests immediately.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, ServiceError> {
        let claims = self.jwt.validate_access_token(token)?;

        let session = self.sessions.resolve(claims.sid).await.inspect_err(|_| {
            tracing::warn!(session_id = %claims.sid, "Token presented for dead session")
        })?;

        let identity = self
            .store
            .find_identity(session.identity_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if identity.username != claims.sub {
            tracing::warn!(session_id = %claims.sid, "Token subject does not own its session");
            return Err(ServiceError::InvalidToken);
        }
        if !identity.is_active {
            return Err(ServiceError::InvalidToken);
        }

        self.sessions.touch(session.session_id).await;

        Ok(AuthContext {
            identity,
            session_id: session.session_id,
        })
    }

    /// New access token for the session holding `refresh_token`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ServiceError> {
        let session = self.sessions.resolve_refresh_token(refresh_token).await?;

        let identity = self
            .store
            .find_identity(session.identity_id)
            .await?
            .filter(|i| i.is_active)
            .ok_or(ServiceError::SessionRevoked)?;

        let access_token = self
            .jwt
            .generate_access_token(&identity.username, session.session_id)?;
        self.sessions.touch(session.session_id).await;

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_token: None,
        })
    }

    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), ServiceError> {
        self.sessions
            .revoke(ctx.identity.identity_id, ctx.session_id)
            .await
    }
}
