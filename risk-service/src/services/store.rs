//! Persistence seams. `Database` implements them on PostgreSQL and
//! `MemoryStore` in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ApprovalAction, ApprovalRequest, Decision, Identity, NewRiskEvent, RiskEvent, RiskEventPatch,
    SecondFactorSecret, Session,
};
use crate::services::ServiceError;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Matches `login` against username or email.
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, ServiceError>;

    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, ServiceError>;

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, ServiceError>;

    /// Fails with `Conflict` if the username or email is taken.
    async fn insert_identity(&self, identity: &Identity) -> Result<(), ServiceError>;

    /// Removes the identity with its sessions and second-factor secret.
    /// Fails with `Conflict` while any approval request references it.
    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait SecondFactorStore: Send + Sync {
    /// Replaces any previous secret.
    async fn upsert_secret(&self, secret: &SecondFactorSecret) -> Result<(), ServiceError>;

    async fn find_secret(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<SecondFactorSecret>, ServiceError>;

    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        enabled: bool,
    ) -> Result<(), ServiceError>;

    /// Clears the flag and deletes the secret together.
    async fn disable_second_factor(&self, identity_id: Uuid) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError>;

    async fn find_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, ServiceError>;

    /// Non-revoked, unexpired sessions, most recently active first.
    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError>;

    /// Returns false when the session does not exist or belongs to someone else.
    async fn revoke_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError>;

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError>;
}

/// A pending request before it has an identifier.
#[derive(Debug, Clone)]
pub struct ProposedRequest {
    pub action: ApprovalAction,
    pub target_incident_id: Option<String>,
    pub payload: RiskEventPatch,
    pub requester_id: Uuid,
    pub note: Option<String>,
}

/// What an approval does to the risk event table.
#[derive(Debug, Clone)]
pub enum ApprovalEffect {
    None,
    Create {
        /// Counter scope for the new identifier, e.g. `INC-2024`.
        scope: String,
        record: NewRiskEvent,
    },
    Edit {
        target: String,
        patch: RiskEventPatch,
    },
    Delete {
        target: String,
    },
}

/// A decision and its effect, committed as one unit.
#[derive(Debug, Clone)]
pub struct DecisionCommit {
    pub request_id: String,
    pub assessor_id: Uuid,
    pub decision: Decision,
    pub effect: ApprovalEffect,
    pub decided_at: DateTime<Utc>,
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Allocates the next `REQ-NNN` and stores the request as pending.
    async fn create_request(&self, proposed: ProposedRequest)
        -> Result<ApprovalRequest, ServiceError>;

    async fn find_request(&self, request_id: &str)
        -> Result<Option<ApprovalRequest>, ServiceError>;

    /// Newest first.
    async fn list_pending_requests(&self) -> Result<Vec<ApprovalRequest>, ServiceError>;

    /// Newest first, any status.
    async fn list_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<ApprovalRequest>, ServiceError>;

    async fn find_risk_event(&self, incident_id: &str) -> Result<Option<RiskEvent>, ServiceError>;

    /// Re-checks that the request is still pending, applies the effect and
    /// records the decision. Nothing is persisted unless all of it succeeds.
    async fn commit_decision(&self, commit: DecisionCommit)
        -> Result<ApprovalRequest, ServiceError>;
}

#[async_trait]
pub trait Store: IdentityStore + SecondFactorStore + SessionStore + ApprovalStore {
    async fn health_check(&self) -> Result<(), ServiceError>;
}
