//! In-process store for tests and local runs without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ApprovalRequest, Identity, RiskEvent, SecondFactorSecret, Session};
use crate::services::sequence::{self, REQUEST_SCOPE};
use crate::services::store::{
    ApprovalEffect, ApprovalStore, DecisionCommit, IdentityStore, ProposedRequest,
    SecondFactorStore, SessionStore, Store,
};
use crate::services::ServiceError;

#[derive(Debug, Clone, Default)]
struct State {
    identities: HashMap<Uuid, Identity>,
    secrets: HashMap<Uuid, SecondFactorSecret>,
    sessions: HashMap<Uuid, Session>,
    requests: HashMap<String, ApprovalRequest>,
    records: HashMap<String, RiskEvent>,
    counters: HashMap<String, i64>,
}

impl State {
    fn next_number<'a>(&mut self, scope: &str, existing: impl Iterator<Item = &'a str>) -> i64 {
        let seed = sequence::highest_used(existing, scope);
        let counter = self.counters.entry(scope.to_string()).or_insert(seed);
        *counter += 1;
        *counter
    }

    fn allocate_request_id(&mut self) -> String {
        let ids: Vec<String> = self.requests.keys().cloned().collect();
        let n = self.next_number(REQUEST_SCOPE, ids.iter().map(String::as_str));
        sequence::format_id(REQUEST_SCOPE, n)
    }

    fn allocate_record_id(&mut self, scope: &str) -> String {
        let ids: Vec<String> = self.records.keys().cloned().collect();
        let n = self.next_number(scope, ids.iter().map(String::as_str));
        sequence::format_id(scope, n)
    }

    fn apply(
        &mut self,
        effect: ApprovalEffect,
        decided_at: DateTime<Utc>,
    ) -> Result<Option<String>, ServiceError> {
        match effect {
            ApprovalEffect::None => Ok(None),
            ApprovalEffect::Create { scope, record } => {
                let incident_id = self.allocate_record_id(&scope);
                let event = record
                    .into_record(incident_id.clone())
                    .map_err(ServiceError::ApplyFailed)?;
                self.records.insert(incident_id.clone(), event);
                Ok(Some(incident_id))
            }
            ApprovalEffect::Edit { target, patch } => {
                let event = self.records.get_mut(&target).ok_or_else(|| {
                    ServiceError::ApplyFailed(format!("risk event {} not found", target))
                })?;
                event.apply_patch(&patch, decided_at);
                Ok(Some(target))
            }
            ApprovalEffect::Delete { target } => {
                self.records.remove(&target);
                Ok(Some(target))
            }
        }
    }
}

/// Newest first; equal timestamps fall back to the numeric suffix.
fn newest_first(mut requests: Vec<ApprovalRequest>) -> Vec<ApprovalRequest> {
    requests.sort_by(|a, b| {
        let an = sequence::parse_suffix(&a.request_id, REQUEST_SCOPE).unwrap_or(0);
        let bn = sequence::parse_suffix(&b.request_id, REQUEST_SCOPE).unwrap_or(0);
        b.created_utc.cmp(&a.created_utc).then(bn.cmp(&an))
    });
    requests
}

/// All operations take one async lock, so each is atomic with respect to the
/// others. Decisions are applied to a copy that replaces the state only
/// after every step has succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record directly, bypassing approval. Test fixtures only.
    pub async fn seed_risk_event(&self, event: RiskEvent) {
        self.state
            .lock()
            .await
            .records
            .insert(event.incident_id.clone(), event);
    }

    pub async fn risk_event_count(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, ServiceError> {
        let state = self.state.lock().await;
        let by_username = state.identities.values().find(|i| i.username == login);
        Ok(by_username
            .or_else(|| {
                state
                    .identities
                    .values()
                    .find(|i| i.email.eq_ignore_ascii_case(login))
            })
            .cloned())
    }

    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .values()
            .find(|i| i.username == username)
            .cloned())
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, ServiceError> {
        Ok(self.state.lock().await.identities.get(&identity_id).cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        let taken = state.identities.values().any(|i| {
            i.identity_id == identity.identity_id
                || i.username == identity.username
                || i.email == identity.email
        });
        if taken {
            return Err(ServiceError::Conflict(
                "username or email already registered".to_string(),
            ));
        }
        state
            .identities
            .insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, ServiceError> {
        let mut state = self.state.lock().await;
        let referenced = state.requests.values().any(|r| {
            r.requester_id == identity_id || r.assessor_id == Some(identity_id)
        });
        if referenced {
            return Err(ServiceError::Conflict(
                "identity is referenced by approval requests".to_string(),
            ));
        }
        if state.identities.remove(&identity_id).is_none() {
            return Ok(false);
        }
        state.secrets.remove(&identity_id);
        state.sessions.retain(|_, s| s.identity_id != identity_id);
        Ok(true)
    }
}

#[async_trait]
impl SecondFactorStore for MemoryStore {
    async fn upsert_secret(&self, secret: &SecondFactorSecret) -> Result<(), ServiceError> {
        self.state
            .lock()
            .await
            .secrets
            .insert(secret.identity_id, secret.clone());
        Ok(())
    }

    async fn find_secret(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<SecondFactorSecret>, ServiceError> {
        Ok(self.state.lock().await.secrets.get(&identity_id).cloned())
    }

    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if let Some(identity) = state.identities.get_mut(&identity_id) {
            identity.second_factor_enabled = enabled;
            identity.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn disable_second_factor(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if let Some(identity) = state.identities.get_mut(&identity_id) {
            identity.second_factor_enabled = false;
            identity.updated_utc = Utc::now();
        }
        state.secrets.remove(&identity_id);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if state
            .sessions
            .values()
            .any(|s| s.refresh_token_hash == session.refresh_token_hash)
        {
            return Err(ServiceError::Conflict("refresh credential collision".to_string()));
        }
        state.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.state.lock().await.sessions.get(&session_id).cloned())
    }

    async fn find_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == refresh_token_hash)
            .cloned())
    }

    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.identity_id == identity_id && s.is_valid())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active_utc.cmp(&a.last_active_utc));
        Ok(sessions)
    }

    async fn revoke_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.identity_id == identity_id => {
                session.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            if !session.revoked {
                session.last_active_utc = at;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn create_request(
        &self,
        proposed: ProposedRequest,
    ) -> Result<ApprovalRequest, ServiceError> {
        let mut state = self.state.lock().await;
        let request = ApprovalRequest::new(
            state.allocate_request_id(),
            proposed.action,
            proposed.target_incident_id,
            proposed.payload,
            proposed.requester_id,
            proposed.note,
        );
        state
            .requests
            .insert(request.request_id.clone(), request.clone());
        Ok(request)
    }

    async fn find_request(
        &self,
        request_id: &str,
    ) -> Result<Option<ApprovalRequest>, ServiceError> {
        Ok(self.state.lock().await.requests.get(request_id).cloned())
    }

    async fn list_pending_requests(&self) -> Result<Vec<ApprovalRequest>, ServiceError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .requests
                .values()
                .filter(|r| r.is_pending())
                .cloned()
                .collect(),
        ))
    }

    async fn list_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<ApprovalRequest>, ServiceError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .requests
                .values()
                .filter(|r| r.requester_id == requester_id)
                .cloned()
                .collect(),
        ))
    }

    async fn find_risk_event(&self, incident_id: &str) -> Result<Option<RiskEvent>, ServiceError> {
        Ok(self.state.lock().await.records.get(incident_id).cloned())
    }

    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<ApprovalRequest, ServiceError> {
        let mut state = self.state.lock().await;

        let current = state
            .requests
            .get(&commit.request_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Request {}", commit.request_id)))?;
        if !current.is_pending() {
            return Err(ServiceError::AlreadyProcessed(commit.request_id));
        }

        let mut working = state.clone();
        let target = working.apply(commit.effect, commit.decided_at)?;

        let request = working
            .requests
            .get_mut(&commit.request_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Request {}", commit.request_id)))?;
        request.status = commit.decision.resulting_status();
        request.assessor_id = Some(commit.assessor_id);
        request.assessed_utc = Some(commit.decided_at);
        if target.is_some() {
            request.target_incident_id = target;
        }
        let decided = request.clone();

        *state = working;
        Ok(decided)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
