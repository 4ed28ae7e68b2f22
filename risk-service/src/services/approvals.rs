//! Maker-checker engine for risk events.
//!
//! Makers propose create/edit/delete changes; checkers approve or reject
//! them. Approval and its effect on `risk_events` commit together.

use chrono::{Datelike, Utc};
use metrics::counter;
use std::sync::Arc;
use validator::Validate;

use crate::config::ApprovalPolicy;
use crate::models::capability::{RISK_EVENT_APPROVE, RISK_EVENT_CREATE, RISK_EVENT_READ};
use crate::models::{
    ApprovalAction, ApprovalRequest, Decision, Identity, NewRiskEvent, RiskEvent, RiskEventPatch,
};
use crate::services::sequence;
use crate::services::store::{ApprovalEffect, DecisionCommit, ProposedRequest};
use crate::services::{PermissionGate, ServiceError, Store};

/// Maker name stamped when the requester no longer exists.
const UNKNOWN_MAKER: &str = "Unknown";

/// A maker's change proposal.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub action: ApprovalAction,
    pub target_id: Option<String>,
    pub payload: RiskEventPatch,
    pub note: Option<String>,
}

/// Result of a successful decision.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub request: ApprovalRequest,
    pub message: String,
}

#[derive(Clone)]
pub struct ApprovalEngine {
    store: Arc<dyn Store>,
    policy: ApprovalPolicy,
}

impl ApprovalEngine {
    pub fn new(store: Arc<dyn Store>, policy: ApprovalPolicy) -> Self {
        Self { store, policy }
    }

    #[tracing::instrument(skip(self, requester, proposal), fields(requester = %requester.identity_id, action = proposal.action.as_str()))]
    pub async fn propose(
        &self,
        requester: &Identity,
        proposal: Proposal,
    ) -> Result<ApprovalRequest, ServiceError> {
        PermissionGate::check(requester, RISK_EVENT_CREATE)?;

        let Proposal {
            action,
            target_id,
            payload,
            note,
        } = proposal;

        payload
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let target_id = target_id.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());

        let payload = match action {
            ApprovalAction::Create => {
                if target_id.is_some() {
                    return Err(ServiceError::Validation(
                        "targetId must not be set for create".to_string(),
                    ));
                }
                let missing = payload.missing_for_create();
                if !missing.is_empty() {
                    return Err(ServiceError::Validation(format!(
                        "payload is missing {}",
                        missing.join(", ")
                    )));
                }
                payload
            }
            ApprovalAction::Edit => {
                let target = target_id.as_deref().ok_or_else(|| {
                    ServiceError::Validation("targetId is required for edit".to_string())
                })?;
                if payload.is_empty() {
                    return Err(ServiceError::Validation(
                        "edit payload must change at least one field".to_string(),
                    ));
                }
                if self.store.find_risk_event(target).await?.is_none() {
                    return Err(ServiceError::NotFound(format!("Risk event {}", target)));
                }
                payload
            }
            ApprovalAction::Delete => {
                if target_id.is_none() {
                    return Err(ServiceError::Validation(
                        "targetId is required for delete".to_string(),
                    ));
                }
                RiskEventPatch::default()
            }
        };

        let request = self
            .store
            .create_request(ProposedRequest {
                action,
                target_incident_id: target_id,
                payload,
                requester_id: requester.identity_id,
                note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            })
            .await?;

        tracing::info!(request_id = %request.request_id, "Change proposed");
        Ok(request)
    }

    pub async fn list_pending(&self, viewer: &Identity) -> Result<Vec<ApprovalRequest>, ServiceError> {
        PermissionGate::check(viewer, RISK_EVENT_APPROVE)?;
        self.store.list_pending_requests().await
    }

    pub async fn list_mine(&self, requester: &Identity) -> Result<Vec<ApprovalRequest>, ServiceError> {
        self.store
            .list_requests_by_requester(requester.identity_id)
            .await
    }

    pub async fn get_record(
        &self,
        viewer: &Identity,
        incident_id: &str,
    ) -> Result<RiskEvent, ServiceError> {
        PermissionGate::check(viewer, RISK_EVENT_READ)?;
        self.store
            .find_risk_event(incident_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Risk event {}", incident_id)))
    }

    #[tracing::instrument(skip(self, assessor), fields(assessor = %assessor.identity_id, decision = decision.as_str()))]
    pub async fn decide(
        &self,
        assessor: &Identity,
        request_id: &str,
        decision: Decision,
    ) -> Result<DecisionOutcome, ServiceError> {
        PermissionGate::check(assessor, RISK_EVENT_APPROVE)?;

        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Request {}", request_id)))?;
        if !request.is_pending() {
            return Err(ServiceError::AlreadyProcessed(request.request_id));
        }

        if self.policy.forbid_self_approval && request.requester_id == assessor.identity_id {
            tracing::warn!(request_id = %request_id, "Self-approval attempt blocked");
            return Err(ServiceError::SelfApprovalForbidden);
        }

        let decided_at = Utc::now();
        let effect = match decision {
            Decision::Reject => ApprovalEffect::None,
            Decision::Approve => self.effect_of(&request, assessor, decided_at).await?,
        };

        let result = self
            .store
            .commit_decision(DecisionCommit {
                request_id: request.request_id.clone(),
                assessor_id: assessor.identity_id,
                decision,
                effect,
                decided_at,
            })
            .await;

        let request = match result {
            Ok(request) => request,
            Err(e) => {
                if let ServiceError::ApplyFailed(cause) = &e {
                    tracing::error!(request_id = %request_id, cause = %cause, "Approved change failed to apply, decision rolled back");
                }
                return Err(e);
            }
        };

        counter!("approval_decisions_total", "decision" => decision.as_str()).increment(1);
        tracing::info!(
            request_id = %request.request_id,
            target = ?request.target_incident_id,
            "Request decided"
        );

        let message = format!(
            "Request {} successfully",
            decision.resulting_status().as_str()
        );
        Ok(DecisionOutcome { request, message })
    }

    async fn effect_of(
        &self,
        request: &ApprovalRequest,
        assessor: &Identity,
        decided_at: chrono::DateTime<Utc>,
    ) -> Result<ApprovalEffect, ServiceError> {
        let action = request.action;
        let target = || {
            request.target_incident_id.clone().ok_or_else(|| {
                ServiceError::ApplyFailed(format!(
                    "{} request {} has no target",
                    action.as_str(),
                    request.request_id
                ))
            })
        };

        Ok(match action {
            ApprovalAction::Create => {
                let maker = self
                    .store
                    .find_identity(request.requester_id)
                    .await?
                    .map(|i| i.display_name().to_string())
                    .unwrap_or_else(|| UNKNOWN_MAKER.to_string());

                ApprovalEffect::Create {
                    scope: sequence::record_scope(&self.policy.record_prefix, decided_at.year()),
                    record: NewRiskEvent {
                        patch: request.payload.0.clone(),
                        maker,
                        approver: assessor.display_name().to_string(),
                        created_by_id: request.requester_id,
                        approved_by_id: assessor.identity_id,
                        approved_at: decided_at,
                    },
                }
            }
            ApprovalAction::Edit => ApprovalEffect::Edit {
                target: target()?,
                patch: request.payload.0.clone(),
            },
            ApprovalAction::Delete => ApprovalEffect::Delete { target: target()? },
        })
    }
}
