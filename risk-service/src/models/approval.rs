//! Approval request model - maker-checker proposals for risk events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::risk_event::RiskEventPatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Create,
    Edit,
    Delete,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Create => "create",
            ApprovalAction::Edit => "edit",
            ApprovalAction::Delete => "delete",
        }
    }
}

/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Checker's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    pub fn resulting_status(&self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// Stored approval request.
#[derive(Debug, Clone, FromRow)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub action: ApprovalAction,
    pub status: ApprovalStatus,
    pub payload: Json<RiskEventPatch>,
    pub target_incident_id: Option<String>,
    pub requester_id: Uuid,
    pub assessor_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub assessed_utc: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        request_id: String,
        action: ApprovalAction,
        target_incident_id: Option<String>,
        payload: RiskEventPatch,
        requester_id: Uuid,
        note: Option<String>,
    ) -> Self {
        Self {
            request_id,
            action,
            status: ApprovalStatus::Pending,
            payload: Json(payload),
            target_incident_id,
            requester_id,
            assessor_id: None,
            note,
            created_utc: Utc::now(),
            assessed_utc: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// Approval request as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRequestResponse {
    pub request_id: String,
    pub action: ApprovalAction,
    pub status: ApprovalStatus,
    pub payload: RiskEventPatch,
    pub target_incident_id: Option<String>,
    pub requester_id: Uuid,
    pub assessor_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub assessed_utc: Option<DateTime<Utc>>,
}

impl From<ApprovalRequest> for ApprovalRequestResponse {
    fn from(r: ApprovalRequest) -> Self {
        Self {
            request_id: r.request_id,
            action: r.action,
            status: r.status,
            payload: r.payload.0,
            target_incident_id: r.target_incident_id,
            requester_id: r.requester_id,
            assessor_id: r.assessor_id,
            note: r.note,
            created_utc: r.created_utc,
            assessed_utc: r.assessed_utc,
        }
    }
}
