use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{ApprovalAction, ApprovalRequestResponse, RiskEventPatch};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProposeRequest {
    pub action: ApprovalAction,
    /// Incident id of the record to edit or delete.
    #[serde(default, alias = "targetId")]
    #[schema(example = "INC-2025-001")]
    pub target_incident_id: Option<String>,
    #[serde(default)]
    pub payload: RiskEventPatch,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionResponse {
    #[schema(example = "Request approved successfully")]
    pub message: String,
    pub request: ApprovalRequestResponse,
}
