//! Risk event model - the record type guarded by maker-checker approval.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Status assigned to records created through an approved request.
pub const PUBLISHED: &str = "Published";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Stored risk event.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct RiskEvent {
    pub incident_id: String,
    pub report_title: String,
    pub client_code: String,
    pub risk_description: String,
    pub severity: String,
    pub impact: Option<String>,
    pub action_taken: Option<String>,
    pub follow_up_plan: Option<String>,
    pub additional_notes: Option<String>,
    pub images: Vec<String>,
    pub status: String,
    pub event_date: NaiveDate,
    pub event_time: String,
    pub maker: String,
    pub approver: String,
    pub created_by_id: Option<Uuid>,
    pub approved_by_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: Option<DateTime<Utc>>,
    pub resolved_utc: Option<DateTime<Utc>>,
}

impl RiskEvent {
    /// Overwrites only the fields present in `patch`.
    pub fn apply_patch(&mut self, patch: &RiskEventPatch, now: DateTime<Utc>) {
        if let Some(v) = &patch.report_title {
            self.report_title = v.clone();
        }
        if let Some(v) = &patch.client_code {
            self.client_code = v.clone();
        }
        if let Some(v) = &patch.risk_description {
            self.risk_description = v.clone();
        }
        if let Some(v) = patch.severity {
            self.severity = v.as_str().to_string();
        }
        if let Some(v) = &patch.impact {
            self.impact = Some(v.clone());
        }
        if let Some(v) = &patch.action_taken {
            self.action_taken = Some(v.clone());
        }
        if let Some(v) = &patch.follow_up_plan {
            self.follow_up_plan = Some(v.clone());
        }
        if let Some(v) = &patch.additional_notes {
            self.additional_notes = Some(v.clone());
        }
        if let Some(v) = &patch.images {
            self.images = v.clone();
        }
        if let Some(v) = patch.date {
            self.event_date = v;
        }
        self.updated_utc = Some(now);
    }
}

/// Proposed field values. Every field is optional so the same shape serves
/// as a full snapshot for `create` and as a partial update for `edit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RiskEventPatch {
    #[serde(alias = "title", default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub report_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50))]
    pub client_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 10000))]
    pub risk_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10000))]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10000))]
    pub action_taken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10000))]
    pub follow_up_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10000))]
    pub additional_notes: Option<String>,
    /// Opaque content URLs from the upload service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 20))]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date: Option<NaiveDate>,
}

impl RiskEventPatch {
    pub fn is_empty(&self) -> bool {
        *self == RiskEventPatch::default()
    }

    /// Fields a new record cannot be created without.
    pub fn missing_for_create(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.report_title.is_none() {
            missing.push("reportTitle");
        }
        if self.client_code.is_none() {
            missing.push("clientCode");
        }
        if self.risk_description.is_none() {
            missing.push("riskDescription");
        }
        if self.severity.is_none() {
            missing.push("severity");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        missing
    }
}

/// Everything needed to materialise a record except its identifier, which the
/// store allocates inside the decision transaction.
#[derive(Debug, Clone)]
pub struct NewRiskEvent {
    pub patch: RiskEventPatch,
    pub maker: String,
    pub approver: String,
    pub created_by_id: Uuid,
    pub approved_by_id: Uuid,
    pub approved_at: DateTime<Utc>,
}

impl NewRiskEvent {
    pub fn into_record(self, incident_id: String) -> Result<RiskEvent, String> {
        let missing = self.patch.missing_for_create();
        if !missing.is_empty() {
            return Err(format!("payload is missing {}", missing.join(", ")));
        }
        let p = self.patch;

        Ok(RiskEvent {
            incident_id,
            report_title: p.report_title.unwrap_or_default(),
            client_code: p.client_code.unwrap_or_default(),
            risk_description: p.risk_description.unwrap_or_default(),
            severity: p.severity.unwrap_or(Severity::Low).as_str().to_string(),
            impact: p.impact,
            action_taken: p.action_taken,
            follow_up_plan: p.follow_up_plan,
            additional_notes: p.additional_notes,
            images: p.images.unwrap_or_default(),
            status: PUBLISHED.to_string(),
            event_date: p.date.unwrap_or_else(|| self.approved_at.date_naive()),
            event_time: self.approved_at.format("%H:%M").to_string(),
            maker: self.maker,
            approver: self.approver,
            created_by_id: Some(self.created_by_id),
            approved_by_id: Some(self.approved_by_id),
            created_utc: self.approved_at,
            updated_utc: None,
            resolved_utc: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_patch() -> RiskEventPatch {
        serde_json::from_value(serde_json::json!({
            "title": "Server room flood",
            "clientCode": "ACME",
            "riskDescription": "Water ingress",
            "severity": "high",
            "date": "2024-01-01",
            "images": ["/uploads/a.png"]
        }))
        .unwrap()
    }

    #[test]
    fn patch_accepts_title_alias_and_rejects_unknown_fields() {
        let patch = full_patch();
        assert_eq!(patch.report_title.as_deref(), Some("Server room flood"));
        assert!(patch.missing_for_create().is_empty());

        let err = serde_json::from_value::<RiskEventPatch>(serde_json::json!({
            "reportTitle": "x",
            "owner": "mallory"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn patch_rejects_unknown_severity_and_bad_date() {
        assert!(serde_json::from_value::<RiskEventPatch>(serde_json::json!({"severity": "dire"})).is_err());
        assert!(serde_json::from_value::<RiskEventPatch>(serde_json::json!({"date": "01/02/2024"})).is_err());
    }

    #[test]
    fn empty_title_fails_validation() {
        let patch = RiskEventPatch {
            report_title: Some(String::new()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn new_record_is_published_with_audit_names() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 0).unwrap();
        let record = NewRiskEvent {
            patch: full_patch(),
            maker: "alice".into(),
            approver: "bob".into(),
            created_by_id: Uuid::new_v4(),
            approved_by_id: Uuid::new_v4(),
            approved_at: at,
        }
        .into_record("INC-2024-001".into())
        .unwrap();

        assert_eq!(record.status, PUBLISHED);
        assert_eq!(record.maker, "alice");
        assert_eq!(record.approver, "bob");
        assert_eq!(record.event_time, "09:05");
        assert_eq!(record.severity, "high");
    }

    #[test]
    fn incomplete_snapshot_cannot_become_a_record() {
        let err = NewRiskEvent {
            patch: RiskEventPatch {
                report_title: Some("x".into()),
                ..Default::default()
            },
            maker: "alice".into(),
            approver: "bob".into(),
            created_by_id: Uuid::new_v4(),
            approved_by_id: Uuid::new_v4(),
            approved_at: Utc::now(),
        }
        .into_record("INC-2024-001".into())
        .unwrap_err();
        assert!(err.contains("clientCode"));
    }

    #[test]
    fn apply_patch_changes_only_present_fields() {
        let mut record = NewRiskEvent {
            patch: full_patch(),
            maker: "alice".into(),
            approver: "bob".into(),
            created_by_id: Uuid::new_v4(),
            approved_by_id: Uuid::new_v4(),
            approved_at: Utc::now(),
        }
        .into_record("INC-2024-001".into())
        .unwrap();
        let before = record.clone();

        record.apply_patch(
            &RiskEventPatch {
                severity: Some(Severity::Critical),
                ..Default::default()
            },
            Utc::now(),
        );

        assert_eq!(record.severity, "critical");
        assert_eq!(record.report_title, before.report_title);
        assert_eq!(record.images, before.images);
        assert!(record.updated_utc.is_some());
    }
}
