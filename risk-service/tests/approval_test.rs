mod common;

use axum::http::StatusCode;
use chrono::{Datelike, NaiveDate, Utc};
use common::{create_payload, TestApp};
use risk_service::config::ApprovalPolicy;
use risk_service::models::{RiskEvent, Role};
use serde_json::json;

const CREATE: &str = "risk_event.create";
const APPROVE: &str = "risk_event.approve";
const READ: &str = "risk_event.read";

fn seeded_event(incident_id: &str) -> RiskEvent {
    RiskEvent {
        incident_id: incident_id.to_string(),
        report_title: "Badge reader offline".to_string(),
        client_code: "ACME".to_string(),
        risk_description: "Side door badge reader failed open".to_string(),
        severity: "medium".to_string(),
        impact: Some("Unauthorised entry possible".to_string()),
        action_taken: None,
        follow_up_plan: None,
        additional_notes: None,
        images: vec![],
        status: "Published".to_string(),
        event_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        event_time: "09:15".to_string(),
        maker: "seed".to_string(),
        approver: "seed".to_string(),
        created_by_id: None,
        approved_by_id: None,
        created_utc: Utc::now(),
        updated_utc: None,
        resolved_utc: None,
    }
}

/// Maker alice, checker bob, reader carol.
async fn maker_checker_app(forbid_self_approval: bool) -> (TestApp, String, String, String) {
    let app = TestApp::with_config(common::test_config(forbid_self_approval));
    app.create_identity("alice", Role::User, &[CREATE]).await;
    app.create_identity("bob", Role::Admin, &[APPROVE, READ]).await;
    app.create_identity("carol", Role::User, &[READ]).await;
    let alice = app.login("alice").await.access;
    let bob = app.login("bob").await.access;
    let carol = app.login("carol").await.access;
    (app, alice, bob, carol)
}

#[tokio::test]
async fn create_flows_from_proposal_to_published_record() {
    let (app, alice, bob, carol) = maker_checker_app(true).await;

    let (status, request) = app
        .post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;
    assert_eq!(status, StatusCode::OK, "{request}");
    assert_eq!(request["request_id"], "REQ-001");
    assert_eq!(request["status"], "pending");
    assert_eq!(request["action"], "create");
    assert_eq!(request["payload"]["reportTitle"], "Server room flooding");
    assert!(request["target_incident_id"].is_null());

    let (status, pending) = app.get("/api/v1/risk-events/approvals/pending", &bob).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Request approved successfully");
    assert_eq!(body["request"]["status"], "approved");

    let incident_id = format!("INC-{}-001", Utc::now().year());
    assert_eq!(body["request"]["target_incident_id"], incident_id.as_str());

    let (status, record) = app
        .get(&format!("/api/v1/risk-events/records/{}", incident_id), &carol)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "Published");
    assert_eq!(record["maker"], "alice");
    assert_eq!(record["approver"], "bob");
    assert_eq!(record["severity"], "high");
    assert_eq!(record["event_date"], "2025-03-14");
    assert_eq!(record["images"][0], "https://files.example.com/flood.jpg");
    assert_eq!(record["event_time"].as_str().unwrap().len(), 5);

    let (_, pending) = app.get("/api/v1/risk-events/approvals/pending", &bob).await;
    assert!(pending.as_array().unwrap().is_empty());

    let (_, mine) = app.get("/api/v1/risk-events/requests/mine", &alice).await;
    assert_eq!(mine[0]["status"], "approved");
}

#[tokio::test]
async fn second_decision_is_already_processed() {
    let (app, alice, bob, _) = maker_checker_app(true).await;
    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;

    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    for action in ["approve", "reject"] {
        let (status, body) = app
            .post(
                &format!("/api/v1/risk-events/approvals/REQ-001/{}", action),
                &bob,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "already_processed");
    }

    assert_eq!(app.store.risk_event_count().await, 1);
}

#[tokio::test]
async fn reject_leaves_records_untouched() {
    let (app, alice, bob, _) = maker_checker_app(true).await;
    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;

    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/reject", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request rejected successfully");
    assert_eq!(body["request"]["status"], "rejected");
    assert!(body["request"]["assessor_id"].is_string());
    assert_eq!(app.store.risk_event_count().await, 0);
}

#[tokio::test]
async fn edit_changes_only_the_proposed_fields() {
    let (app, alice, bob, carol) = maker_checker_app(true).await;
    app.store.seed_risk_event(seeded_event("INC-2025-001")).await;

    let (status, body) = app
        .post(
            "/api/v1/risk-events/request",
            &alice,
            Some(json!({
                "action": "edit",
                "targetId": "INC-2025-001",
                "payload": { "severity": "critical", "title": "Badge reader failed open" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, record) = app
        .get("/api/v1/risk-events/records/INC-2025-001", &carol)
        .await;
    assert_eq!(record["severity"], "critical");
    assert_eq!(record["report_title"], "Badge reader failed open");
    assert_eq!(record["client_code"], "ACME");
    assert_eq!(record["impact"], "Unauthorised entry possible");
    assert!(record["updated_utc"].is_string());
}

#[tokio::test]
async fn delete_removes_the_target() {
    let (app, alice, bob, carol) = maker_checker_app(true).await;
    app.store.seed_risk_event(seeded_event("INC-2025-001")).await;

    let (status, request) = app
        .post(
            "/api/v1/risk-events/request",
            &alice,
            Some(json!({
                "action": "delete",
                "targetId": "INC-2025-001",
                "payload": { "reportTitle": "ignored" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["payload"], json!({}));

    app.post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;

    let (status, _) = app
        .get("/api/v1/risk-events/records/INC-2025-001", &carol)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_apply_rolls_the_decision_back() {
    let (app, alice, bob, _) = maker_checker_app(true).await;
    app.store.seed_risk_event(seeded_event("INC-2025-001")).await;

    let edit = json!({
        "action": "edit",
        "targetId": "INC-2025-001",
        "payload": { "severity": "low" }
    });
    let delete = json!({ "action": "delete", "targetId": "INC-2025-001" });
    app.post("/api/v1/risk-events/request", &alice, Some(edit)).await;
    app.post("/api/v1/risk-events/request", &alice, Some(delete)).await;

    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-002/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Target is gone, so the edit cannot apply
    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "apply_failed");
    assert!(body["details"].as_str().unwrap().contains("INC-2025-001"));

    let (_, pending) = app.get("/api/v1/risk-events/approvals/pending", &bob).await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["request_id"], "REQ-001");
    assert!(pending[0]["assessor_id"].is_null());

    // Rejecting it is still possible
    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/reject", &bob, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn self_approval_follows_policy_flag() {
    let (app, _, _, _) = maker_checker_app(true).await;
    app.create_identity("dana", Role::Admin, &[CREATE, APPROVE]).await;
    let dana = app.login("dana").await.access;
    app.post("/api/v1/risk-events/request", &dana, Some(create_payload()))
        .await;

    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &dana, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "self_approval_forbidden");

    let (app, _, _, _) = maker_checker_app(false).await;
    app.create_identity("dana", Role::Admin, &[CREATE, APPROVE]).await;
    let dana = app.login("dana").await.access;
    app.post("/api/v1/risk-events/request", &dana, Some(create_payload()))
        .await;

    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &dana, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn capabilities_gate_every_step() {
    let (app, alice, bob, carol) = maker_checker_app(true).await;
    app.create_identity("admin-no-caps", Role::Admin, &[]).await;
    let empty = app.login("admin-no-caps").await.access;

    let (status, body) = app
        .post("/api/v1/risk-events/request", &empty, Some(create_payload()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = app
        .post("/api/v1/risk-events/request", &bob, Some(create_payload()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;

    let (status, _) = app.get("/api/v1/risk-events/approvals/pending", &alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &carol, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get("/api/v1/risk-events/records/INC-2025-001", &alice)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn superadmin_needs_no_explicit_grants() {
    let (app, alice, _, _) = maker_checker_app(true).await;
    app.create_identity("root", Role::Superadmin, &[]).await;
    let root = app.login("root").await.access;

    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;
    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &root, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn decide_rejects_unknown_request_and_action() {
    let (app, alice, bob, _) = maker_checker_app(true).await;

    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-999/approve", &bob, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;
    let (status, _) = app
        .post("/api/v1/risk-events/approvals/REQ-001/escalate", &bob, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn capability_is_checked_before_the_action_word() {
    let (app, alice, _, carol) = maker_checker_app(true).await;
    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;

    let (status, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/archive", &carol, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn proposals_are_validated_per_action() {
    let (app, alice, _, _) = maker_checker_app(true).await;

    let cases = [
        // create without required fields
        (
            json!({ "action": "create", "payload": { "reportTitle": "x" } }),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        // create must not name a target
        (
            {
                let mut p = create_payload();
                p["targetId"] = json!("INC-2025-001");
                p
            },
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        // edit without a target
        (
            json!({ "action": "edit", "payload": { "severity": "low" } }),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        // edit of a record that does not exist
        (
            json!({ "action": "edit", "targetId": "INC-2025-404", "payload": { "severity": "low" } }),
            StatusCode::NOT_FOUND,
        ),
        // unknown payload field
        (
            json!({ "action": "create", "payload": { "colour": "red" } }),
            StatusCode::BAD_REQUEST,
        ),
        // unknown severity
        (
            json!({ "action": "edit", "targetId": "INC-2025-001", "payload": { "severity": "apocalyptic" } }),
            StatusCode::BAD_REQUEST,
        ),
        // unknown action
        (
            json!({ "action": "archive", "targetId": "INC-2025-001" }),
            StatusCode::BAD_REQUEST,
        ),
    ];

    for (body, expected) in cases {
        let (status, res) = app
            .post("/api/v1/risk-events/request", &alice, Some(body.clone()))
            .await;
        assert_eq!(status, expected, "{body} -> {res}");
    }

    let (_, mine) = app.get("/api/v1/risk-events/requests/mine", &alice).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn custom_record_prefix_is_used() {
    let mut config = common::test_config(true);
    config.approvals = ApprovalPolicy {
        forbid_self_approval: true,
        record_prefix: "RSK".to_string(),
    };
    let app = TestApp::with_config(config);
    app.create_identity("alice", Role::User, &[CREATE]).await;
    app.create_identity("bob", Role::User, &[APPROVE]).await;
    let alice = app.login("alice").await.access;
    let bob = app.login("bob").await.access;

    app.post("/api/v1/risk-events/request", &alice, Some(create_payload()))
        .await;
    let (_, body) = app
        .post("/api/v1/risk-events/approvals/REQ-001/approve", &bob, None)
        .await;
    assert_eq!(
        body["request"]["target_incident_id"],
        format!("RSK-{}-001", Utc::now().year()).as_str()
    );
}
