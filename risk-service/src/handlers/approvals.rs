//! Maker-checker endpoints over risk events.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::approval::{DecisionResponse, ProposeRequest},
    middleware::AuthUser,
    models::{capability::RISK_EVENT_APPROVE, ApprovalRequestResponse, Decision},
    services::{PermissionGate, Proposal},
    utils::ValidatedJson,
    AppState,
};

/// Propose a create, edit or delete of a risk event
#[utoipa::path(
    post,
    path = "/api/v1/risk-events/request",
    request_body = ProposeRequest,
    responses(
        (status = 200, description = "Request created", body = ApprovalRequestResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse),
        (status = 403, description = "Missing risk_event.create", body = ErrorResponse),
        (status = 404, description = "Edit target not found", body = ErrorResponse),
        (status = 422, description = "Payload invalid for the action", body = ErrorResponse)
    ),
    tag = "Approvals",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ProposeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .approvals
        .propose(
            &user.0.identity,
            Proposal {
                action: req.action,
                target_id: req.target_incident_id,
                payload: req.payload,
                note: req.note,
            },
        )
        .await?;
    Ok((StatusCode::OK, Json(ApprovalRequestResponse::from(request))))
}

/// Pending requests awaiting a checker
#[utoipa::path(
    get,
    path = "/api/v1/risk-events/approvals/pending",
    responses(
        (status = 200, description = "Pending requests, newest first", body = [ApprovalRequestResponse]),
        (status = 403, description = "Missing risk_event.approve", body = ErrorResponse)
    ),
    tag = "Approvals",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let requests = state.approvals.list_pending(&user.0.identity).await?;
    Ok(Json(
        requests
            .into_iter()
            .map(ApprovalRequestResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Requests raised by the caller
#[utoipa::path(
    get,
    path = "/api/v1/risk-events/requests/mine",
    responses(
        (status = 200, description = "Caller's requests, newest first", body = [ApprovalRequestResponse])
    ),
    tag = "Approvals",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_mine(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let requests = state.approvals.list_mine(&user.0.identity).await?;
    Ok(Json(
        requests
            .into_iter()
            .map(ApprovalRequestResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Approve or reject a pending request
#[utoipa::path(
    post,
    path = "/api/v1/risk-events/approvals/{request_id}/{action}",
    params(
        ("request_id" = String, Path, description = "Request id, e.g. REQ-001"),
        ("action" = String, Path, description = "approve or reject")
    ),
    responses(
        (status = 200, description = "Decision recorded", body = DecisionResponse),
        (status = 400, description = "Already processed or unknown action", body = ErrorResponse),
        (status = 403, description = "Missing risk_event.approve or self-approval", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
        (status = 500, description = "Approved change failed to apply", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Approvals",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn decide(
    State(state): State<AppState>,
    user: AuthUser,
    Path((request_id, action)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    // Unauthorised callers learn nothing about the route's vocabulary
    PermissionGate::check(&user.0.identity, RISK_EVENT_APPROVE)?;

    let decision: Decision = action
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;

    let outcome = state
        .approvals
        .decide(&user.0.identity, &request_id, decision)
        .await?;

    Ok(Json(DecisionResponse {
        message: outcome.message,
        request: outcome.request.into(),
    }))
}

/// Fetch one published risk event
#[utoipa::path(
    get,
    path = "/api/v1/risk-events/records/{incident_id}",
    params(
        ("incident_id" = String, Path, description = "Incident id, e.g. INC-2025-001")
    ),
    responses(
        (status = 200, description = "Risk event", body = RiskEvent),
        (status = 403, description = "Missing risk_event.read", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Approvals",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_risk_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(incident_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .approvals
        .get_record(&user.0.identity, &incident_id)
        .await?;
    Ok(Json(event))
}
