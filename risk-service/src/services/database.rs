//! PostgreSQL store for risk-service.
//!
//! Uses runtime-checked sqlx queries against the schema in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{ApprovalRequest, Identity, RiskEvent, SecondFactorSecret, Session};
use crate::services::sequence::{self, REQUEST_SCOPE};
use crate::services::store::{
    ApprovalEffect, ApprovalStore, DecisionCommit, IdentityStore, ProposedRequest,
    SecondFactorStore, SessionStore, Store,
};
use crate::services::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Hands out the next number in `scope` from the `id_counters` row.
///
/// On first use the row is seeded from the highest identifier already present
/// in `table.column`; after that the upsert's row lock serialises callers.
async fn allocate_number(
    conn: &mut PgConnection,
    scope: &str,
    table: &str,
    column: &str,
) -> Result<i64, ServiceError> {
    // Plain prefix comparison: scopes come from configuration and may contain
    // LIKE metacharacters.
    let prefix = format!("{}-", scope);
    let prefix_len = i32::try_from(prefix.chars().count())
        .map_err(|_| ServiceError::Validation(format!("identifier scope too long: {}", scope)))?;
    let highest: Option<String> = sqlx::query_scalar(&format!(
        "SELECT {column} FROM {table} \
         WHERE left({column}, $2) = $1 AND substr({column}, $2 + 1) ~ '^[0-9]+$' \
         ORDER BY substr({column}, $2 + 1)::bigint DESC LIMIT 1"
    ))
    .bind(&prefix)
    .bind(prefix_len)
    .fetch_optional(&mut *conn)
    .await?;
    let seed = sequence::highest_used(highest.as_deref(), scope);

    let next: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO id_counters (scope, last_value)
        VALUES ($1, $2 + 1)
        ON CONFLICT (scope) DO UPDATE SET last_value = id_counters.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(scope)
    .bind(seed)
    .fetch_one(&mut *conn)
    .await?;

    Ok(next)
}

/// Store errors other than unavailability surface as `ApplyFailed`.
fn apply_failed(err: sqlx::Error) -> ServiceError {
    match ServiceError::from(err) {
        ServiceError::StoreUnavailable(cause) => ServiceError::StoreUnavailable(cause),
        other => ServiceError::ApplyFailed(other.to_string()),
    }
}

async fn apply_effect(
    conn: &mut PgConnection,
    effect: ApprovalEffect,
    decided_at: DateTime<Utc>,
) -> Result<Option<String>, ServiceError> {
    match effect {
        ApprovalEffect::None => Ok(None),
        ApprovalEffect::Create { scope, record } => {
            let n = allocate_number(conn, &scope, "risk_events", "incident_id")
                .await
                .map_err(|e| match e {
                    ServiceError::StoreUnavailable(c) => ServiceError::StoreUnavailable(c),
                    other => ServiceError::ApplyFailed(other.to_string()),
                })?;
            let incident_id = sequence::format_id(&scope, n);
            let event = record
                .into_record(incident_id.clone())
                .map_err(ServiceError::ApplyFailed)?;

            sqlx::query(
                r#"
                INSERT INTO risk_events (
                    incident_id, report_title, client_code, risk_description, severity,
                    impact, action_taken, follow_up_plan, additional_notes, images, status,
                    event_date, event_time, maker, approver, created_by_id, approved_by_id,
                    created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                "#,
            )
            .bind(&event.incident_id)
            .bind(&event.report_title)
            .bind(&event.client_code)
            .bind(&event.risk_description)
            .bind(&event.severity)
            .bind(&event.impact)
            .bind(&event.action_taken)
            .bind(&event.follow_up_plan)
            .bind(&event.additional_notes)
            .bind(&event.images)
            .bind(&event.status)
            .bind(event.event_date)
            .bind(&event.event_time)
            .bind(&event.maker)
            .bind(&event.approver)
            .bind(event.created_by_id)
            .bind(event.approved_by_id)
            .bind(event.created_utc)
            .execute(&mut *conn)
            .await
            .map_err(apply_failed)?;

            Ok(Some(incident_id))
        }
        ApprovalEffect::Edit { target, patch } => {
            let updated = sqlx::query(
                r#"
                UPDATE risk_events SET
                    report_title = COALESCE($2, report_title),
                    client_code = COALESCE($3, client_code),
                    risk_description = COALESCE($4, risk_description),
                    severity = COALESCE($5, severity),
                    impact = COALESCE($6, impact),
                    action_taken = COALESCE($7, action_taken),
                    follow_up_plan = COALESCE($8, follow_up_plan),
                    additional_notes = COALESCE($9, additional_notes),
                    images = COALESCE($10, images),
                    event_date = COALESCE($11, event_date),
                    updated_utc = $12
                WHERE incident_id = $1
                "#,
            )
            .bind(&target)
            .bind(&patch.report_title)
            .bind(&patch.client_code)
            .bind(&patch.risk_description)
            .bind(patch.severity.map(|s| s.as_str()))
            .bind(&patch.impact)
            .bind(&patch.action_taken)
            .bind(&patch.follow_up_plan)
            .bind(&patch.additional_notes)
            .bind(&patch.images)
            .bind(patch.date)
            .bind(decided_at)
            .execute(&mut *conn)
            .await
            .map_err(apply_failed)?;

            if updated.rows_affected() == 0 {
                return Err(ServiceError::ApplyFailed(format!(
                    "risk event {} not found",
                    target
                )));
            }
            Ok(Some(target))
        }
        ApprovalEffect::Delete { target } => {
            let deleted = sqlx::query("DELETE FROM risk_events WHERE incident_id = $1")
                .bind(&target)
                .execute(&mut *conn)
                .await
                .map_err(apply_failed)?;

            if deleted.rows_affected() == 0 {
                info!(incident_id = %target, "Delete target already absent");
            }
            Ok(Some(target))
        }
    }
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_identity_by_login(&self, login: &str) -> Result<Option<Identity>, ServiceError> {
        Ok(sqlx::query_as::<_, Identity>(
            r#"
            SELECT * FROM identities
            WHERE username = $1 OR lower(email) = lower($1)
            ORDER BY (username = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    #[instrument(skip(self, identity), fields(identity_id = %identity.identity_id))]
    async fn insert_identity(&self, identity: &Identity) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO identities (
                identity_id, username, email, password_hash, first_name, last_name, role,
                access, is_active, second_factor_enabled, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(identity.identity_id)
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.role)
        .bind(&identity.access)
        .bind(identity.is_active)
        .bind(identity.second_factor_enabled)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_identity(&self, identity_id: Uuid) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM approval_requests WHERE requester_id = $1 OR assessor_id = $1)",
        )
        .bind(identity_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(ServiceError::Conflict(
                "identity is referenced by approval requests".to_string(),
            ));
        }

        // Sessions and secrets cascade.
        let deleted = sqlx::query("DELETE FROM identities WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl SecondFactorStore for Database {
    async fn upsert_secret(&self, secret: &SecondFactorSecret) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO second_factor_secrets (identity_id, totp_secret, created_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT (identity_id) DO UPDATE
            SET totp_secret = EXCLUDED.totp_secret, created_utc = EXCLUDED.created_utc
            "#,
        )
        .bind(secret.identity_id)
        .bind(&secret.totp_secret)
        .bind(secret.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_secret(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<SecondFactorSecret>, ServiceError> {
        Ok(sqlx::query_as::<_, SecondFactorSecret>(
            "SELECT * FROM second_factor_secrets WHERE identity_id = $1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE identities SET second_factor_enabled = $2, updated_utc = NOW() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn disable_second_factor(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE identities SET second_factor_enabled = FALSE, updated_utc = NOW() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM second_factor_secrets WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, identity_id, refresh_token_hash, user_agent, ip_address, revoked,
                created_utc, expiry_utc, last_active_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.session_id)
        .bind(session.identity_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.revoked)
        .bind(session.created_utc)
        .bind(session.expiry_utc)
        .bind(session.last_active_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_session_by_refresh_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
                .bind(refresh_token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_active_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE identity_id = $1 AND revoked = FALSE AND expiry_utc > NOW()
            ORDER BY last_active_utc DESC
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn revoke_session(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE session_id = $1 AND identity_id = $2",
        )
        .bind(session_id)
        .bind(identity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE sessions SET last_active_utc = $2 WHERE session_id = $1 AND revoked = FALSE",
        )
        .bind(session_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ApprovalStore for Database {
    #[instrument(skip(self, proposed), fields(action = proposed.action.as_str()))]
    async fn create_request(
        &self,
        proposed: ProposedRequest,
    ) -> Result<ApprovalRequest, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let n = allocate_number(&mut *tx, REQUEST_SCOPE, "approval_requests", "request_id").await?;
        let request = ApprovalRequest::new(
            sequence::format_id(REQUEST_SCOPE, n),
            proposed.action,
            proposed.target_incident_id,
            proposed.payload,
            proposed.requester_id,
            proposed.note,
        );

        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                request_id, action, status, payload, target_incident_id, requester_id, note,
                created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&request.request_id)
        .bind(request.action)
        .bind(request.status)
        .bind(Json(&request.payload.0))
        .bind(&request.target_incident_id)
        .bind(request.requester_id)
        .bind(&request.note)
        .bind(request.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(request_id = %request.request_id, "Approval request stored");
        Ok(request)
    }

    async fn find_request(
        &self,
        request_id: &str,
    ) -> Result<Option<ApprovalRequest>, ServiceError> {
        Ok(sqlx::query_as::<_, ApprovalRequest>(
            "SELECT * FROM approval_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_pending_requests(&self) -> Result<Vec<ApprovalRequest>, ServiceError> {
        Ok(sqlx::query_as::<_, ApprovalRequest>(
            r#"
            SELECT * FROM approval_requests
            WHERE status = 'pending'
            ORDER BY created_utc DESC, length(request_id) DESC, request_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_requests_by_requester(
        &self,
        requester_id: Uuid,
    ) -> Result<Vec<ApprovalRequest>, ServiceError> {
        Ok(sqlx::query_as::<_, ApprovalRequest>(
            r#"
            SELECT * FROM approval_requests
            WHERE requester_id = $1
            ORDER BY created_utc DESC, length(request_id) DESC, request_id DESC
            "#,
        )
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_risk_event(&self, incident_id: &str) -> Result<Option<RiskEvent>, ServiceError> {
        Ok(
            sqlx::query_as::<_, RiskEvent>("SELECT * FROM risk_events WHERE incident_id = $1")
                .bind(incident_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    #[instrument(skip(self, commit), fields(request_id = %commit.request_id, decision = commit.decision.as_str()))]
    async fn commit_decision(
        &self,
        commit: DecisionCommit,
    ) -> Result<ApprovalRequest, ServiceError> {
        // Any early return drops `tx`, which rolls it back.
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, ApprovalRequest>(
            "SELECT * FROM approval_requests WHERE request_id = $1 FOR UPDATE",
        )
        .bind(&commit.request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Request {}", commit.request_id)))?;

        if !current.is_pending() {
            return Err(ServiceError::AlreadyProcessed(commit.request_id));
        }

        let target = apply_effect(&mut *tx, commit.effect, commit.decided_at).await?;

        let decided = sqlx::query_as::<_, ApprovalRequest>(
            r#"
            UPDATE approval_requests
            SET status = $2,
                assessor_id = $3,
                assessed_utc = $4,
                target_incident_id = COALESCE($5, target_incident_id)
            WHERE request_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(&commit.request_id)
        .bind(commit.decision.resulting_status())
        .bind(commit.assessor_id)
        .bind(commit.decided_at)
        .bind(target)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(decided)
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::from(e)
        })?;
        Ok(())
    }
}
