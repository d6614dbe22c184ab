use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::kill_switch_action::ActionType;

text_enum! {
    /// Unit of revocation.
    pub enum KillSwitchScope {
        Tenant => "TENANT",
        User => "USER",
        Pod => "POD",
        Session => "SESSION",
    }
}

text_enum! {
    pub enum TriggerReason {
        SecurityIncident => "SECURITY_INCIDENT",
        ContractTermination => "CONTRACT_TERMINATION",
        PolicyViolation => "POLICY_VIOLATION",
        SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
        DataExfiltrationAttempt => "DATA_EXFILTRATION_ATTEMPT",
        ManualRevocation => "MANUAL_REVOCATION",
    }
}

text_enum! {
    pub enum EventStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        PartialFailure => "PARTIAL_FAILURE",
        Failed => "FAILED",
    }
}

impl EventStatus {
    fn rank(&self) -> u8 {
        match self {
            EventStatus::Pending => 0,
            EventStatus::InProgress => 1,
            EventStatus::Completed | EventStatus::PartialFailure | EventStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Status only moves forward; terminal states are final.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// One failure recorded against an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventErrorEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    pub message: String,
}

impl EventErrorEntry {
    pub fn for_action(action_type: ActionType, message: impl Into<String>) -> Self {
        Self {
            action_type: Some(action_type),
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            action_type: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchEvent {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub scope: KillSwitchScope,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub pod_id: Option<String>,
    pub session_id: Option<String>,
    pub triggered_by: String,
    #[sqlx(try_from = "String")]
    pub trigger_reason: TriggerReason,
    pub trigger_details: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub sessions_terminated: i32,
    pub tokens_revoked: i32,
    pub cache_purged: bool,
    pub errors: Json<Vec<EventErrorEntry>>,
}

#[derive(Debug, Clone)]
pub struct CreateKillSwitchEventData {
    pub scope: KillSwitchScope,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub pod_id: Option<String>,
    pub session_id: Option<String>,
    pub triggered_by: String,
    pub trigger_reason: TriggerReason,
    pub trigger_details: Option<String>,
    pub initiated_at: DateTime<Utc>,
}

/// Terminal fields written in a single update.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub status: EventStatus,
    pub completed_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub sessions_terminated: i32,
    pub tokens_revoked: i32,
    pub cache_purged: bool,
    pub errors: Vec<EventErrorEntry>,
}

impl EventOutcome {
    /// Outcome used when execution aborts before the families settle.
    pub fn failed(
        completed_at: DateTime<Utc>,
        execution_time_ms: i64,
        errors: Vec<EventErrorEntry>,
    ) -> Self {
        Self {
            status: EventStatus::Failed,
            completed_at,
            execution_time_ms,
            sessions_terminated: 0,
            tokens_revoked: 0,
            cache_purged: false,
            errors,
        }
    }
}

/// Filters for the audit listing. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<EventStatus>,
    pub reason: Option<TriggerReason>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &KillSwitchEvent) -> bool {
        self.tenant_id
            .as_ref()
            .map_or(true, |t| event.tenant_id.as_ref() == Some(t))
            && self
                .user_id
                .as_ref()
                .map_or(true, |u| event.user_id.as_ref() == Some(u))
            && self.status.map_or(true, |s| event.status == s)
            && self.reason.map_or(true, |r| event.trigger_reason == r)
            && self.from.map_or(true, |from| event.initiated_at >= from)
            && self.to.map_or(true, |to| event.initiated_at <= to)
    }

    fn push_conditions(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(" WHERE TRUE");
        if let Some(tenant_id) = &self.tenant_id {
            query.push(" AND tenant_id = ").push_bind(tenant_id.clone());
        }
        if let Some(user_id) = &self.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(status) = self.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(reason) = self.reason {
            query.push(" AND trigger_reason = ").push_bind(reason.as_str());
        }
        if let Some(from) = self.from {
            query.push(" AND initiated_at >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            query.push(" AND initiated_at <= ").push_bind(to);
        }
    }
}

impl KillSwitchEvent {
    /// Inserts the event in IN_PROGRESS state
    pub async fn create(
        pool: &PgPool,
        data: CreateKillSwitchEventData,
    ) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, KillSwitchEvent>(
            r#"
            INSERT INTO kill_switch_events
                (scope, tenant_id, user_id, pod_id, session_id, triggered_by,
                 trigger_reason, trigger_details, status, initiated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'IN_PROGRESS', $9)
            RETURNING *
            "#,
        )
        .bind(data.scope.as_str())
        .bind(data.tenant_id)
        .bind(data.user_id)
        .bind(data.pod_id)
        .bind(data.session_id)
        .bind(data.triggered_by)
        .bind(data.trigger_reason.as_str())
        .bind(data.trigger_details)
        .bind(data.initiated_at)
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let event = sqlx::query_as::<_, KillSwitchEvent>(
            r#"
            SELECT * FROM kill_switch_events WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    /// Writes the terminal fields. Only applies while the row is not yet
    /// terminal, so completed_at is set exactly once.
    pub async fn complete(
        pool: &PgPool,
        id: Uuid,
        outcome: &EventOutcome,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE kill_switch_events
            SET status = $2,
                completed_at = $3,
                execution_time_ms = $4,
                sessions_terminated = $5,
                tokens_revoked = $6,
                cache_purged = $7,
                errors = $8
            WHERE id = $1
              AND status IN ('PENDING', 'IN_PROGRESS')
            "#,
        )
        .bind(id)
        .bind(outcome.status.as_str())
        .bind(outcome.completed_at)
        .bind(outcome.execution_time_ms)
        .bind(outcome.sessions_terminated)
        .bind(outcome.tokens_revoked)
        .bind(outcome.cache_purged)
        .bind(Json(&outcome.errors))
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lists events most-recent-first
    pub async fn list(
        pool: &PgPool,
        filter: &EventFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM kill_switch_events");
        filter.push_conditions(&mut query);
        query
            .push(" ORDER BY initiated_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let events = query
            .build_query_as::<KillSwitchEvent>()
            .fetch_all(pool)
            .await?;

        Ok(events)
    }

    pub async fn count(pool: &PgPool, filter: &EventFilter) -> Result<i64, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM kill_switch_events");
        filter.push_conditions(&mut query);

        let count = query
            .build_query_scalar::<i64>()
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Events still running that were initiated before the cutoff
    pub async fn find_stale(
        pool: &PgPool,
        initiated_before: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let events = sqlx::query_as::<_, KillSwitchEvent>(
            r#"
            SELECT * FROM kill_switch_events
            WHERE status IN ('PENDING', 'IN_PROGRESS')
              AND initiated_at < $1
            ORDER BY initiated_at ASC
            "#,
        )
        .bind(initiated_before)
        .fetch_all(pool)
        .await?;

        Ok(events)
    }
}
