use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

text_enum! {
    /// The six independent action families run per kill switch event.
    pub enum ActionType {
        TerminateSession => "TERMINATE_SESSION",
        RevokeTokens => "REVOKE_TOKENS",
        PurgeCache => "PURGE_CACHE",
        BlockReconnection => "BLOCK_RECONNECTION",
        NotifyUser => "NOTIFY_USER",
        NotifyAdmin => "NOTIFY_ADMIN",
    }
}

text_enum! {
    pub enum ActionStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Completed => "COMPLETED",
        Failed => "FAILED",
        Skipped => "SKIPPED",
    }
}

text_enum! {
    pub enum TargetType {
        Session => "SESSION",
        User => "USER",
        Cache => "CACHE",
        Tenant => "TENANT",
        Unscoped => "NONE",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchAction {
    pub id: Uuid,
    pub kill_switch_event_id: Uuid,
    #[sqlx(try_from = "String")]
    pub action_type: ActionType,
    pub target: String,
    #[sqlx(try_from = "String")]
    pub target_type: TargetType,
    #[sqlx(try_from = "String")]
    pub status: ActionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateKillSwitchActionData {
    pub kill_switch_event_id: Uuid,
    pub action_type: ActionType,
    pub target: String,
    pub target_type: TargetType,
    pub started_at: DateTime<Utc>,
}

impl KillSwitchAction {
    /// Inserts the action in IN_PROGRESS state. (event, action_type) is unique.
    pub async fn create(
        pool: &PgPool,
        data: CreateKillSwitchActionData,
    ) -> Result<Self, sqlx::Error> {
        let action = sqlx::query_as::<_, KillSwitchAction>(
            r#"
            INSERT INTO kill_switch_actions
                (kill_switch_event_id, action_type, target, target_type, status, started_at)
            VALUES ($1, $2, $3, $4, 'IN_PROGRESS', $5)
            RETURNING *
            "#,
        )
        .bind(data.kill_switch_event_id)
        .bind(data.action_type.as_str())
        .bind(data.target)
        .bind(data.target_type.as_str())
        .bind(data.started_at)
        .fetch_one(pool)
        .await?;

        Ok(action)
    }

    pub async fn finish(
        pool: &PgPool,
        id: Uuid,
        status: ActionStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE kill_switch_actions
            SET status = $2, completed_at = $3, error_message = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error_message)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn list_by_event(pool: &PgPool, event_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let actions = sqlx::query_as::<_, KillSwitchAction>(
            r#"
            SELECT * FROM kill_switch_actions
            WHERE kill_switch_event_id = $1
            ORDER BY started_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        Ok(actions)
    }
}
