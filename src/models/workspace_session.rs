use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};

pub const STATUS_RUNNING: &str = "RUNNING";
pub const STATUS_TERMINATED: &str = "TERMINATED";

/// A remote-workspace session owned by the surrounding platform.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSession {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub status: String, // "PROVISIONING", "RUNNING", "PAUSED", "TERMINATED"
    pub config: Option<JsonValue>, // JSONB blob; carries "podId"
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkspaceSession {
    /// Pod identifier embedded in the session configuration, if any
    pub fn pod_id(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|config| config.get("podId"))
            .and_then(JsonValue::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let session = sqlx::query_as::<_, WorkspaceSession>(
            r#"
            SELECT * FROM workspace_sessions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    pub async fn list_running_by_tenant(
        pool: &PgPool,
        tenant_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sessions = sqlx::query_as::<_, WorkspaceSession>(
            r#"
            SELECT * FROM workspace_sessions
            WHERE tenant_id = $1 AND status = 'RUNNING'
            ORDER BY started_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(sessions)
    }

    pub async fn list_running_by_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sessions = sqlx::query_as::<_, WorkspaceSession>(
            r#"
            SELECT * FROM workspace_sessions
            WHERE user_id = $1 AND status = 'RUNNING'
            ORDER BY started_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(sessions)
    }

    /// Every running session on the platform (pod scope scans these)
    pub async fn list_running(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sessions = sqlx::query_as::<_, WorkspaceSession>(
            r#"
            SELECT * FROM workspace_sessions
            WHERE status = 'RUNNING'
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(sessions)
    }

    /// Marks the session TERMINATED. An existing end timestamp is kept.
    pub async fn mark_terminated(
        pool: &PgPool,
        id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE workspace_sessions
            SET status = 'TERMINATED',
                ended_at = COALESCE(ended_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }
}
