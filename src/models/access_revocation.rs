use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Durable "this user's access is blocked" fact. Rows are never deleted;
/// reinstatement flips `is_active` and records who lifted the block.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccessRevocation {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub user_id: String,
    pub revoked_by: String,
    pub reason: String,
    pub scope: String,
    pub is_active: bool,
    pub kill_switch_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reinstated_by: Option<String>,
    pub reinstated_at: Option<DateTime<Utc>>,
    pub reinstate_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateRevocationData {
    pub tenant_id: Option<String>,
    pub user_id: String,
    pub revoked_by: String,
    pub reason: String,
    pub scope: String,
    pub kill_switch_event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ReinstateData {
    pub reinstated_by: String,
    pub reinstated_at: DateTime<Utc>,
    pub reason: String,
}

impl AccessRevocation {
    /// Active and not past its expiry at `now`
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }

    pub async fn create(pool: &PgPool, data: CreateRevocationData) -> Result<Self, sqlx::Error> {
        let revocation = sqlx::query_as::<_, AccessRevocation>(
            r#"
            INSERT INTO access_revocations
                (tenant_id, user_id, revoked_by, reason, scope, is_active,
                 kill_switch_event_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(data.user_id)
        .bind(data.revoked_by)
        .bind(data.reason)
        .bind(data.scope)
        .bind(data.kill_switch_event_id)
        .bind(data.created_at)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await?;

        Ok(revocation)
    }

    /// Most recent revocation currently in force for the user
    pub async fn find_in_force(
        pool: &PgPool,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let revocation = sqlx::query_as::<_, AccessRevocation>(
            r#"
            SELECT * FROM access_revocations
            WHERE user_id = $1
              AND is_active = TRUE
              AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(pool)
        .await?;

        Ok(revocation)
    }

    /// Deactivates every active revocation for the user, returning how many changed
    pub async fn reinstate_all(
        pool: &PgPool,
        user_id: &str,
        data: &ReinstateData,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE access_revocations
            SET is_active = FALSE,
                reinstated_by = $2,
                reinstated_at = $3,
                reinstate_reason = $4
            WHERE user_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .bind(&data.reinstated_by)
        .bind(data.reinstated_at)
        .bind(&data.reason)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        let revocations = sqlx::query_as::<_, AccessRevocation>(
            r#"
            SELECT * FROM access_revocations
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(revocations)
    }
}
