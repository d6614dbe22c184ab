use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub notification_type: String, // "ACCESS_REVOKED", "ACCESS_REINSTATED", "KILL_SWITCH_ADMIN_ALERT"
    pub title: String,
    pub message: String,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotificationData {
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<JsonValue>,
}

impl Notification {
    pub async fn create(pool: &PgPool, data: CreateNotificationData) -> Result<Self, sqlx::Error> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, tenant_id, notification_type, title, message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.tenant_id)
        .bind(data.notification_type)
        .bind(data.title)
        .bind(data.message)
        .bind(data.metadata)
        .fetch_one(pool)
        .await?;

        Ok(notification)
    }
}
