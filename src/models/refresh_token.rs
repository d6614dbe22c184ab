use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Long-lived credentials issued by the identity system. Only revocation is
/// performed here.
pub struct RefreshToken;

impl RefreshToken {
    /// Revokes every non-revoked token for the user, returning how many changed
    pub async fn revoke_all_for_user(
        pool: &PgPool,
        user_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(revoked_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
