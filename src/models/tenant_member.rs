use sqlx::PgPool;

pub struct TenantMember;

impl TenantMember {
    /// User ids holding an ADMIN or OWNER role in the tenant
    pub async fn list_admin_user_ids(
        pool: &PgPool,
        tenant_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let user_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id FROM tenant_members
            WHERE tenant_id = $1 AND role IN ('ADMIN', 'OWNER')
            ORDER BY user_id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(user_ids)
    }
}
