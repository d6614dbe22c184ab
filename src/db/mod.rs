use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod store;

pub use store::{KillSwitchStore, PgKillSwitchStore, StoreError};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    // Pool waits count against the kill switch execution target
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
