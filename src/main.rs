use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use killswitch::api::{self, middleware::state::AppState};
use killswitch::config::{ClientConfig, Config};
use killswitch::db::{self, PgKillSwitchStore};
use killswitch::jobs;
use killswitch::services::{
    edge_cache::{DisabledEdgeCache, EdgeCacheInvalidator, HttpEdgeCacheClient},
    kill_switch::KillSwitchService,
    redis_cache::RedisCache,
    session_transport::{DisabledSessionTransport, HttpSessionTransport, SessionTransport},
    workspace_provider::{DisabledWorkspaceProvider, HttpWorkspaceProvider, WorkspaceProvider},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "killswitch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting kill switch service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = RedisCache::connect(config.redis_url.expose_secret())
        .await
        .context("failed to connect to redis")?;

    let store = Arc::new(PgKillSwitchStore::new(pool));
    let service = KillSwitchService::new(
        store.clone(),
        Arc::new(cache),
        workspace_provider(config.workspace_api.as_ref())?,
        session_transport(config.realtime_gateway.as_ref())?,
        edge_cache(config.edge_cache_api.as_ref())?,
    );

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = jobs::start_scheduler(
        store,
        chrono::Duration::minutes(config.stale_event_minutes),
    )
    .await?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT")?;

    let app = api::app(AppState { service, config });

    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn workspace_provider(config: Option<&ClientConfig>) -> anyhow::Result<Arc<dyn WorkspaceProvider>> {
    let provider: Arc<dyn WorkspaceProvider> = match config {
        Some(c) => Arc::new(HttpWorkspaceProvider::new(&c.base_url, c.api_token.clone())?),
        None => {
            tracing::warn!("WORKSPACE_API_URL not set, workspace termination disabled");
            Arc::new(DisabledWorkspaceProvider)
        }
    };
    Ok(provider)
}

fn session_transport(config: Option<&ClientConfig>) -> anyhow::Result<Arc<dyn SessionTransport>> {
    let transport: Arc<dyn SessionTransport> = match config {
        Some(c) => Arc::new(HttpSessionTransport::new(&c.base_url, c.api_token.clone())?),
        None => {
            tracing::warn!("REALTIME_GATEWAY_URL not set, live session push disabled");
            Arc::new(DisabledSessionTransport)
        }
    };
    Ok(transport)
}

fn edge_cache(config: Option<&ClientConfig>) -> anyhow::Result<Arc<dyn EdgeCacheInvalidator>> {
    let invalidator: Arc<dyn EdgeCacheInvalidator> = match config {
        Some(c) => Arc::new(HttpEdgeCacheClient::new(&c.base_url, c.api_token.clone())?),
        None => {
            tracing::warn!("EDGE_CACHE_API_URL not set, edge invalidation disabled");
            Arc::new(DisabledEdgeCache)
        }
    };
    Ok(invalidator)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, cleaning up...");
}
