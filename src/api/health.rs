use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::api::middleware::state::AppState;
use crate::config::{ClientConfig, Config};
use crate::db::KillSwitchStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Unhealthy,
    Configured,
    Disabled,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: Health,
    pub timestamp: String,
    pub version: String,
    pub dependencies: Dependencies,
}

#[derive(Debug, Serialize)]
pub struct Dependencies {
    pub database: DatabaseHealth,
    pub workspace_api: Health,
    pub realtime_gateway: Health,
    pub edge_cache_api: Health,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: Health,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness of the durable store, which every kill switch path depends on.
/// Collaborators are optional and only reported, never called.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = ping_store(state.service.store().as_ref()).await;
    let status = database.status;

    let response = HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: collaborators(&state.config, database),
    };

    if status == Health::Healthy {
        tracing::debug!(
            duration_ms = response.dependencies.database.response_time_ms,
            "Health check passed"
        );
        (StatusCode::OK, Json(response))
    } else {
        tracing::warn!(
            error = ?response.dependencies.database.error,
            "Health check failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn ping_store(store: &dyn KillSwitchStore) -> DatabaseHealth {
    let start = Instant::now();
    let result = store.ping().await;
    let response_time_ms = start.elapsed().as_millis();

    match result {
        Ok(()) => DatabaseHealth {
            status: Health::Healthy,
            response_time_ms,
            error: None,
        },
        Err(e) => DatabaseHealth {
            status: Health::Unhealthy,
            response_time_ms,
            error: Some(e.to_string()),
        },
    }
}

fn collaborators(config: &Config, database: DatabaseHealth) -> Dependencies {
    fn configured(client: &Option<ClientConfig>) -> Health {
        if client.is_some() {
            Health::Configured
        } else {
            Health::Disabled
        }
    }

    Dependencies {
        database,
        workspace_api: configured(&config.workspace_api),
        realtime_gateway: configured(&config.realtime_gateway),
        edge_cache_api: configured(&config.edge_cache_api),
    }
}
