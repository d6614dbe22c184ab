use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{auth::require_api_key, state::AppState};
use crate::error::{AppError, Result};
use crate::models::{
    kill_switch_event::{EventFilter, EventStatus, TriggerReason},
    AccessRevocation, KillSwitchEvent,
};
use crate::services::kill_switch::{
    BlockStatus, EventDetail, KillSwitchParams, KillSwitchResult, KillSwitchService, Page,
    Pagination, ReinstateParams,
};

// Request types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<EventStatus>,
    pub reason: Option<TriggerReason>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListEventsQuery {
    fn into_parts(self) -> (EventFilter, Pagination) {
        let filter = EventFilter {
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            status: self.status,
            reason: self.reason,
            from: self.from,
            to: self.to,
        };
        (filter, Pagination::new(self.page, self.limit))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Triggers the kill switch and waits for every action family to settle
async fn execute(
    State(service): State<KillSwitchService>,
    Json(params): Json<KillSwitchParams>,
) -> Result<Json<KillSwitchResult>> {
    require_non_empty("triggeredBy", &params.triggered_by)?;

    let result = service.execute(params).await?;
    Ok(Json(result))
}

async fn reinstate(
    State(service): State<KillSwitchService>,
    Json(params): Json<ReinstateParams>,
) -> Result<StatusCode> {
    require_non_empty("userId", &params.user_id)?;
    require_non_empty("reinstatedBy", &params.reinstated_by)?;
    require_non_empty("reason", &params.reason)?;

    service.reinstate_access(params).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_events(
    State(service): State<KillSwitchService>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Page<KillSwitchEvent>>> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::Validation("from must not be after to".to_string()));
        }
    }

    let (filter, pagination) = query.into_parts();
    let page = service.list_events(&filter, pagination).await?;
    Ok(Json(page))
}

async fn get_event(
    State(service): State<KillSwitchService>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventDetail>> {
    let detail = service
        .get_event(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kill switch event {} not found", id)))?;
    Ok(Json(detail))
}

async fn access_status(
    State(service): State<KillSwitchService>,
    Path(user_id): Path<String>,
) -> Result<Json<BlockStatus>> {
    let status = service.is_access_blocked(&user_id).await?;
    Ok(Json(status))
}

async fn revocation_history(
    State(service): State<KillSwitchService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AccessRevocation>>> {
    let history = service.get_revocation_history(&user_id).await?;
    Ok(Json(history))
}

/// Admin routes, all behind the API key check
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/kill-switch", post(execute))
        .route("/api/kill-switch/reinstate", post(reinstate))
        .route("/api/kill-switch/events", get(list_events))
        .route("/api/kill-switch/events/:id", get(get_event))
        .route("/api/kill-switch/users/:user_id/blocked", get(access_status))
        .route(
            "/api/kill-switch/users/:user_id/revocations",
            get(revocation_history),
        )
        .route_layer(middleware::from_fn_with_state(state, require_api_key))
}
