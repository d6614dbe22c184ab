use axum::extract::FromRef;

use crate::services::kill_switch::KillSwitchService;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub service: KillSwitchService,
    pub config: crate::config::Config,
}

impl FromRef<AppState> for KillSwitchService {
    fn from_ref(state: &AppState) -> KillSwitchService {
        state.service.clone()
    }
}
