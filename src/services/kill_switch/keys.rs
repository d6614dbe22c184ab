//! Fast-path cache keys touched by the kill switch.

use std::time::Duration;

pub const BLOCK_ENTRY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const REVOKED_FLAG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Block entry consulted by `is_access_blocked`
pub fn blocked(user_id: &str) -> String {
    format!("kill_switch:blocked:{}", user_id)
}

/// Defense-in-depth flag independent of the revocation table
pub fn revoked_flag(user_id: &str) -> String {
    format!("kill_switch:revoked:{}", user_id)
}

pub fn session(session_id: &str) -> String {
    format!("session:{}", session_id)
}

pub fn session_scoped(session_id: &str) -> String {
    format!("session:{}:*", session_id)
}

pub fn user_scoped(user_id: &str) -> String {
    format!("user:{}:*", user_id)
}

pub fn user_sessions(user_id: &str) -> String {
    format!("user_sessions:{}", user_id)
}

pub fn session_tokens(user_id: &str) -> String {
    format!("session_token:{}:*", user_id)
}

/// Every pattern purged for the given sessions and users
pub fn purge_patterns<'a>(
    session_ids: impl IntoIterator<Item = &'a str>,
    user_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut patterns = Vec::new();
    for session_id in session_ids {
        patterns.push(session(session_id));
        patterns.push(session_scoped(session_id));
    }
    for user_id in user_ids {
        patterns.push(user_scoped(user_id));
        patterns.push(user_sessions(user_id));
        patterns.push(session_tokens(user_id));
    }
    patterns
}
