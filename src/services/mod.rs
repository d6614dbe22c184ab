// Services module - Business logic and collaborator clients

pub mod cache;
pub mod edge_cache;
pub mod kill_switch;
pub mod redis_cache;
pub mod session_transport;
pub mod workspace_provider;
