// Background jobs

pub mod stale_events;

pub use stale_events::{reap_stale_events, start_scheduler};
