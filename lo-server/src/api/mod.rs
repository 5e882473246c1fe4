//! HTTP API handlers for lo-server

pub mod health;
pub mod sessions;
pub mod sse;
pub mod state;

pub use health::health_routes;
pub use sessions::{close_session, create_session, post_events};
pub use sse::published_stream;
pub use state::{get_activity, get_state, get_stats, list_keys};
