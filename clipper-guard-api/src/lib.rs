//! Clipper Guard API - HTTP surface for rate limiting and abuse detection
//!
//! - [`presentation::middleware`] - guard layers for embedding into application routers
//! - [`presentation::routes`] - the standalone service router (decision endpoint, admin, health)

pub mod presentation;

pub use presentation::middleware::{AbuseTracking, GuardState, guard_routes};
pub use presentation::routes::{AppState, create_router};
