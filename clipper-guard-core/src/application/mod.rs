//! Application services

pub mod admin;
pub mod guard;

pub use admin::{AdminError, AdminService, UnbanOutcome};
pub use guard::{GuardDecision, GuardInitError, GuardRequest, RequestGuard};
