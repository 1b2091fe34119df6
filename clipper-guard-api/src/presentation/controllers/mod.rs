//! HTTP controllers

pub mod admin;
pub mod decision;
pub mod health;

pub use admin::{abuse_stats, list_bans, unban_ip};
pub use decision::check_request;
pub use health::{health_check, liveness, metrics, readiness};
