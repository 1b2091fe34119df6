//! Clipper Guard - service binary library
//!
//! Wires the core guard and the HTTP surface together and hosts the CLI.

mod app;
pub mod cli;

pub use app::{AppHandle, create_app};
pub use clipper_guard_core::{Config, init_tracing};

// Re-export for convenience
pub use clipper_guard_api;
pub use clipper_guard_core;
