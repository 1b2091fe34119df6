//! Clipper Guard Core - rate limiting and abuse detection for the Clipper platform
//!
//! This crate holds everything the HTTP layer and the operator CLI share:
//!
//! # Modules
//!
//! - [`config`] - Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] - Policies, tiers, subjects and ban records
//! - [`application`] - The request guard pipeline and the admin control surface
//! - [`infrastructure`] - Quota/ban stores, rate limiter, abuse detector, fallback circuit
//! - [`logging`] - Structured logging with tracing
//!
//! # Architecture
//!
//! ```text
//! clipper-guard-core/
//! ├── domain/           # Policy table, tiers, ban records
//! ├── application/      # RequestGuard, AdminService
//! ├── infrastructure/
//! │   ├── quota_store/  # Redis + in-memory stores
//! │   ├── rate_limiter/ # CheckAndConsume
//! │   ├── abuse/        # RecordAndEvaluate, IsBanned
//! │   ├── resilience    # Primary/fallback store circuit
//! │   └── whitelist     # Static IP/CIDR exemptions
//! └── config/           # Configuration management
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! use clipper_guard_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `CLIPPER_GUARD__` prefix with double underscore separators:
//!
//! ```bash
//! CLIPPER_GUARD__SERVER__PORT=8081
//! CLIPPER_GUARD__ABUSE__THRESHOLD=1000
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
