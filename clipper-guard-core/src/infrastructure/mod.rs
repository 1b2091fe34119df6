//! Infrastructure: stores, limiter, detector and their shared plumbing

pub mod abuse;
pub mod clock;
pub mod metrics;
pub mod quota_store;
pub mod rate_limiter;
pub mod resilience;
pub mod whitelist;

pub use abuse::AbuseDetector;
pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{GuardMetrics, MetricsSnapshot};
pub use quota_store::{BanStore, GuardStore, QuotaStore, StoreError};
pub use rate_limiter::RateLimiterService;
pub use resilience::{CircuitState, StoreCircuit};
pub use whitelist::Whitelist;
