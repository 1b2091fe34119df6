//! Abuse Detection
//!
//! Counts every non-exempt request per IP over a long window (1h by default)
//! and issues a fixed-length ban once the threshold is passed.

pub mod detector;

pub use detector::AbuseDetector;
