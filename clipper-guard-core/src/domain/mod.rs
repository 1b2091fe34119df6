//! Domain model: tiers, policies, subjects and ban records

pub mod ban;
pub mod policy;

pub use ban::{AbuseStats, BanRecord, millis_to_datetime};
pub use policy::{Policy, PolicyTable, Subject, Tier, UnknownTier};
