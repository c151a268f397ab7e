//! Transfer statistics for relayed sessions

pub mod metrics;

pub use metrics::{RelayStats, StatsSnapshot};
