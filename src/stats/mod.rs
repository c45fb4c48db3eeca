//! Monitor statistics.
//!
//! Counters describing what the monitor has done, persisted between runs so
//! `annadata status` can report cumulative activity.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, MonitorStats, SharedMonitorStats,
    StatsSnapshot,
};
