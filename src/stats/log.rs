//! Persistent counters for the sensor monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current and previous sessions.
#[derive(Debug)]
pub struct MonitorStats {
    /// Readings received from the source
    readings_received: AtomicU64,
    /// Full windows that were evaluated
    windows_evaluated: AtomicU64,
    /// Successful dispatches
    dispatches: AtomicU64,
    /// Windows whose deviant matched the last trigger
    unchanged: AtomicU64,
    /// Detected changes whose dispatch failed after all attempts
    failed_dispatches: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            readings_received: AtomicU64::new(0),
            windows_evaluated: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            failed_dispatches: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats backed by a JSON file, continuing from its counters.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous monitor stats: {}", e);
        }

        stats
    }

    pub fn record_reading(&self) {
        self.readings_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_evaluated(&self) {
        self.windows_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_dispatch(&self) {
        self.failed_dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            windows_evaluated: self.windows_evaluated.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed_dispatches: self.failed_dispatches.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Monitor Statistics:\n\
             - Readings received: {}\n\
             - Windows evaluated: {}\n\
             - Changes dispatched: {}\n\
             - Unchanged windows: {}\n\
             - Failed dispatches: {}\n\
             - Session duration: {} seconds",
            stats.readings_received,
            stats.windows_evaluated,
            stats.dispatches,
            stats.unchanged,
            stats.failed_dispatches,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                readings_received: stats.readings_received,
                windows_evaluated: stats.windows_evaluated,
                dispatches: stats.dispatches,
                unchanged: stats.unchanged,
                failed_dispatches: stats.failed_dispatches,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.readings_received
                    .store(persisted.readings_received, Ordering::Relaxed);
                self.windows_evaluated
                    .store(persisted.windows_evaluated, Ordering::Relaxed);
                self.dispatches
                    .store(persisted.dispatches, Ordering::Relaxed);
                self.unchanged.store(persisted.unchanged, Ordering::Relaxed);
                self.failed_dispatches
                    .store(persisted.failed_dispatches, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub readings_received: u64,
    pub windows_evaluated: u64,
    pub dispatches: u64,
    pub unchanged: u64,
    pub failed_dispatches: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    readings_received: u64,
    windows_evaluated: u64,
    dispatches: u64,
    unchanged: u64,
    failed_dispatches: u64,
    last_updated: DateTime<Utc>,
}

/// Stats shared between the monitor task and the CLI.
pub type SharedMonitorStats = Arc<MonitorStats>;

pub fn create_shared_stats() -> SharedMonitorStats {
    Arc::new(MonitorStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedMonitorStats {
    Arc::new(MonitorStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = MonitorStats::new();
        stats.record_reading();
        stats.record_reading();
        stats.record_window_evaluated();
        stats.record_dispatch();

        let snapshot = stats.stats();
        assert_eq!(snapshot.readings_received, 2);
        assert_eq!(snapshot.windows_evaluated, 1);
        assert_eq!(snapshot.dispatches, 1);
        assert_eq!(snapshot.unchanged, 0);
    }

    #[test]
    fn test_persistence_is_cumulative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_stats.json");

        let stats = MonitorStats::with_persistence(path.clone());
        stats.record_reading();
        stats.record_failed_dispatch();
        stats.save().unwrap();

        let reloaded = MonitorStats::with_persistence(path);
        reloaded.record_reading();
        let snapshot = reloaded.stats();
        assert_eq!(snapshot.readings_received, 2);
        assert_eq!(snapshot.failed_dispatches, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = MonitorStats::new().summary();
        assert!(summary.contains("Readings received"));
        assert!(summary.contains("Changes dispatched"));
    }
}
