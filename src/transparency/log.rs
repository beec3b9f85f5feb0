//! Activity counters with optional on-disk persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Counters for the current run.
#[derive(Debug)]
pub struct ActivityLog {
    /// Orientation readings processed
    samples_processed: AtomicU64,
    /// Readings discarded because no session was active
    samples_discarded: AtomicU64,
    /// Wheelies detected
    wheelies_detected: AtomicU64,
    /// Sessions closed
    sessions_completed: AtomicU64,
    /// Measurements the store accepted
    measurements_saved: AtomicU64,
    /// When this log started counting
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            samples_processed: AtomicU64::new(0),
            samples_discarded: AtomicU64::new(0),
            wheelies_detected: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            measurements_saved: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!(error = %e, "could not load previous activity stats");
        }

        log
    }

    pub fn record_sample(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_sample(&self) {
        self.samples_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wheelie(&self) {
        self.wheelies_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_measurements_saved(&self, count: u64) {
        self.measurements_saved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
            wheelies_detected: self.wheelies_detected.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            measurements_saved: self.measurements_saved.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Activity:\n\
             - Readings processed: {}\n\
             - Readings discarded (no active session): {}\n\
             - Wheelies detected: {}\n\
             - Sessions completed: {}\n\
             - Measurements saved: {}\n\
             - Running for: {} seconds",
            stats.samples_processed,
            stats.samples_discarded,
            stats.wheelies_detected,
            stats.sessions_completed,
            stats.measurements_saved,
            stats.uptime_secs
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
                samples_processed: stats.samples_processed,
                samples_discarded: stats.samples_discarded,
                wheelies_detected: stats.wheelies_detected,
                sessions_completed: stats.sessions_completed,
                measurements_saved: stats.measurements_saved,
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

                self.samples_processed
                    .store(persisted.samples_processed, Ordering::Relaxed);
                self.samples_discarded
                    .store(persisted.samples_discarded, Ordering::Relaxed);
                self.wheelies_detected
                    .store(persisted.wheelies_detected, Ordering::Relaxed);
                self.sessions_completed
                    .store(persisted.sessions_completed, Ordering::Relaxed);
                self.measurements_saved
                    .store(persisted.measurements_saved, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.samples_processed.store(0, Ordering::Relaxed);
        self.samples_discarded.store(0, Ordering::Relaxed);
        self.wheelies_detected.store(0, Ordering::Relaxed);
        self.sessions_completed.store(0, Ordering::Relaxed);
        self.measurements_saved.store(0, Ordering::Relaxed);
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub samples_processed: u64,
    pub samples_discarded: u64,
    pub wheelies_detected: u64,
    pub sessions_completed: u64,
    pub measurements_saved: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_processed: u64,
    samples_discarded: u64,
    wheelies_detected: u64,
    sessions_completed: u64,
    measurements_saved: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}
