//! Validation and record shapes at the persistence boundary.

use crate::core::detector::WheelieMeasurement;
use crate::core::normalize::MAX_TILT;
use crate::core::session::SessionRecord;
use crate::error::{MeterError, StoreError};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A pending save. Owns everything it needs, so it can be awaited or spawned
/// while the meter keeps processing samples.
pub type SaveJob<T> = BoxFuture<'static, Result<T, MeterError>>;

/// Stored shape of one wheelie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    pub user_id: String,
    pub session_name: String,
    /// Peak angle, kept under its historical column name
    pub angle: f64,
    pub max_angle: f64,
    pub avg_angle: f64,
    /// Seconds
    pub duration: f64,
    pub started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MeasurementRow {
    pub fn from_measurement(
        user_id: &str,
        session_name: &str,
        m: &WheelieMeasurement,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_name: session_name.to_string(),
            angle: round_to(m.max_angle, 1),
            max_angle: round_to(m.max_angle, 1),
            avg_angle: round_to(m.avg_angle, 1),
            duration: round_to(m.duration_seconds, 2),
            started_at: m.started_at,
            created_at,
        }
    }
}

/// Stored shape of a training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub user_id: String,
    pub session_id: Uuid,
    pub session_name: String,
    /// Seconds
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub measurements_count: usize,
    pub max_angle: f64,
}

impl From<&SessionRecord> for SessionRow {
    fn from(record: &SessionRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            session_id: record.session_id,
            session_name: record.session_name.clone(),
            duration: record.duration_seconds,
            start_time: record.start_time,
            end_time: record.end_time,
            measurements_count: record.measurement_count,
            max_angle: round_to(record.max_angle, 1),
        }
    }
}

/// Storage collaborator.
///
/// Implementations report failures as [`StoreError`] values and never retry.
pub trait SessionStore: Send + Sync {
    /// Insert measurement rows, returning how many were stored.
    fn insert_measurements(&self, rows: Vec<MeasurementRow>) -> BoxFuture<'_, Result<usize, StoreError>>;

    fn insert_session(&self, row: SessionRow) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Sessions of `user_id` whose start time falls in `[from, until)`.
    fn count_sessions_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<u32, StoreError>>;
}

/// Validates records and forwards them to a [`SessionStore`].
#[derive(Clone)]
pub struct PersistenceGate {
    store: Arc<dyn SessionStore>,
    timezone: Tz,
}

impl PersistenceGate {
    pub fn new(store: Arc<dyn SessionStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// Validate and prepare a measurement save.
    ///
    /// Validation failures are returned immediately; the returned job only
    /// fails with [`MeterError::Persistence`].
    pub fn save_measurements(
        &self,
        user_id: &str,
        measurements: &[WheelieMeasurement],
        session_name: &str,
    ) -> Result<SaveJob<usize>, MeterError> {
        require_user(user_id)?;
        if measurements.is_empty() {
            return Err(MeterError::EmptyMeasurementSet);
        }
        validate_measurements(measurements)?;

        let created_at = Utc::now();
        let rows: Vec<MeasurementRow> = measurements
            .iter()
            .map(|m| MeasurementRow::from_measurement(user_id, session_name, m, created_at))
            .collect();
        let store = Arc::clone(&self.store);

        Ok(async move {
            let count = rows.len();
            match store.insert_measurements(rows).await {
                Ok(stored) => {
                    info!(stored, "measurements saved");
                    Ok(stored)
                }
                Err(e) => {
                    warn!(count, error = %e, "saving measurements failed");
                    Err(MeterError::Persistence(e))
                }
            }
        }
        .boxed())
    }

    /// Validate and prepare a session save.
    pub fn save_session(&self, record: &SessionRecord) -> Result<SaveJob<()>, MeterError> {
        require_user(&record.user_id)?;
        if !in_range(record.max_angle) {
            return Err(MeterError::Validation {
                index: 0,
                max_angle: record.max_angle,
            });
        }

        let row = SessionRow::from(record);
        let store = Arc::clone(&self.store);

        Ok(async move {
            let session_id = row.session_id;
            match store.insert_session(row).await {
                Ok(()) => {
                    info!(%session_id, "session saved");
                    Ok(())
                }
                Err(e) => {
                    warn!(%session_id, error = %e, "saving session failed");
                    Err(MeterError::Persistence(e))
                }
            }
        }
        .boxed())
    }

    /// Number of sessions `user_id` already has on the local calendar day.
    pub async fn count_sessions_today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<u32, MeterError> {
        let (from, until) = day_bounds(date, self.timezone);
        self.store
            .count_sessions_between(user_id, from, until)
            .await
            .map_err(MeterError::Persistence)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Reject any measurement whose angles are outside the physical tilt range.
pub fn validate_measurements(measurements: &[WheelieMeasurement]) -> Result<(), MeterError> {
    for (index, m) in measurements.iter().enumerate() {
        if !in_range(m.max_angle) || !in_range(m.avg_angle) {
            return Err(MeterError::Validation {
                index,
                max_angle: m.max_angle,
            });
        }
    }
    Ok(())
}

fn in_range(angle: f64) -> bool {
    (0.0..=MAX_TILT).contains(&angle)
}

fn require_user(user_id: &str) -> Result<(), MeterError> {
    if user_id.trim().is_empty() {
        Err(MeterError::Unauthenticated)
    } else {
        Ok(())
    }
}

/// UTC bounds of a local calendar day.
pub(crate) fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_of = |d: NaiveDate| -> DateTime<Utc> {
        let midnight = d.and_hms_opt(0, 0, 0).unwrap_or_default();
        tz.from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    };
    let next = date.succ_opt().unwrap_or(date);
    let from = start_of(date);
    let until = if next == date {
        from + Duration::days(1)
    } else {
        start_of(next)
    };
    (from, until)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
