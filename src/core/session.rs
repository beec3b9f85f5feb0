//! Training-session lifecycle.
//!
//! ```text
//! NotCalibrated ──calibrate──▶ Calibrated ──start──▶ Active
//!       ▲                         ▲                    │
//!       │                         └───────end──────────┘
//!       └──────────── reset (from any state) ──────────┘
//! ```
//!
//! The manager owns the measurement buffer and the elapsed-time tick. It
//! never talks to storage itself; the caller resolves the day's session count
//! beforehand and hands the closing [`SessionRecord`] to the persistence gate.

use super::detector::WheelieMeasurement;
use super::timer::Ticker;
use crate::error::MeterError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    NotCalibrated,
    Calibrated,
    Active,
}

/// Summary of a closed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: String,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds counted by the session tick
    pub duration_seconds: u64,
    pub measurement_count: usize,
    /// Highest `max_angle` over the session, `0.0` when there were none
    pub max_angle: f64,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    user_id: String,
    name: String,
    started_at: DateTime<Utc>,
}

/// Owns session identity, timing and the measurement buffer.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state: SessionState,
    session_id: Uuid,
    current: Option<ActiveSession>,
    /// Name of the most recent session, kept after it ends for saving
    last_name: Option<String>,
    last_user: Option<String>,
    elapsed_secs: u64,
    measurements: Vec<WheelieMeasurement>,
    unsaved: bool,
    ticker: Ticker,
    timezone: Tz,
}

impl SessionManager {
    pub fn new(tick_interval: std::time::Duration, timezone: Tz) -> Self {
        Self {
            state: SessionState::NotCalibrated,
            session_id: Uuid::new_v4(),
            current: None,
            last_name: None,
            last_user: None,
            elapsed_secs: 0,
            measurements: Vec::new(),
            unsaved: false,
            ticker: Ticker::new(tick_interval),
            timezone,
        }
    }

    /// Record that calibration succeeded. Only lifts `NotCalibrated`.
    pub fn mark_calibrated(&mut self) {
        if self.state == SessionState::NotCalibrated {
            self.state = SessionState::Calibrated;
        }
    }

    /// Calendar day of `now` in the configured time zone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Open a session.
    ///
    /// `sessions_today` is the number of sessions the user already has on the
    /// local calendar day of `now`; the new session is named after the next
    /// ordinal.
    pub fn start_session(
        &mut self,
        user_id: &str,
        sessions_today: u32,
        now: DateTime<Utc>,
    ) -> Result<Uuid, MeterError> {
        match self.state {
            SessionState::NotCalibrated => return Err(MeterError::NotCalibrated),
            SessionState::Active => return Err(MeterError::SessionAlreadyActive),
            SessionState::Calibrated => {}
        }
        if user_id.trim().is_empty() {
            return Err(MeterError::Unauthenticated);
        }

        let name = session_name(self.local_date(now), sessions_today.saturating_add(1));
        self.session_id = Uuid::new_v4();
        self.measurements.clear();
        self.unsaved = false;
        self.elapsed_secs = 0;
        self.ticker.arm(now);
        self.last_name = Some(name.clone());
        self.last_user = Some(user_id.to_string());
        self.current = Some(ActiveSession {
            user_id: user_id.to_string(),
            name,
            started_at: now,
        });
        self.state = SessionState::Active;

        info!(session_id = %self.session_id, user_id, "session started");
        Ok(self.session_id)
    }

    /// Apply any due ticks. Returns the new elapsed seconds when at least one
    /// tick fired.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.ticker.poll(now) == 0 {
            return None;
        }
        let started_at = self.current.as_ref()?.started_at;
        self.elapsed_secs = (now - started_at).num_seconds().max(0) as u64;
        Some(self.elapsed_secs)
    }

    /// Add a measurement to the buffer. Ignored outside an active session.
    pub fn append(&mut self, measurement: WheelieMeasurement) -> bool {
        if self.state != SessionState::Active {
            debug!("measurement outside active session dropped");
            return false;
        }
        self.measurements.push(measurement);
        self.unsaved = true;
        true
    }

    /// Close the active session. `None` when no session is active.
    ///
    /// The measurement buffer is kept for a later save.
    pub fn end_session(&mut self, now: DateTime<Utc>) -> Option<SessionRecord> {
        if self.state != SessionState::Active {
            return None;
        }
        self.tick(now);
        self.ticker.cancel();

        let session = self.current.take()?;
        let record = SessionRecord {
            session_id: self.session_id,
            user_id: session.user_id,
            session_name: session.name,
            start_time: session.started_at,
            end_time: now,
            duration_seconds: self.elapsed_secs,
            measurement_count: self.measurements.len(),
            max_angle: self
                .measurements
                .iter()
                .map(|m| m.max_angle)
                .fold(0.0, f64::max),
        };
        self.state = SessionState::Calibrated;

        info!(
            session_id = %record.session_id,
            duration = record.duration_seconds,
            measurements = record.measurement_count,
            "session ended"
        );
        Some(record)
    }

    /// Back to `NotCalibrated` with an empty buffer and a fresh identifier.
    pub fn reset(&mut self) {
        self.ticker.cancel();
        self.current = None;
        self.last_name = None;
        self.last_user = None;
        self.measurements.clear();
        self.unsaved = false;
        self.elapsed_secs = 0;
        self.session_id = Uuid::new_v4();
        self.state = SessionState::NotCalibrated;
    }

    /// Caller-side "already saved" flag.
    pub fn mark_saved(&mut self) {
        self.unsaved = false;
    }

    pub fn has_unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Name of the active or most recently ended session.
    pub fn session_name(&self) -> Option<&str> {
        self.last_name.as_deref()
    }

    /// User of the active or most recently ended session.
    pub fn user_id(&self) -> Option<&str> {
        self.last_user.as_deref()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn measurements(&self) -> &[WheelieMeasurement] {
        &self.measurements
    }

    pub fn latest_measurement(&self) -> Option<&WheelieMeasurement> {
        self.measurements.last()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_armed()
    }
}

/// Human-readable session name: local date plus the day's ordinal.
pub fn session_name(date: NaiveDate, ordinal: u32) -> String {
    format!("{} #{}", date.format("%Y-%m-%d"), ordinal)
}

/// Format seconds as `HH:MM:SS`.
pub fn format_hms(seconds: u64) -> String {
    let hrs = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hrs:02}:{mins:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T22:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(secs)
    }

    fn manager() -> SessionManager {
        SessionManager::new(std::time::Duration::from_secs(1), Tz::UTC)
    }

    fn measurement(max: f64) -> WheelieMeasurement {
        WheelieMeasurement {
            max_angle: max,
            avg_angle: max / 2.0,
            duration_seconds: 1.0,
            started_at: t(0),
        }
    }

    #[test]
    fn test_start_requires_calibration() {
        let mut m = manager();
        let err = m.start_session("user-1", 0, t(0)).unwrap_err();
        assert!(matches!(err, MeterError::NotCalibrated));
        assert_eq!(m.state(), SessionState::NotCalibrated);
        assert!(m.measurements().is_empty());
        assert!(!m.is_ticking());
    }

    #[test]
    fn test_start_requires_user() {
        let mut m = manager();
        m.mark_calibrated();
        assert!(matches!(
            m.start_session("  ", 0, t(0)),
            Err(MeterError::Unauthenticated)
        ));
        assert_eq!(m.state(), SessionState::Calibrated);
    }

    #[test]
    fn test_start_names_and_identifies_session() {
        let mut m = manager();
        let before = m.session_id();
        m.mark_calibrated();

        let id = m.start_session("user-1", 2, t(0)).unwrap();
        assert_ne!(id, before);
        assert_eq!(m.state(), SessionState::Active);
        assert_eq!(m.session_name(), Some("2024-05-01 #3"));
        assert!(m.is_ticking());
    }

    #[test]
    fn test_session_name_uses_local_day() {
        let mut m = SessionManager::new(std::time::Duration::from_secs(1), chrono_tz::Europe::Warsaw);
        m.mark_calibrated();
        // 22:30 UTC is already the next day in Warsaw.
        m.start_session("user-1", 0, t(0)).unwrap();
        assert_eq!(m.session_name(), Some("2024-05-02 #1"));
    }

    #[test]
    fn test_double_start_rejected() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();
        m.append(measurement(15.0));

        assert!(matches!(
            m.start_session("user-1", 1, t(5)),
            Err(MeterError::SessionAlreadyActive)
        ));
        assert_eq!(m.measurements().len(), 1);
    }

    #[test]
    fn test_tick_tracks_elapsed_seconds() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();

        assert_eq!(m.tick(t(0) + Duration::milliseconds(400)), None);
        assert_eq!(m.tick(t(1)), Some(1));
        assert_eq!(m.tick(t(4)), Some(4));
        assert_eq!(m.elapsed_secs(), 4);
    }

    #[test]
    fn test_end_session_builds_record() {
        let mut m = manager();
        m.mark_calibrated();
        let id = m.start_session("user-1", 0, t(0)).unwrap();
        m.append(measurement(15.0));
        m.append(measurement(31.5));
        m.append(measurement(12.0));

        let record = m.end_session(t(42)).unwrap();
        assert_eq!(record.session_id, id);
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.duration_seconds, 42);
        assert_eq!(record.measurement_count, 3);
        assert_eq!(record.max_angle, 31.5);
        assert_eq!(record.start_time, t(0));
        assert_eq!(record.end_time, t(42));

        assert_eq!(m.state(), SessionState::Calibrated);
        assert!(!m.is_ticking());
        assert_eq!(m.measurements().len(), 3);
        assert_eq!(m.session_name(), Some("2024-05-01 #1"));
    }

    #[test]
    fn test_empty_session_record() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();
        let record = m.end_session(t(3)).unwrap();
        assert_eq!(record.measurement_count, 0);
        assert_eq!(record.max_angle, 0.0);
    }

    #[test]
    fn test_end_when_not_active_is_noop() {
        let mut m = manager();
        assert!(m.end_session(t(0)).is_none());
        m.mark_calibrated();
        assert!(m.end_session(t(0)).is_none());
        assert_eq!(m.state(), SessionState::Calibrated);
    }

    #[test]
    fn test_sessions_repeat_without_recalibration() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();
        m.append(measurement(15.0));
        m.end_session(t(10)).unwrap();

        m.start_session("user-1", 1, t(20)).unwrap();
        assert!(m.measurements().is_empty());
        assert_eq!(m.session_name(), Some("2024-05-01 #2"));
    }

    #[test]
    fn test_append_outside_session_ignored() {
        let mut m = manager();
        m.mark_calibrated();
        assert!(!m.append(measurement(15.0)));
        assert!(m.measurements().is_empty());
    }

    #[test]
    fn test_unsaved_flag() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();
        assert!(!m.has_unsaved());
        m.append(measurement(15.0));
        assert!(m.has_unsaved());
        m.mark_saved();
        assert!(!m.has_unsaved());
        assert_eq!(m.measurements().len(), 1);
    }

    #[test]
    fn test_reset_from_active() {
        let mut m = manager();
        m.mark_calibrated();
        let id = m.start_session("user-1", 0, t(0)).unwrap();
        m.append(measurement(15.0));

        m.reset();
        assert_eq!(m.state(), SessionState::NotCalibrated);
        assert!(m.measurements().is_empty());
        assert!(!m.is_ticking());
        assert_ne!(m.session_id(), id);
        assert_eq!(m.tick(t(100)), None);
        assert_eq!(m.elapsed_secs(), 0);
    }

    #[test]
    fn test_reset_twice_matches_once() {
        let mut m = manager();
        m.mark_calibrated();
        m.start_session("user-1", 0, t(0)).unwrap();
        m.append(measurement(15.0));

        m.reset();
        let once = (m.state(), m.measurements().len(), m.is_ticking(), m.elapsed_secs());
        m.reset();
        let twice = (m.state(), m.measurements().len(), m.is_ticking(), m.elapsed_secs());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(3725), "01:02:05");
    }
}
