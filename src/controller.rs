//! The meter: one owner for calibration, detection, session and persistence.
//!
//! Every control command and every sensor reading goes through `&mut self`,
//! so no two transitions can interleave. Timers are polled, never spawned,
//! and saves are returned as owned jobs the caller awaits or spawns.

use crate::config::{Config, ConfigError};
use crate::core::{
    CalibrationStore, Classification, Clock, DetectorPhase, SessionManager, SessionRecord,
    SessionState, SystemClock, WheelieDetector, WheelieMeasurement,
};
use crate::core::normalize::normalize;
use crate::error::MeterError;
use crate::persistence::{PersistenceGate, SaveJob, SessionStore};
use crate::sensor::{FeedError, OrientationEvent, SensorFeed, SensorSender};
use crate::transparency::{create_shared_log, SharedActivityLog};
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Reading {
    normalized: f64,
    corrected: f64,
    /// Sensor timestamp; the only time the detector sees
    sampled_at: DateTime<Utc>,
    /// Meter clock on arrival; used for calibration freshness
    received_at: DateTime<Utc>,
}

/// What a closed session hands back.
pub struct ClosedSession {
    pub record: SessionRecord,
    /// Submission of the record to the store
    pub save: Result<SaveJob<()>, MeterError>,
}

/// Read-only view for display.
#[derive(Debug, Clone, Serialize)]
pub struct MeterStatus {
    pub session_state: SessionState,
    pub session_id: Uuid,
    pub session_name: Option<String>,
    pub elapsed_secs: u64,
    pub detector_phase: DetectorPhase,
    /// Latest corrected angle, if any reading arrived
    pub current_angle: Option<f64>,
    pub classification: Classification,
    /// Seconds into the wheelie in progress
    pub wheelie_secs: Option<f64>,
    pub measurement_count: usize,
    pub unsaved: bool,
    pub calibration_offset: f64,
}

/// Wheelie meter for a single rider and a single active session.
pub struct WheelieMeter {
    config: Config,
    calibration: CalibrationStore,
    detector: WheelieDetector,
    session: SessionManager,
    gate: PersistenceGate,
    feed: SensorFeed,
    clock: Arc<dyn Clock>,
    activity: SharedActivityLog,
    latest: Option<Reading>,
}

impl WheelieMeter {
    /// Create a meter using the system clock.
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Result<Self, ConfigError> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let timezone = config.session.tz()?;

        Ok(Self {
            calibration: CalibrationStore::new(),
            detector: WheelieDetector::new(&config.detection),
            session: SessionManager::new(config.session.tick_interval, timezone),
            gate: PersistenceGate::new(store, timezone),
            feed: SensorFeed::new(config.sensor.queue_capacity),
            clock,
            activity: create_shared_log(),
            latest: None,
            config,
        })
    }

    /// Replace the activity log, e.g. with a persistent one.
    pub fn with_activity_log(mut self, log: SharedActivityLog) -> Self {
        self.activity = log;
        self
    }

    /// Hand out the sensor callback. Succeeds once per meter.
    pub fn sensor_sender(&mut self) -> Result<SensorSender, FeedError> {
        self.feed.register()
    }

    /// Process one orientation reading to completion.
    ///
    /// Returns the measurement this reading completed, if any.
    pub fn handle_event(&mut self, event: OrientationEvent) -> Option<WheelieMeasurement> {
        let normalized = normalize(event.beta);
        let corrected = self.calibration.apply(normalized);
        self.latest = Some(Reading {
            normalized,
            corrected,
            sampled_at: event.timestamp,
            received_at: self.clock.now(),
        });
        self.activity.record_sample();

        if !self.session.is_active() {
            self.activity.record_discarded_sample();
            return None;
        }

        let measurement = self.detector.process(corrected, event.timestamp)?;
        self.activity.record_wheelie();
        self.session.append(measurement.clone());
        Some(measurement)
    }

    /// Drain and process every queued reading.
    pub fn pump(&mut self) -> Vec<WheelieMeasurement> {
        let mut completed = Vec::new();
        while let Some(event) = self.feed.try_recv() {
            if let Some(m) = self.handle_event(event) {
                completed.push(m);
            }
        }
        completed
    }

    /// Fire due timers. Returns the elapsed session seconds when the session
    /// tick fired.
    ///
    /// The session tick follows the meter clock. The detector cooldown only
    /// advances to the timestamp of the latest processed reading.
    pub fn poll(&mut self) -> Option<u64> {
        if let Some(reading) = self.latest {
            self.detector.poll(reading.sampled_at);
        }
        self.session.tick(self.clock.now())
    }

    /// Take the current corrected angle as the new offset.
    ///
    /// On a fresh meter this is the raw level reading. Recalibrating with an
    /// offset already set replaces it with the angle as currently corrected.
    /// Never waits: with no reading received within the configured age the
    /// call fails and nothing changes.
    pub fn calibrate(&mut self) -> Result<f64, MeterError> {
        self.pump();

        let now = self.clock.now();
        let max_age = Duration::from_std(self.config.calibration.max_reading_age)
            .unwrap_or_else(|_| Duration::milliseconds(100));
        let reading = self
            .latest
            .filter(|r| now - r.received_at <= max_age)
            .ok_or(MeterError::NoSensorData)?;

        let offset = self.calibration.calibrate(reading.corrected);
        self.session.mark_calibrated();
        self.latest = Some(Reading {
            corrected: self.calibration.apply(reading.normalized),
            ..reading
        });
        Ok(offset)
    }

    /// Start a session for `user_id`.
    ///
    /// Preconditions are checked before the store is asked for the day's
    /// session count; any failure leaves the meter unchanged.
    pub async fn start_session(&mut self, user_id: &str) -> Result<Uuid, MeterError> {
        match self.session.state() {
            SessionState::NotCalibrated => return Err(MeterError::NotCalibrated),
            SessionState::Active => return Err(MeterError::SessionAlreadyActive),
            SessionState::Calibrated => {}
        }
        if user_id.trim().is_empty() {
            return Err(MeterError::Unauthenticated);
        }

        let date = self.session.local_date(self.clock.now());
        let sessions_today = self.gate.count_sessions_today(user_id, date).await?;

        let id = self
            .session
            .start_session(user_id, sessions_today, self.clock.now())?;
        self.detector.reset();
        Ok(id)
    }

    /// Close the active session, if any, and prepare saving its record.
    ///
    /// A wheelie still in progress is discarded. The measurement buffer stays
    /// available for [`save_measurements`](Self::save_measurements).
    pub fn end_session(&mut self) -> Option<ClosedSession> {
        let now = self.clock.now();
        let record = self.session.end_session(now)?;

        if self.detector.phase() == DetectorPhase::Active {
            warn!("session ended during a wheelie, discarding it");
        }
        self.detector.reset();
        self.activity.record_session_completed();

        let save = self.gate.save_session(&record);
        Some(ClosedSession { record, save })
    }

    /// Prepare saving the buffered measurements of the current or last
    /// session. The buffer itself is never modified by saving.
    ///
    /// An empty buffer is reported before a missing user.
    pub fn save_measurements(&self) -> Result<SaveJob<usize>, MeterError> {
        if self.session.measurements().is_empty() {
            return Err(MeterError::EmptyMeasurementSet);
        }
        let user_id = self.session.user_id().ok_or(MeterError::Unauthenticated)?;
        let session_name = self.session.session_name().unwrap_or_default();
        let job = self
            .gate
            .save_measurements(user_id, self.session.measurements(), session_name)?;

        let activity = Arc::clone(&self.activity);
        Ok(job
            .map(move |result| {
                if let Ok(saved) = result {
                    activity.record_measurements_saved(saved as u64);
                }
                result
            })
            .boxed())
    }

    /// Caller-side flag: the current buffer has been stored.
    pub fn mark_measurements_saved(&mut self) {
        self.session.mark_saved();
    }

    pub fn has_unsaved_measurements(&self) -> bool {
        self.session.has_unsaved()
    }

    /// Back to an uncalibrated meter with no session data.
    pub fn reset(&mut self) {
        self.calibration.reset();
        self.detector.reset();
        self.session.reset();
        if let Some(reading) = self.latest.as_mut() {
            reading.corrected = reading.normalized;
        }
        debug!(session_id = %self.session.session_id(), "meter reset");
    }

    pub fn status(&self) -> MeterStatus {
        let current_angle = self.latest.map(|r| r.corrected);

        MeterStatus {
            session_state: self.session.state(),
            session_id: self.session.session_id(),
            session_name: self.session.session_name().map(str::to_string),
            elapsed_secs: self.session.elapsed_secs(),
            detector_phase: self.detector.phase(),
            current_angle,
            classification: self.detector.classify(current_angle.unwrap_or(0.0)),
            wheelie_secs: self
                .latest
                .and_then(|r| self.detector.live_duration(r.sampled_at)),
            measurement_count: self.session.measurements().len(),
            unsaved: self.session.has_unsaved(),
            calibration_offset: self.calibration.offset(),
        }
    }

    pub fn measurements(&self) -> &[WheelieMeasurement] {
        self.session.measurements()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn activity(&self) -> &SharedActivityLog {
        &self.activity
    }

    /// Readings dropped because the sensor queue was full.
    pub fn dropped_readings(&self) -> u64 {
        self.feed.dropped()
    }
}
