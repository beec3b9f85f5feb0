//! Hysteresis detector turning corrected angles into wheelie measurements.
//!
//! ```text
//!            angle >= threshold
//!   Idle ───────────────────────▶ Active ──┐ angle >= threshold
//!    ▲                              │  ◀────┘ (track max, collect)
//!    │ cooldown elapsed             │ angle < threshold
//!    │                              ▼ (emit measurement)
//!    └──────────────────────── Cooldown
//! ```
//!
//! Time is taken from sample timestamps only, so irregular or bursty delivery
//! changes nothing but the timestamps the detector sees.

use super::timer::Deadline;
use crate::config::DetectionConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, warn};

/// A completed wheelie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelieMeasurement {
    /// Peak corrected angle (degrees)
    pub max_angle: f64,
    /// Mean of the corrected angles collected while active (degrees)
    pub avg_angle: f64,
    /// Time from the first active sample to the sample that ended the wheelie
    pub duration_seconds: f64,
    /// Timestamp of the first active sample
    pub started_at: DateTime<Utc>,
}

/// Externally visible detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorPhase {
    Idle,
    Active,
    /// Idle, but new wheelies are locked out until the cooldown expires
    Cooldown,
}

/// Advisory display class of a corrected angle. Does not affect detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Ready,
    Wheelie,
    Danger,
}

#[derive(Debug, Clone)]
struct Accumulator {
    start_time: DateTime<Utc>,
    running_max: f64,
    angle_samples: Vec<f64>,
}

impl Accumulator {
    fn open(angle: f64, at: DateTime<Utc>) -> Self {
        Self {
            start_time: at,
            running_max: angle,
            angle_samples: vec![angle],
        }
    }

    fn push(&mut self, angle: f64) {
        self.running_max = self.running_max.max(angle);
        self.angle_samples.push(angle);
    }

    fn close(self, at: DateTime<Utc>) -> Option<WheelieMeasurement> {
        let duration_seconds = (at - self.start_time).num_microseconds()? as f64 / 1_000_000.0;
        if duration_seconds <= 0.0 {
            return None;
        }
        let avg_angle = self.angle_samples.iter().mean().min(self.running_max);

        Some(WheelieMeasurement {
            max_angle: self.running_max,
            avg_angle,
            duration_seconds,
            started_at: self.start_time,
        })
    }
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Active(Accumulator),
    Cooldown,
}

/// Wheelie detector with threshold hysteresis and a post-wheelie cooldown.
#[derive(Debug, Clone)]
pub struct WheelieDetector {
    wheelie_threshold: f64,
    danger_threshold: f64,
    cooldown: Duration,
    state: State,
    cooldown_timer: Deadline,
}

impl WheelieDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            wheelie_threshold: config.wheelie_threshold,
            danger_threshold: config.danger_threshold,
            cooldown: Duration::from_std(config.cooldown).unwrap_or_else(|_| Duration::seconds(1)),
            state: State::Idle,
            cooldown_timer: Deadline::new(),
        }
    }

    /// Feed one corrected angle observed at `at`.
    ///
    /// Returns a measurement when this sample ends a wheelie. The ending
    /// sample itself is not part of the measurement.
    pub fn process(&mut self, angle: f64, at: DateTime<Utc>) -> Option<WheelieMeasurement> {
        self.poll(at);

        let above = angle >= self.wheelie_threshold;
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle if above => {
                debug!(angle, "wheelie started");
                self.state = State::Active(Accumulator::open(angle, at));
                None
            }
            State::Idle => None,
            State::Active(mut acc) if above => {
                acc.push(angle);
                self.state = State::Active(acc);
                None
            }
            State::Active(acc) => {
                let samples = acc.angle_samples.len();
                let measurement = acc.close(at);
                self.state = State::Cooldown;
                self.cooldown_timer.arm(at, self.cooldown);

                match &measurement {
                    Some(m) => debug!(
                        max = m.max_angle,
                        avg = m.avg_angle,
                        duration = m.duration_seconds,
                        samples,
                        "wheelie ended"
                    ),
                    None => warn!(samples, "wheelie ended without elapsed time, dropped"),
                }
                measurement
            }
            State::Cooldown => {
                self.state = State::Cooldown;
                None
            }
        }
    }

    /// Let the clock expire a pending cooldown without a new sample.
    pub fn poll(&mut self, now: DateTime<Utc>) {
        if matches!(self.state, State::Cooldown) && self.cooldown_timer.poll(now) {
            debug!("cooldown elapsed");
            self.state = State::Idle;
        }
    }

    /// Abandon any wheelie in progress and cancel the cooldown.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.cooldown_timer.cancel();
    }

    pub fn phase(&self) -> DetectorPhase {
        match self.state {
            State::Idle => DetectorPhase::Idle,
            State::Active(_) => DetectorPhase::Active,
            State::Cooldown => DetectorPhase::Cooldown,
        }
    }

    /// Seconds since the current wheelie started, if one is in progress.
    pub fn live_duration(&self, now: DateTime<Utc>) -> Option<f64> {
        match &self.state {
            State::Active(acc) => {
                Some((now - acc.start_time).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// When the pending cooldown ends.
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_timer.expires_at()
    }

    pub fn classify(&self, angle: f64) -> Classification {
        if angle >= self.danger_threshold {
            Classification::Danger
        } else if angle >= self.wheelie_threshold {
            Classification::Wheelie
        } else {
            Classification::Ready
        }
    }
}
