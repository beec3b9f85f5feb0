//! Zero-offset calibration.

use super::normalize::correct;
use tracing::info;

/// Holds the angle treated as "level" and corrects readings against it.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    offset: f64,
    calibrated: bool,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `current` (a normalized reading) as the new zero.
    pub fn calibrate(&mut self, current: f64) -> f64 {
        self.offset = current;
        self.calibrated = true;
        info!(offset = current, "calibrated");
        self.offset
    }

    /// Corrected angle for a normalized reading.
    pub fn apply(&self, normalized: f64) -> f64 {
        correct(normalized, self.offset)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Whether [`calibrate`](Self::calibrate) succeeded since the last reset.
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.calibrated = false;
    }
}
