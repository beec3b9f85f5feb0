//! Sensor event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw device orientation reading.
///
/// `beta` is the front-to-back tilt in degrees as reported by the device. It
/// may be negative or exceed 90° depending on how the phone is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationEvent {
    pub beta: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrientationEvent {
    pub fn new(beta: f64, timestamp: DateTime<Utc>) -> Self {
        Self { beta, timestamp }
    }

    /// A reading stamped with the current time.
    pub fn now(beta: f64) -> Self {
        Self::new(beta, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_line() {
        let line = r#"{"beta": -12.5, "timestamp": "2024-05-01T10:00:00.250Z"}"#;
        let event: OrientationEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.beta, -12.5);
        assert_eq!(event.timestamp.timestamp_subsec_millis(), 250);
    }
}
