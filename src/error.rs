//! Error types surfaced by the wheelie meter.

use std::fmt;

/// Failures reported by control commands.
///
/// Everything except [`MeterError::Persistence`] is raised synchronously and
/// leaves the meter untouched.
#[derive(Debug)]
pub enum MeterError {
    /// A session was started before any successful calibration.
    NotCalibrated,
    /// Calibration found no recent sensor reading.
    NoSensorData,
    /// A save was requested with nothing in the buffer.
    EmptyMeasurementSet,
    /// A measurement angle fell outside the physical range.
    Validation { index: usize, max_angle: f64 },
    /// A session was started while another one is running.
    SessionAlreadyActive,
    /// No user identity was supplied for a command that needs one.
    Unauthenticated,
    /// The storage collaborator rejected or failed a request.
    Persistence(StoreError),
}

impl fmt::Display for MeterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeterError::NotCalibrated => write!(f, "Calibrate the sensor before starting a session"),
            MeterError::NoSensorData => write!(f, "No sensor reading available for calibration"),
            MeterError::EmptyMeasurementSet => write!(f, "No measurements to save"),
            MeterError::Validation { index, max_angle } => {
                write!(f, "Measurement {index} has invalid angle {max_angle}")
            }
            MeterError::SessionAlreadyActive => write!(f, "A session is already running"),
            MeterError::Unauthenticated => write!(f, "A signed-in user is required"),
            MeterError::Persistence(e) => write!(f, "Persistence error: {e}"),
        }
    }
}

impl std::error::Error for MeterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeterError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MeterError {
    fn from(e: StoreError) -> Self {
        MeterError::Persistence(e)
    }
}

/// Opaque failures from a [`crate::persistence::SessionStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Store is misconfigured
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Store returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
    /// Local file error
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Config(msg) => write!(f, "store config error: {msg}"),
            StoreError::Network(msg) => write!(f, "store network error: {msg}"),
            StoreError::Server { status, message } => {
                write!(f, "store server error ({status}): {message}")
            }
            StoreError::Serialization(msg) => write!(f, "store serialization error: {msg}"),
            StoreError::Io(msg) => write!(f, "store io error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_angle() {
        let err = MeterError::Validation {
            index: 2,
            max_angle: 95.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("95"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_persistence_wraps_store_error() {
        let err: MeterError = StoreError::Server {
            status: 503,
            message: "down".to_string(),
        }
        .into();
        assert!(matches!(err, MeterError::Persistence(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("503"));
    }
}
