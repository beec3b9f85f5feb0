//! Core functionality for the wheelie meter.
//!
//! This module contains:
//! - Angle normalization and calibration correction
//! - The wheelie detector state machine
//! - The training-session lifecycle
//! - Clock-driven cancellable timers

pub mod calibration;
pub mod clock;
pub mod detector;
pub mod normalize;
pub mod session;
pub mod timer;

// Re-export commonly used types
pub use calibration::CalibrationStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{Classification, DetectorPhase, WheelieDetector, WheelieMeasurement};
pub use normalize::{correct, normalize, MAX_TILT};
pub use session::{format_hms, session_name, SessionManager, SessionRecord, SessionState};
pub use timer::{Deadline, Ticker};
