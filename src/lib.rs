//! Wheelie Meter - wheelie detection and training sessions from orientation
//! sensor streams.
//!
//! The meter turns a stream of front-to-back tilt readings into discrete
//! wheelie measurements (peak angle, average angle, duration), groups them into
//! named training sessions and hands validated results to a results store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Wheelie Meter                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Sensor    │──▶│ Normalize + │──▶│  Detector   │       │
//! │  │    Feed     │   │ Calibration │   │ (hysteresis)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Activity   │   │ Persistence │◀──│   Session   │       │
//! │  │    Log      │   │    Gate     │   │   Manager   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wheelie_meter::{persistence::MemoryStore, Config, OrientationEvent, WheelieMeter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut meter = WheelieMeter::new(Config::default(), Arc::new(MemoryStore::new()))?;
//! let sensor = meter.sensor_sender()?;
//!
//! sensor.push(OrientationEvent::now(2.0))?;
//! meter.calibrate()?;
//! meter.start_session("rider-1").await?;
//!
//! // ... push readings, then periodically:
//! meter.pump();
//! meter.poll();
//!
//! if let Some(closed) = meter.end_session() {
//!     closed.save?.await?;
//! }
//! meter.save_measurements()?.await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod persistence;
pub mod sensor;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use config::Config;
pub use controller::{ClosedSession, MeterStatus, WheelieMeter};
pub use core::{
    Classification, DetectorPhase, SessionRecord, SessionState, WheelieDetector,
    WheelieMeasurement,
};
pub use error::{MeterError, StoreError};
pub use persistence::{PersistenceGate, SaveJob, SessionStore};
pub use sensor::{OrientationEvent, SensorSender};
pub use transparency::{ActivityLog, ActivityStats, SharedActivityLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Riding notice shown before a live session.
pub const SAFETY_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                  WHEELIE METER - BEFORE YOU RIDE                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Mount the phone firmly, screen facing the rider.                ║
║                                                                  ║
║  ✓ CALIBRATE with the bike level on both wheels.                 ║
║  ✓ A wheelie is counted from 10° and flagged DANGER from 27°.    ║
║                                                                  ║
║  ✗ Do not look at the screen while riding.                       ║
║  ✗ Only ride where it is legal and safe to do so.                ║
║                                                                  ║
║  Results are saved only when you save them.                      ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_notice_contents() {
        assert!(SAFETY_NOTICE.contains("CALIBRATE"));
        assert!(SAFETY_NOTICE.contains("10°"));
        assert!(SAFETY_NOTICE.contains("27°"));
    }
}
