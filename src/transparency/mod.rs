//! Transparency module for the wheelie meter.
//!
//! Tracks what the meter did with the readings it received, so a rider can
//! see how much was measured, discarded and saved.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};
