//! Orientation sensor input.
//!
//! Readings arrive through a push-style [`SensorSender`] registered exactly
//! once per [`SensorFeed`]; the meter drains the queue on its own schedule.

pub mod feed;
pub mod types;

pub use feed::{FeedError, SensorFeed, SensorSender};
pub use types::OrientationEvent;
