//! Bounded, non-blocking queue between the sensor callback and the meter.

use super::types::OrientationEvent;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Errors from the sensor feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// The sensor callback was already handed out
    AlreadyRegistered,
    /// The queue is full; the reading was dropped
    Full,
    /// The meter side of the feed is gone
    Disconnected,
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::AlreadyRegistered => write!(f, "Sensor callback is already registered"),
            FeedError::Full => write!(f, "Sensor queue is full"),
            FeedError::Disconnected => write!(f, "Sensor feed is disconnected"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Receiving end of the sensor queue, owned by the meter.
pub struct SensorFeed {
    sender: Option<Sender<OrientationEvent>>,
    receiver: Receiver<OrientationEvent>,
    dropped: Arc<AtomicU64>,
}

impl SensorFeed {
    /// Create a feed holding at most `capacity` undrained readings.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender: Some(sender),
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand out the single sensor callback.
    pub fn register(&mut self) -> Result<SensorSender, FeedError> {
        let sender = self.sender.take().ok_or(FeedError::AlreadyRegistered)?;
        Ok(SensorSender {
            sender,
            dropped: Arc::clone(&self.dropped),
        })
    }

    pub fn is_registered(&self) -> bool {
        self.sender.is_none()
    }

    /// Take one queued reading without blocking.
    pub fn try_recv(&self) -> Option<OrientationEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of readings waiting to be processed.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Readings dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything queued.
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

/// The sensor callback. Pushing never blocks.
pub struct SensorSender {
    sender: Sender<OrientationEvent>,
    dropped: Arc<AtomicU64>,
}

impl SensorSender {
    pub fn push(&self, event: OrientationEvent) -> Result<(), FeedError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total.is_power_of_two() {
                    warn!(total, "sensor queue full, dropping readings");
                }
                Err(FeedError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(FeedError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_only_once() {
        let mut feed = SensorFeed::new(8);
        assert!(!feed.is_registered());
        assert!(feed.register().is_ok());
        assert!(feed.is_registered());
        assert_eq!(feed.register().err(), Some(FeedError::AlreadyRegistered));
    }

    #[test]
    fn test_push_and_drain_in_order() {
        let mut feed = SensorFeed::new(8);
        let sender = feed.register().unwrap();
        sender.push(OrientationEvent::now(1.0)).unwrap();
        sender.push(OrientationEvent::now(2.0)).unwrap();

        assert_eq!(feed.pending(), 2);
        assert_eq!(feed.try_recv().map(|e| e.beta), Some(1.0));
        assert_eq!(feed.try_recv().map(|e| e.beta), Some(2.0));
        assert!(feed.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let mut feed = SensorFeed::new(2);
        let sender = feed.register().unwrap();
        sender.push(OrientationEvent::now(1.0)).unwrap();
        sender.push(OrientationEvent::now(2.0)).unwrap();
        assert_eq!(sender.push(OrientationEvent::now(3.0)), Err(FeedError::Full));
        assert_eq!(feed.dropped(), 1);
        assert_eq!(feed.clear(), 2);
    }

    #[test]
    fn test_push_after_feed_dropped() {
        let mut feed = SensorFeed::new(2);
        let sender = feed.register().unwrap();
        drop(feed);
        assert_eq!(
            sender.push(OrientationEvent::now(1.0)),
            Err(FeedError::Disconnected)
        );
    }
}
