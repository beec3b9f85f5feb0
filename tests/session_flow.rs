//! Integration tests for a full ride through the meter

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use wheelie_meter::config::Config;
use wheelie_meter::core::{Clock, ManualClock};
use wheelie_meter::persistence::{FileStore, MemoryStore, SessionStore};
use wheelie_meter::sensor::FeedError;
use wheelie_meter::{
    DetectorPhase, MeterError, OrientationEvent, SessionState, StoreError, WheelieMeter,
};

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn meter_with(
    config: Config,
    store: Arc<dyn SessionStore>,
    start: DateTime<Utc>,
) -> (WheelieMeter, ManualClock) {
    let clock = ManualClock::new(start);
    let meter = WheelieMeter::with_clock(config, store, Arc::new(clock.clone()))
        .expect("Failed to create meter");
    (meter, clock)
}

fn test_data_dir(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("wheelie-meter-{name}-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn test_ride_is_measured_and_saved() {
    let store = Arc::new(MemoryStore::new());
    let (mut meter, clock) = meter_with(
        Config::default(),
        store.clone(),
        at("2024-05-01T10:00:00Z"),
    );
    let sensor = meter.sensor_sender().unwrap();

    sensor.push(OrientationEvent::new(5.0, clock.now())).unwrap();
    assert_eq!(meter.calibrate().unwrap(), 5.0);
    meter.start_session("rider-1").await.unwrap();

    for beta in [5.0, 16.0, 20.0, 14.0, 4.0] {
        clock.advance(Duration::seconds(1));
        sensor.push(OrientationEvent::new(beta, clock.now())).unwrap();
        meter.poll();
    }
    let completed = meter.pump();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].max_angle, 15.0);
    assert!((completed[0].avg_angle - 13.0).abs() < 1e-9);

    let closed = meter.end_session().unwrap();
    assert_eq!(closed.record.session_name, "2024-05-01 #1");
    assert_eq!(closed.record.measurement_count, 1);
    assert_eq!(closed.record.max_angle, 15.0);
    assert_eq!(closed.record.duration_seconds, 5);
    closed.save.unwrap().await.unwrap();

    assert_eq!(meter.save_measurements().unwrap().await.unwrap(), 1);
    meter.mark_measurements_saved();

    let rows = store.measurements();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "rider-1");
    assert_eq!(rows[0].session_name, "2024-05-01 #1");
    assert_eq!(rows[0].angle, 15.0);
    assert_eq!(rows[0].avg_angle, 13.0);
    assert_eq!(store.sessions()[0].measurements_count, 1);
}

#[tokio::test]
async fn test_uncalibrated_meter_records_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (mut meter, clock) = meter_with(
        Config::default(),
        store.clone(),
        at("2024-05-01T10:00:00Z"),
    );

    meter.handle_event(OrientationEvent::new(30.0, clock.now()));
    let result = meter.start_session("rider-1").await;
    assert!(matches!(result, Err(MeterError::NotCalibrated)));

    for beta in [30.0, 35.0, 2.0] {
        clock.advance(Duration::milliseconds(300));
        assert!(meter
            .handle_event(OrientationEvent::new(beta, clock.now()))
            .is_none());
    }
    assert!(meter.measurements().is_empty());
    assert_eq!(meter.status().session_state, SessionState::NotCalibrated);
    assert!(store.sessions().is_empty());
}

#[tokio::test]
async fn test_sensor_registers_once() {
    let (mut meter, _) = meter_with(
        Config::default(),
        Arc::new(MemoryStore::new()),
        at("2024-05-01T10:00:00Z"),
    );
    assert!(meter.sensor_sender().is_ok());
    assert!(matches!(
        meter.sensor_sender(),
        Err(FeedError::AlreadyRegistered)
    ));
}

#[tokio::test]
async fn test_full_queue_drops_without_blocking() {
    let mut config = Config::default();
    config.sensor.queue_capacity = 4;
    let (mut meter, clock) = meter_with(
        config,
        Arc::new(MemoryStore::new()),
        at("2024-05-01T10:00:00Z"),
    );
    let sensor = meter.sensor_sender().unwrap();

    let results: Vec<_> = (0..6)
        .map(|i| sensor.push(OrientationEvent::new(i as f64, clock.now())))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    assert_eq!(meter.dropped_readings(), 2);

    meter.pump();
    assert_eq!(meter.activity().stats().samples_processed, 4);
}

#[tokio::test]
async fn test_readings_flow_while_save_is_pending() {
    let store = Arc::new(MemoryStore::new());
    let (mut meter, clock) = meter_with(
        Config::default(),
        store.clone(),
        at("2024-05-01T10:00:00Z"),
    );
    meter.handle_event(OrientationEvent::new(0.0, clock.now()));
    meter.calibrate().unwrap();
    meter.start_session("rider-1").await.unwrap();

    let ride = |meter: &mut WheelieMeter, clock: &ManualClock, betas: &[f64]| {
        for &beta in betas {
            clock.advance(Duration::milliseconds(250));
            meter.handle_event(OrientationEvent::new(beta, clock.now()));
        }
    };

    ride(&mut meter, &clock, &[12.0, 22.0, 3.0]);
    let pending = tokio::spawn(meter.save_measurements().unwrap());

    clock.advance(Duration::seconds(2));
    meter.poll();
    ride(&mut meter, &clock, &[14.0, 19.0, 1.0]);

    assert_eq!(pending.await.unwrap().unwrap(), 1);
    assert_eq!(meter.measurements().len(), 2);
    assert!(meter.has_unsaved_measurements());
    assert_eq!(store.measurements().len(), 1);
}

#[tokio::test]
async fn test_store_failure_preserves_buffer() {
    let store = Arc::new(MemoryStore::new());
    let (mut meter, clock) = meter_with(
        Config::default(),
        store.clone(),
        at("2024-05-01T10:00:00Z"),
    );
    meter.handle_event(OrientationEvent::new(0.0, clock.now()));
    meter.calibrate().unwrap();
    meter.start_session("rider-1").await.unwrap();
    for beta in [11.0, 18.0, 0.0] {
        clock.advance(Duration::milliseconds(400));
        meter.handle_event(OrientationEvent::new(beta, clock.now()));
    }

    store.fail_with(Some(StoreError::Network("connection reset".to_string())));
    let closed = meter.end_session().unwrap();
    let err = closed.save.unwrap().await.unwrap_err();
    assert!(matches!(err, MeterError::Persistence(StoreError::Network(_))));

    let err = meter.save_measurements().unwrap().await.unwrap_err();
    assert!(matches!(err, MeterError::Persistence(_)));
    assert_eq!(meter.measurements().len(), 1);
    assert!(meter.has_unsaved_measurements());

    store.fail_with(None);
    assert_eq!(meter.save_measurements().unwrap().await.unwrap(), 1);
}

#[tokio::test]
async fn test_file_store_numbers_sessions_per_day() {
    let dir = test_data_dir("numbering");
    let store = Arc::new(FileStore::new(&dir));
    let (mut meter, clock) = meter_with(
        Config::default(),
        store.clone(),
        at("2024-05-01T08:00:00Z"),
    );
    meter.handle_event(OrientationEvent::new(0.0, clock.now()));
    meter.calibrate().unwrap();

    let mut names = Vec::new();
    for _ in 0..3 {
        meter.start_session("rider-1").await.unwrap();
        clock.advance(Duration::minutes(10));
        meter.poll();
        let closed = meter.end_session().unwrap();
        names.push(closed.record.session_name.clone());
        closed.save.unwrap().await.unwrap();
        clock.advance(Duration::minutes(1));
    }
    assert_eq!(names, ["2024-05-01 #1", "2024-05-01 #2", "2024-05-01 #3"]);

    clock.set(at("2024-05-02T07:00:00Z"));
    meter.start_session("rider-1").await.unwrap();
    assert_eq!(meter.session().session_name(), Some("2024-05-02 #1"));

    let stored = store.read_sessions().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|s| s.duration == 600));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_session_day_follows_configured_timezone() {
    let mut config = Config::default();
    config.session.timezone = "Europe/Warsaw".to_string();
    let store = Arc::new(MemoryStore::new());

    // 23:00 local on May 1st
    let (mut meter, clock) = meter_with(config, store.clone(), at("2024-05-01T21:00:00Z"));
    meter.handle_event(OrientationEvent::new(0.0, clock.now()));
    meter.calibrate().unwrap();
    meter.start_session("rider-1").await.unwrap();
    assert_eq!(meter.session().session_name(), Some("2024-05-01 #1"));
    clock.advance(Duration::minutes(20));
    meter.end_session().unwrap().save.unwrap().await.unwrap();

    // 00:30 local on May 2nd
    clock.set(at("2024-05-01T22:30:00Z"));
    meter.start_session("rider-1").await.unwrap();
    assert_eq!(meter.session().session_name(), Some("2024-05-02 #1"));
}

#[tokio::test]
async fn test_reset_mid_wheelie_cancels_everything() {
    let (mut meter, clock) = meter_with(
        Config::default(),
        Arc::new(MemoryStore::new()),
        at("2024-05-01T10:00:00Z"),
    );
    meter.handle_event(OrientationEvent::new(0.0, clock.now()));
    meter.calibrate().unwrap();
    meter.start_session("rider-1").await.unwrap();
    clock.advance(Duration::milliseconds(200));
    meter.handle_event(OrientationEvent::new(24.0, clock.now()));
    assert_eq!(meter.status().detector_phase, DetectorPhase::Active);

    meter.reset();
    clock.advance(Duration::seconds(30));
    assert_eq!(meter.poll(), None);

    let status = meter.status();
    assert_eq!(status.session_state, SessionState::NotCalibrated);
    assert_eq!(status.detector_phase, DetectorPhase::Idle);
    assert_eq!(status.elapsed_secs, 0);
    assert_eq!(status.measurement_count, 0);
    assert!(meter.end_session().is_none());
}

#[tokio::test]
async fn test_lagging_sensor_timestamps_keep_cooldown() {
    let (mut meter, clock) = meter_with(
        Config::default(),
        Arc::new(MemoryStore::new()),
        at("2024-05-01T10:00:05Z"),
    );
    let sensor = meter.sensor_sender().unwrap();
    sensor.push(OrientationEvent::new(0.0, clock.now())).unwrap();
    meter.calibrate().unwrap();
    meter.start_session("rider-1").await.unwrap();

    // The device clock is 5 s behind the meter clock
    let device_start = at("2024-05-01T10:00:00Z");
    let mut completed = Vec::new();
    for (ms, beta) in [(0, 15.0), (200, 5.0), (400, 15.0), (600, 5.0)] {
        clock.advance(Duration::milliseconds(200));
        meter.poll();
        sensor
            .push(OrientationEvent::new(beta, device_start + Duration::milliseconds(ms)))
            .unwrap();
        completed.extend(meter.pump());
    }

    assert_eq!(completed.len(), 1);
    assert_eq!(meter.measurements().len(), 1);
    assert_eq!(meter.status().detector_phase, DetectorPhase::Cooldown);
}
