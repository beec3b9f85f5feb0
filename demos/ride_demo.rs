//! Demonstration of the wheelie meter on a synthetic ride.
//!
//! This example shows how to:
//! 1. Register the sensor callback and calibrate on a level reading
//! 2. Start a named training session
//! 3. Push orientation readings and drain them into the detector
//! 4. End the session and save it with its measurements
//!
//! Run with: cargo run --example ride_demo
//!
//! The ride is generated, and a manual clock follows the reading timestamps,
//! so the demo runs instantly and always produces the same results.

use std::sync::Arc;

use chrono::{Duration, Utc};
use wheelie_meter::{
    config::Config,
    core::{format_hms, ManualClock},
    persistence::MemoryStore,
    OrientationEvent, WheelieMeter, SAFETY_NOTICE,
};

/// Phone tilt at `ms` into the ride: mounted 4° nose-up, with three wheelies.
fn tilt_at(ms: i64) -> f64 {
    let lift = |start: i64, len: i64, peak: f64| {
        if ms < start || ms >= start + len {
            return 0.0;
        }
        let x = (ms - start) as f64 / len as f64;
        peak * (std::f64::consts::PI * x).sin()
    };
    4.0 + lift(3_000, 2_500, 18.0) + lift(8_000, 4_000, 31.0) + lift(15_000, 1_200, 12.5)
}

#[tokio::main]
async fn main() {
    println!("Wheelie Meter - Ride Demo");
    println!("=========================");
    println!("{SAFETY_NOTICE}");

    let start = Utc::now();
    let clock = ManualClock::new(start);
    let store = Arc::new(MemoryStore::new());
    let mut meter = match WheelieMeter::with_clock(
        Config::default(),
        store.clone(),
        Arc::new(clock.clone()),
    ) {
        Ok(meter) => meter,
        Err(e) => {
            eprintln!("Error creating meter: {e}");
            return;
        }
    };

    let sensor = match meter.sensor_sender() {
        Ok(sensor) => sensor,
        Err(e) => {
            eprintln!("Error registering sensor: {e}");
            return;
        }
    };

    // Level bike: calibrate on the mounting angle
    if let Err(e) = sensor.push(OrientationEvent::new(tilt_at(0), start)) {
        eprintln!("Error pushing reading: {e}");
        return;
    }
    match meter.calibrate() {
        Ok(offset) => println!("Calibrated, offset {offset:.1}°"),
        Err(e) => {
            eprintln!("Calibration failed: {e}");
            return;
        }
    }

    if let Err(e) = meter.start_session("demo-rider").await {
        eprintln!("Could not start session: {e}");
        return;
    }
    println!(
        "Session {} started",
        meter.session().session_name().unwrap_or("?")
    );
    println!();

    // 20 seconds at 50 Hz, drained every 100 ms
    for ms in (20..=20_000).step_by(20) {
        let at = start + Duration::milliseconds(ms);
        clock.set(at);
        let _ = sensor.push(OrientationEvent::new(tilt_at(ms), at));

        if ms % 100 == 0 {
            for m in meter.pump() {
                println!(
                    "  [{:>5.1}s] Wheelie! max {:.1}°, avg {:.1}°, {:.2}s",
                    (m.started_at - start).num_milliseconds() as f64 / 1000.0,
                    m.max_angle,
                    m.avg_angle,
                    m.duration_seconds
                );
            }
            if let Some(secs) = meter.poll() {
                if secs % 5 == 0 {
                    let status = meter.status();
                    println!(
                        "  {} {:?} ({:.1}°)",
                        format_hms(secs),
                        status.classification,
                        status.current_angle.unwrap_or(0.0)
                    );
                }
            }
        }
    }

    let Some(closed) = meter.end_session() else {
        eprintln!("Session was not active");
        return;
    };

    println!();
    println!("=== Session Completed ===");
    println!("  Name: {}", closed.record.session_name);
    println!("  Duration: {}", format_hms(closed.record.duration_seconds));
    println!("  Wheelies: {}", closed.record.measurement_count);
    println!("  Best: {:.1}°", closed.record.max_angle);

    match closed.save {
        Ok(job) => {
            if let Err(e) = job.await {
                eprintln!("Error saving session: {e}");
            }
        }
        Err(e) => eprintln!("Session rejected: {e}"),
    }

    match meter.save_measurements() {
        Ok(job) => match job.await {
            Ok(saved) => {
                meter.mark_measurements_saved();
                println!("  Saved {saved} measurement(s)");
            }
            Err(e) => eprintln!("Error saving measurements: {e}"),
        },
        Err(e) => eprintln!("Nothing saved: {e}"),
    }

    println!();
    println!("Stored rows:");
    for row in store.measurements() {
        println!(
            "  {} | max {:.1}° | avg {:.1}° | {:.2}s",
            row.session_name, row.max_angle, row.avg_angle, row.duration
        );
    }

    println!();
    println!("{}", meter.activity().summary());
}
