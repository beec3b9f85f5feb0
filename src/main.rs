//! Wheelie Meter CLI
//!
//! Replays recorded rides or measures a live orientation stream.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wheelie_meter::{
    config::Config,
    core::{format_hms, ManualClock},
    persistence::{FileStore, MemoryStore, SessionStore},
    sensor::FeedError,
    transparency::create_shared_log_with_persistence,
    ClosedSession, MeterError, OrientationEvent, WheelieMeasurement, WheelieMeter, SAFETY_NOTICE,
    VERSION,
};

#[cfg(feature = "gateway")]
use wheelie_meter::persistence::RestStore;

#[derive(Parser)]
#[command(name = "wheelie-meter")]
#[command(version = VERSION)]
#[command(about = "Wheelie detection and training-session tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines recording of orientation readings as one session
    Replay {
        /// Recording with one `{"beta": .., "timestamp": ..}` object per line
        file: PathBuf,

        /// Rider the session belongs to
        #[arg(long)]
        user: String,

        /// Where results are stored
        #[arg(long, value_enum, default_value = "file")]
        store: StoreKind,

        /// Print results without saving them
        #[arg(long)]
        no_save: bool,
    },

    /// Measure readings streamed as JSON lines on stdin
    Live {
        /// Rider the session belongs to
        #[arg(long)]
        user: String,

        /// Where results are stored
        #[arg(long, value_enum, default_value = "file")]
        store: StoreKind,
    },

    /// Show cumulative activity and recent sessions
    Status,

    /// Display the riding notice
    Notice,

    /// Show configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    /// Keep results in memory for this run only
    Memory,
    /// Append JSON lines under the data directory
    File,
    /// Remote PostgREST API (requires the gateway feature)
    Rest,
}

/// A stdin reading; readings without a timestamp are stamped on arrival.
#[derive(Deserialize)]
struct LiveReading {
    beta: f64,
    timestamp: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            file,
            user,
            store,
            no_save,
        } => cmd_replay(&file, &user, store, no_save).await,
        Commands::Live { user, store } => cmd_live(&user, store).await,
        Commands::Status => cmd_status(),
        Commands::Notice => {
            println!("{SAFETY_NOTICE}");
            Ok(())
        }
        Commands::Config => cmd_config(),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wheelie_meter=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("loading configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    Ok(config)
}

fn results_dir(config: &Config) -> PathBuf {
    config.data_path.join("results")
}

fn build_store(kind: StoreKind, config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::File => Ok(Arc::new(FileStore::new(results_dir(config)))),
        #[cfg(feature = "gateway")]
        StoreKind::Rest => Ok(Arc::new(RestStore::new(config.store.clone())?)),
        #[cfg(not(feature = "gateway"))]
        StoreKind::Rest => Err(anyhow!("the rest store requires the `gateway` feature")),
    }
}

fn read_recording(path: &Path) -> anyhow::Result<Vec<OrientationEvent>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {path:?}"))?;
    let mut events = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {path:?}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: OrientationEvent = serde_json::from_str(&line)
            .with_context(|| format!("{path:?} line {}", index + 1))?;
        events.push(event);
    }

    Ok(events)
}

fn print_measurement(m: &WheelieMeasurement) {
    println!(
        "[{}] Wheelie: max {:.1}°, avg {:.1}°, {:.2}s",
        m.started_at.format("%H:%M:%S"),
        m.max_angle,
        m.avg_angle,
        m.duration_seconds
    );
}

/// Print the closed session and, unless `no_save`, store it with its
/// measurements.
async fn finish_session(
    meter: &mut WheelieMeter,
    closed: ClosedSession,
    no_save: bool,
) -> anyhow::Result<()> {
    let record = &closed.record;
    println!();
    println!("Session {} ({})", record.session_name, record.session_id);
    println!("  Duration: {}", format_hms(record.duration_seconds));
    println!("  Wheelies: {}", record.measurement_count);
    println!("  Best angle: {:.1}°", record.max_angle);

    if no_save {
        println!("Results not saved (--no-save).");
        return Ok(());
    }

    closed.save?.await?;
    println!("Session saved.");

    match meter.save_measurements() {
        Ok(job) => {
            let saved = job.await?;
            meter.mark_measurements_saved();
            println!("Saved {saved} measurement(s).");
        }
        Err(MeterError::EmptyMeasurementSet) => println!("No wheelies to save."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn cmd_replay(
    file: &Path,
    user: &str,
    store: StoreKind,
    no_save: bool,
) -> anyhow::Result<()> {
    println!("Wheelie Meter v{VERSION}");
    println!();

    let config = load_config()?;
    let events = read_recording(file)?;
    let (first, rest) = events
        .split_first()
        .ok_or_else(|| anyhow!("recording {file:?} has no readings"))?;

    let store = build_store(store, &config)?;
    let activity = create_shared_log_with_persistence(config.data_path.join("activity.json"));
    let clock = ManualClock::new(first.timestamp);
    let mut meter = WheelieMeter::with_clock(config, store, Arc::new(clock.clone()))?
        .with_activity_log(Arc::clone(&activity));

    meter.handle_event(*first);
    let offset = meter.calibrate()?;
    println!("Calibrated on first reading (offset {offset:.1}°)");

    meter.start_session(user).await?;
    println!(
        "Replaying {} readings from {:?}",
        events.len(),
        file
    );
    println!();

    for event in rest {
        clock.set(event.timestamp);
        meter.poll();
        if let Some(m) = meter.handle_event(*event) {
            print_measurement(&m);
        }
    }

    let closed = meter
        .end_session()
        .ok_or_else(|| anyhow!("session was not active at the end of the recording"))?;
    let result = finish_session(&mut meter, closed, no_save).await;

    if let Err(e) = activity.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }
    result
}

async fn cmd_live(user: &str, store: StoreKind) -> anyhow::Result<()> {
    println!("Wheelie Meter v{VERSION}");
    println!("{SAFETY_NOTICE}");

    let config = load_config()?;
    let store = build_store(store, &config)?;
    let activity = create_shared_log_with_persistence(config.data_path.join("activity.json"));
    let tick = config.session.tick_interval;
    let mut meter = WheelieMeter::new(config, store)?.with_activity_log(Arc::clone(&activity));

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")?;

    let input_open = Arc::new(AtomicBool::new(true));
    spawn_stdin_reader(meter.sensor_sender()?, Arc::clone(&input_open));

    println!("Hold the bike level. Waiting for sensor...");
    loop {
        if !running.load(Ordering::SeqCst) || !input_open.load(Ordering::SeqCst) {
            println!("Stopped before calibration.");
            return Ok(());
        }
        match meter.calibrate() {
            Ok(offset) => {
                println!("Calibrated (offset {offset:.1}°)");
                break;
            }
            Err(MeterError::NoSensorData) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    meter.start_session(user).await?;
    if let Some(name) = meter.session().session_name() {
        println!("Session {name} started. Press Ctrl+C to stop.");
    }
    println!();

    while running.load(Ordering::SeqCst) && input_open.load(Ordering::SeqCst) {
        for m in meter.pump() {
            print_measurement(&m);
        }
        if let Some(secs) = meter.poll() {
            if secs % 10 == 0 {
                let status = meter.status();
                println!(
                    "  {} | {} wheelie(s) | {:.1}° {:?}",
                    format_hms(secs),
                    status.measurement_count,
                    status.current_angle.unwrap_or(0.0),
                    status.classification
                );
            }
        }
        tokio::time::sleep(tick.min(Duration::from_millis(50))).await;
    }

    for m in meter.pump() {
        print_measurement(&m);
    }
    if meter.dropped_readings() > 0 {
        eprintln!(
            "Warning: {} reading(s) dropped on a full queue",
            meter.dropped_readings()
        );
    }

    let result = match meter.end_session() {
        Some(closed) => finish_session(&mut meter, closed, false).await,
        None => Ok(()),
    };

    if let Err(e) = activity.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }
    println!();
    println!("{}", activity.summary());
    result
}

/// Forward stdin JSON lines to the sensor until EOF.
fn spawn_stdin_reader(sender: wheelie_meter::SensorSender, input_open: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let reading: LiveReading = match serde_json::from_str(&line) {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed reading");
                    continue;
                }
            };
            let event = OrientationEvent::new(
                reading.beta,
                reading.timestamp.unwrap_or_else(Utc::now),
            );
            if let Err(FeedError::Disconnected) = sender.push(event) {
                break;
            }
        }
        input_open.store(false, Ordering::SeqCst);
    });
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Wheelie Meter Status");
    println!("====================");
    println!();

    let stats_path = config.data_path.join("activity.json");
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)?;
        let stats: serde_json::Value = serde_json::from_str(&content)?;
        println!("Cumulative Statistics:");
        for (key, label) in [
            ("samples_processed", "Readings processed"),
            ("samples_discarded", "Readings discarded"),
            ("wheelies_detected", "Wheelies detected"),
            ("sessions_completed", "Sessions completed"),
            ("measurements_saved", "Measurements saved"),
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {label}: {value}");
            }
        }
    } else {
        println!("No previous activity found.");
    }
    println!();

    let store = FileStore::new(results_dir(&config));
    let sessions = store.read_sessions()?;
    if sessions.is_empty() {
        println!("No sessions stored in {:?}", store.sessions_path());
        return Ok(());
    }

    println!("Recent sessions ({} total):", sessions.len());
    for row in sessions.iter().rev().take(5) {
        println!(
            "  {} | {} | {} wheelie(s) | best {:.1}° | {}",
            row.session_name,
            format_hms(row.duration),
            row.measurements_count,
            row.max_angle,
            row.user_id
        );
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
