//! Configuration for the wheelie meter.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the meter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Threshold and cooldown settings for the detector
    pub detection: DetectionConfig,

    /// Session timing and naming
    pub session: SessionConfig,

    /// Calibration settings
    pub calibration: CalibrationConfig,

    /// Sensor queue settings
    pub sensor: SensorConfig,

    /// Remote results store
    pub store: StoreConfig,

    /// Path for local results and the activity log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wheelie-meter");

        Self {
            detection: DetectionConfig::default(),
            session: SessionConfig::default(),
            calibration: CalibrationConfig::default(),
            sensor: SensorConfig::default(),
            store: StoreConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wheelie-meter")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Check values that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if !(d.wheelie_threshold > 0.0 && d.wheelie_threshold <= 90.0) {
            return Err(ConfigError::Invalid(format!(
                "wheelie_threshold must be in (0, 90], got {}",
                d.wheelie_threshold
            )));
        }
        if d.danger_threshold.is_nan() || d.danger_threshold < d.wheelie_threshold {
            return Err(ConfigError::Invalid(format!(
                "danger_threshold ({}) is below wheelie_threshold ({})",
                d.danger_threshold, d.wheelie_threshold
            )));
        }
        if d.cooldown.is_zero() {
            return Err(ConfigError::Invalid("cooldown must be non-zero".to_string()));
        }
        if self.session.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        if self.sensor.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        self.session.tz()?;
        Ok(())
    }
}

/// Detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Corrected angle (degrees) at which a wheelie starts
    pub wheelie_threshold: f64,
    /// Advisory angle (degrees) above which the display warns
    pub danger_threshold: f64,
    /// Lockout after each completed wheelie
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            wheelie_threshold: 10.0,
            danger_threshold: 27.0,
            cooldown: Duration::from_secs(1),
        }
    }
}

/// Session timing and naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval of the elapsed-time tick
    #[serde(with = "duration_ms")]
    pub tick_interval: Duration,
    /// IANA time zone used for the calendar day in session names
    pub timezone: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            timezone: "UTC".to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse the configured time zone.
    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| ConfigError::Invalid(format!("unknown timezone '{}': {e}", self.timezone)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Oldest reading accepted as "current" when calibrating
    #[serde(with = "duration_ms")]
    pub max_reading_age: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_reading_age: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Orientation events buffered between pumps
    pub queue_capacity: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Remote results store (PostgREST-style REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://project.supabase.co`
    pub base_url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: String,
    pub measurements_table: String,
    pub sessions_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            measurements_table: "wheelie_results".to_string(),
            sessions_table: "training_sessions".to_string(),
        }
    }
}

impl StoreConfig {
    /// Whether enough is configured to talk to a remote store.
    pub fn is_remote_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
