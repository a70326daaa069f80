/*!
 * Configuration types for Tidemark
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::Level;

use crate::error::{MirrorError, Result};
use crate::store::StoreTarget;

/// Reserved destination bucket for journal records
pub const JOURNAL_BUCKET: &str = "Logging";

/// Main configuration for the mirror service, loaded once at startup and
/// treated as immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Path of the durable instance-state file
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Wait between mirror cycles, HH:MM:SS
    pub refresh_interval: String,

    /// Watermark fallback for a destination with no prior data
    /// (RFC3339, whole seconds)
    pub recovery_timestamp: String,

    /// Buckets to mirror, in declaration order
    pub buckets: Vec<String>,

    /// Remote source store
    pub remote: EndpointConfig,

    /// Local destination store
    pub local: EndpointConfig,

    /// Terminal logging
    #[serde(default)]
    pub log: LogConfig,
}

/// One store endpoint with its credentials
#[derive(Clone, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub org: String,
    pub token: String,
}

impl EndpointConfig {
    pub fn target(&self) -> StoreTarget {
        StoreTarget::new(&self.url, &self.org, &self.token)
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Terminal logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("tidemark-state.json")
}

impl MirrorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: MirrorConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(MirrorError::Config(
                "at least one bucket must be configured".to_string(),
            ));
        }
        if self.refresh_duration()?.is_zero() {
            return Err(MirrorError::Config(
                "refresh_interval must be greater than zero".to_string(),
            ));
        }
        self.recovery_time()?;
        Ok(())
    }

    /// Parsed refresh interval
    pub fn refresh_duration(&self) -> Result<Duration> {
        parse_interval(&self.refresh_interval)
    }

    /// Parsed recovery timestamp
    pub fn recovery_time(&self) -> Result<DateTime<Utc>> {
        let time = DateTime::parse_from_rfc3339(&self.recovery_timestamp).map_err(|e| {
            MirrorError::Config(format!(
                "invalid recovery_timestamp '{}': {}",
                self.recovery_timestamp, e
            ))
        })?;
        if time.timestamp_subsec_nanos() != 0 {
            return Err(MirrorError::Config(format!(
                "recovery_timestamp '{}' must not carry sub-second precision",
                self.recovery_timestamp
            )));
        }
        Ok(time.with_timezone(&Utc))
    }
}

/// Parse an HH:MM:SS interval
fn parse_interval(raw: &str) -> Result<Duration> {
    let invalid = || {
        MirrorError::Config(format!(
            "invalid refresh_interval '{}': expected HH:MM:SS",
            raw
        ))
    };

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let hours: u64 = parts[0].parse().map_err(|_| invalid())?;
    let minutes: u64 = parts[1].parse().map_err(|_| invalid())?;
    let seconds: u64 = parts[2].parse().map_err(|_| invalid())?;
    if minutes > 59 || seconds > 59 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}
