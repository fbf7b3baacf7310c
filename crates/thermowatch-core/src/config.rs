//! Configuration management for Thermowatch
//!
//! Settings live in a flat JSON file (`settings.json` by default) whose keys
//! match the ones the monitor has always used, overlaid by `THERMOWATCH_*`
//! environment variables. [`SettingsStore`] reloads the file when it changes
//! on disk so thresholds can be tuned without a restart.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use config::{Environment, File, FileFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::models::Thresholds;
use crate::retry::RetryPolicy;

/// Default settings file name
pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "THERMOWATCH";

/// All monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Account used to send warning emails
    pub email_sender: String,
    /// Password for `email_sender`
    pub email_password: String,

    /// Lowest acceptable temperature (F)
    pub min_temp: f64,
    /// Highest acceptable temperature (F)
    pub max_temp: f64,
    /// Lowest acceptable humidity (%)
    pub min_humidity: f64,
    /// Highest acceptable humidity (%)
    pub max_humidity: f64,

    /// Minimum minutes between warning emails
    pub mins_between_emails: f64,
    /// Seconds to wait between sensor reads
    pub secs_between_reads: u64,

    /// Whether temperature breaches send email
    #[serde(default = "default_true")]
    pub send_temp_warnings: bool,
    /// Whether humidity breaches send email
    #[serde(default = "default_true")]
    pub send_humidity_warnings: bool,

    /// Initial State bucket display name
    #[serde(rename = "BUCKET_NAME", alias = "bucket_name", default)]
    pub bucket_name: Option<String>,
    /// Initial State bucket key
    #[serde(rename = "BUCKET_KEY", alias = "bucket_key", default)]
    pub bucket_key: Option<String>,
    /// Initial State access key
    #[serde(rename = "ACCESS_KEY", alias = "access_key", default)]
    pub access_key: Option<String>,

    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP relay port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// File listing warning recipients, one per line
    #[serde(default = "default_emails_path")]
    pub emails_path: PathBuf,
    /// Optional HTML email template
    #[serde(default)]
    pub email_template: Option<PathBuf>,

    /// IIO device directory of the DHT sensor
    #[serde(default = "default_sensor_device")]
    pub sensor_device: PathBuf,
    /// Read attempts per poll before giving up
    #[serde(default = "default_sensor_read_attempts")]
    pub sensor_read_attempts: u32,
    /// Delay between sensor read attempts
    #[serde(default = "default_sensor_retry_delay", with = "humantime_serde")]
    pub sensor_retry_delay: Duration,

    /// Login attempts before the mail transport is reported unavailable
    #[serde(default = "default_mail_login_attempts")]
    pub mail_login_attempts: u32,
    /// Backoff after the first failed login; doubles on each retry
    #[serde(default = "default_mail_login_backoff", with = "humantime_serde")]
    pub mail_login_backoff: Duration,

    /// Initial State API base URL
    #[serde(default = "default_telemetry_endpoint")]
    pub telemetry_endpoint: String,

    /// Append-only log file
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Address for the Prometheus exporter, disabled when unset
    #[serde(default)]
    pub metrics_listen: Option<SocketAddr>,
}

fn default_true() -> bool {
    true
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_emails_path() -> PathBuf {
    PathBuf::from("emails")
}

fn default_sensor_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

fn default_sensor_read_attempts() -> u32 {
    15
}

fn default_sensor_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_mail_login_attempts() -> u32 {
    5
}

fn default_mail_login_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_telemetry_endpoint() -> String {
    "https://groker.init.st".to_string()
}

fn default_log_file() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join("temperatureLog"))
        .unwrap_or_else(|| PathBuf::from("temperatureLog"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    /// Load settings from a JSON file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Json))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.min_temp.is_finite() || !self.max_temp.is_finite() || self.min_temp > self.max_temp
        {
            return Err(Error::config(format!(
                "min_temp ({}) must not exceed max_temp ({})",
                self.min_temp, self.max_temp
            )));
        }

        if !self.min_humidity.is_finite()
            || !self.max_humidity.is_finite()
            || self.min_humidity > self.max_humidity
        {
            return Err(Error::config(format!(
                "min_humidity ({}) must not exceed max_humidity ({})",
                self.min_humidity, self.max_humidity
            )));
        }

        if !self.mins_between_emails.is_finite() || self.mins_between_emails < 0.0 {
            return Err(Error::config("mins_between_emails must be a non-negative number"));
        }

        if self.secs_between_reads == 0 {
            return Err(Error::config("secs_between_reads must be at least 1"));
        }

        Ok(())
    }

    /// Look up a setting by its settings-file key
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Thresholds used for breach evaluation
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            min_humidity: self.min_humidity,
            max_humidity: self.max_humidity,
            temp_warnings_enabled: self.send_temp_warnings,
            humidity_warnings_enabled: self.send_humidity_warnings,
        }
    }

    /// Pause between poll cycles
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.secs_between_reads)
    }

    /// Retry policy for a single sensor read
    pub fn sensor_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.sensor_read_attempts, self.sensor_retry_delay)
    }

    /// Retry policy for mail transport login
    pub fn mail_login_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.mail_login_attempts,
            self.mail_login_backoff,
            Duration::from_secs(300),
        )
    }

    /// Telemetry credentials, if streaming is configured
    pub fn telemetry_credentials(&self) -> Option<TelemetryCredentials> {
        match (&self.bucket_key, &self.access_key) {
            (Some(bucket_key), Some(access_key))
                if !bucket_key.is_empty() && !access_key.is_empty() =>
            {
                Some(TelemetryCredentials {
                    endpoint: self.telemetry_endpoint.clone(),
                    bucket_key: bucket_key.clone(),
                    bucket_name: self
                        .bucket_name
                        .clone()
                        .unwrap_or_else(|| bucket_key.clone()),
                    access_key: access_key.clone(),
                })
            }
            _ => None,
        }
    }

    /// Copy with secrets masked, suitable for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.email_password = "********".to_string();
        if copy.access_key.is_some() {
            copy.access_key = Some("********".to_string());
        }
        copy
    }
}

/// Credentials for the Initial State streaming API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryCredentials {
    /// API base URL
    pub endpoint: String,
    /// Bucket key events are sent to
    pub bucket_key: String,
    /// Bucket display name
    pub bucket_name: String,
    /// Account access key
    pub access_key: String,
}

/// Source of the current settings snapshot
pub trait SettingsProvider: Send + Sync {
    /// Current settings
    fn current(&self) -> Arc<Settings>;
}

/// Settings loaded once from disk and reloaded when the file changes
pub struct SettingsStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

struct StoreState {
    settings: Arc<Settings>,
    modified: Option<SystemTime>,
}

impl SettingsStore {
    /// Load settings from `path`; fails if the initial load fails
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let modified = modified_time(&path);
        let settings = Settings::load(&path)?;

        info!(path = %path.display(), "Settings loaded");

        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                settings: Arc::new(settings),
                modified,
            }),
        })
    }

    /// Path the settings were loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload from disk. On failure the previous snapshot stays in effect.
    pub fn reload(&self) -> Result<Arc<Settings>> {
        let modified = modified_time(&self.path);
        let settings = Arc::new(Settings::load(&self.path)?);

        let mut state = self.state.lock();
        state.settings = settings.clone();
        state.modified = modified;

        info!(path = %self.path.display(), "Settings reloaded");
        Ok(settings)
    }
}

impl SettingsProvider for SettingsStore {
    fn current(&self) -> Arc<Settings> {
        let modified = modified_time(&self.path);
        let (stale, settings) = {
            let state = self.state.lock();
            (modified.is_some() && modified != state.modified, state.settings.clone())
        };

        if !stale {
            return settings;
        }

        match self.reload() {
            Ok(settings) => settings,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to reload settings, keeping previous values");
                // Don't retry the same broken file every cycle.
                self.state.lock().modified = modified;
                settings
            }
        }
    }
}

/// Fixed settings, mostly for tests and one-shot commands
impl SettingsProvider for Arc<Settings> {
    fn current(&self) -> Arc<Settings> {
        self.clone()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
