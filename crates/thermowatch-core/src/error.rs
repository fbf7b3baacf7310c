//! Error types for Thermowatch

use thiserror::Error;

use crate::alerting::{MailError, NotifyError};
use crate::sensor::SensorError;
use crate::telemetry::TelemetryError;

/// Result type alias using Thermowatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Thermowatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Sensor could not produce a reading
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mail transport error
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    /// Notification could not be dispatched
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Telemetry streaming error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
