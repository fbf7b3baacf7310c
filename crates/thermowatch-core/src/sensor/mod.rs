//! Sensor acquisition
//!
//! A [`SensorSource`] produces one temperature/humidity reading per call.
//! DHT-family sensors fail often and transiently, so callers go through
//! [`read_with_retry`] which applies a bounded retry policy.

mod iio;

pub use iio::IioDhtSensor;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::models::Reading;
use crate::retry::RetryPolicy;

/// Sensor errors
#[derive(Debug, Error)]
pub enum SensorError {
    /// The device did not answer (DHT checksum or timing failure)
    #[error("sensor did not respond: {0}")]
    Unavailable(String),

    /// The device answered with something that is not a reading
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// Every attempt in the retry budget failed
    #[error("no reading after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Final failure
        last_error: String,
    },
}

/// Something that can be asked for a temperature/humidity reading
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Take one reading
    async fn read(&self) -> Result<Reading, SensorError>;
}

/// Read from `sensor`, retrying transient failures according to `policy`
pub async fn read_with_retry(
    sensor: &dyn SensorSource,
    policy: &RetryPolicy,
) -> Result<Reading, SensorError> {
    policy
        .run("sensor read", |_| sensor.read())
        .await
        .map_err(|exhausted| {
            warn!(attempts = exhausted.attempts, "Sensor cannot get a reading");
            SensorError::Exhausted {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.to_string(),
            }
        })
}
