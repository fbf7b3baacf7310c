//! DHT11/DHT22 sensor exposed by the Linux `dht11` IIO driver
//!
//! With `dtoverlay=dht11,gpiopin=4` the kernel publishes the sensor under
//! `/sys/bus/iio/devices/iio:deviceN/`. Values are integers in thousandths:
//! millidegrees Celsius and milli-percent relative humidity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{SensorError, SensorSource};
use crate::models::Reading;

const TEMPERATURE_FILE: &str = "in_temp_input";
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

/// DHT22 operating range
const MIN_CELSIUS: f64 = -40.0;
const MAX_CELSIUS: f64 = 80.0;

/// DHT sensor read through sysfs
#[derive(Debug, Clone)]
pub struct IioDhtSensor {
    device: PathBuf,
}

impl IioDhtSensor {
    /// Create a sensor reading from the given IIO device directory
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Device directory
    pub fn device(&self) -> &Path {
        &self.device
    }

    async fn read_channel(&self, file: &str) -> Result<f64, SensorError> {
        let path = self.device.join(file);
        // The driver answers EIO/ETIMEDOUT when the sensor misses its timing window.
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::Unavailable(format!("{}: {e}", path.display())))?;

        let milli: i64 = raw.trim().parse().map_err(|_| {
            SensorError::InvalidReading(format!("{}: {:?}", path.display(), raw.trim()))
        })?;

        Ok(milli as f64 / 1000.0)
    }
}

#[async_trait]
impl SensorSource for IioDhtSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        let humidity_percent = self.read_channel(HUMIDITY_FILE).await?;
        let temperature_celsius = self.read_channel(TEMPERATURE_FILE).await?;

        if !(0.0..=100.0).contains(&humidity_percent) {
            return Err(SensorError::InvalidReading(format!(
                "humidity out of range: {humidity_percent}"
            )));
        }

        if !(MIN_CELSIUS..=MAX_CELSIUS).contains(&temperature_celsius) {
            return Err(SensorError::InvalidReading(format!(
                "temperature out of range: {temperature_celsius}"
            )));
        }

        debug!(temperature_celsius, humidity_percent, "Sensor read");

        Ok(Reading {
            temperature_celsius,
            humidity_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with(temp: &str, humidity: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPERATURE_FILE), temp).unwrap();
        std::fs::write(dir.path().join(HUMIDITY_FILE), humidity).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_millidegrees() {
        let dir = device_with("23400\n", "51200\n");
        let sensor = IioDhtSensor::new(dir.path());

        let reading = sensor.read().await.unwrap();

        assert!((reading.temperature_celsius - 23.4).abs() < 1e-9);
        assert!((reading.humidity_percent - 51.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_negative_temperature() {
        let dir = device_with("-5300", "20000");
        let reading = IioDhtSensor::new(dir.path()).read().await.unwrap();

        assert!((reading.temperature_celsius + 5.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_device_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = IioDhtSensor::new(dir.path().join("iio:device9"));

        assert!(matches!(sensor.read().await, Err(SensorError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid() {
        let dir = device_with("abc", "50000");
        let sensor = IioDhtSensor::new(dir.path());

        assert!(matches!(sensor.read().await, Err(SensorError::InvalidReading(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_humidity_is_invalid() {
        let dir = device_with("20000", "130000");
        let sensor = IioDhtSensor::new(dir.path());

        assert!(matches!(sensor.read().await, Err(SensorError::InvalidReading(_))));
    }
}
