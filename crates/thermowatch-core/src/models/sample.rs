//! Sensor sample data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw reading as reported by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in degrees Celsius
    pub temperature_celsius: f64,

    /// Relative humidity in percent
    pub humidity_percent: f64,
}

/// A single poll-cycle observation, in the units used for alerting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Temperature in degrees Fahrenheit, rounded to two decimals
    pub temperature: f64,

    /// Relative humidity in percent, rounded to two decimals
    pub humidity: f64,

    /// When the reading was taken
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    /// Build a sample from a raw sensor reading
    pub fn from_reading(reading: Reading, observed_at: DateTime<Utc>) -> Self {
        Self {
            temperature: round2(celsius_to_fahrenheit(reading.temperature_celsius)),
            humidity: round2(reading.humidity_percent),
            observed_at,
        }
    }
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
