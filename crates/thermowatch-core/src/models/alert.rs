//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::Sample;

/// Monitored quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Temperature in Fahrenheit
    Temperature,
    /// Relative humidity in percent
    Humidity,
}

/// Kind of threshold breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Temperature at or above the maximum
    TempHigh,
    /// Temperature below the minimum
    TempLow,
    /// Humidity at or above the maximum
    HumidityHigh,
    /// Humidity below the minimum
    HumidityLow,
}

impl AlertKind {
    /// The metric this breach concerns
    pub fn metric(self) -> Metric {
        match self {
            Self::TempHigh | Self::TempLow => Metric::Temperature,
            Self::HumidityHigh | Self::HumidityLow => Metric::Humidity,
        }
    }

    /// Human-readable description used in log lines and emails
    pub fn description(self) -> &'static str {
        match self {
            Self::TempHigh => "Temperature has gone above the recommended level",
            Self::TempLow => "Temperature has fallen below the recommended level",
            Self::HumidityHigh => "Humidity has gone above the recommended level",
            Self::HumidityLow => "Humidity has fallen below the recommended level",
        }
    }

    /// Email subject line
    pub fn subject(self) -> &'static str {
        match self.metric() {
            Metric::Temperature => "Temperature Warning",
            Metric::Humidity => "Humidity Warning",
        }
    }

    /// Short snake_case label, used as a metrics tag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TempHigh => "temp_high",
            Self::TempLow => "temp_low",
            Self::HumidityHigh => "humidity_high",
            Self::HumidityLow => "humidity_low",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured acceptable ranges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Lowest acceptable temperature (F)
    pub min_temp: f64,
    /// Temperature at which a high warning fires (F)
    pub max_temp: f64,
    /// Lowest acceptable humidity (%)
    pub min_humidity: f64,
    /// Humidity at which a high warning fires (%)
    pub max_humidity: f64,
    /// Whether temperature breaches produce warnings
    pub temp_warnings_enabled: bool,
    /// Whether humidity breaches produce warnings
    pub humidity_warnings_enabled: bool,
}

impl Thresholds {
    /// Evaluate a sample, returning at most one breach per metric.
    ///
    /// The upper bound is inclusive and the lower bound exclusive, so a value
    /// equal to `max_*` is a breach while a value equal to `min_*` is not.
    pub fn evaluate(&self, sample: &Sample) -> Vec<AlertKind> {
        let mut breaches = Vec::with_capacity(2);

        if self.temp_warnings_enabled {
            if sample.temperature >= self.max_temp {
                breaches.push(AlertKind::TempHigh);
            } else if sample.temperature < self.min_temp {
                breaches.push(AlertKind::TempLow);
            }
        }

        if self.humidity_warnings_enabled {
            if sample.humidity >= self.max_humidity {
                breaches.push(AlertKind::HumidityHigh);
            } else if sample.humidity < self.min_humidity {
                breaches.push(AlertKind::HumidityLow);
            }
        }

        breaches
    }
}

/// A detected breach, handed to the notifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// What went out of range
    pub kind: AlertKind,

    /// The sample that triggered it
    pub sample: Sample,

    /// Minimum minutes between notifications
    pub cooldown_minutes: f64,
}

/// Record of one delivery attempt to one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Recipient address
    pub recipient: String,

    /// When the attempt finished
    pub sent_at: DateTime<Utc>,

    /// Whether it succeeded
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn thresholds() -> Thresholds {
        Thresholds {
            min_temp: 60.0,
            max_temp: 85.0,
            min_humidity: 30.0,
            max_humidity: 70.0,
            temp_warnings_enabled: true,
            humidity_warnings_enabled: true,
        }
    }

    fn sample(temperature: f64, humidity: f64) -> Sample {
        Sample {
            temperature,
            humidity,
            observed_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(72.0, 50.0, vec![])]
    #[case(85.0, 50.0, vec![AlertKind::TempHigh])]
    #[case(90.0, 50.0, vec![AlertKind::TempHigh])]
    #[case(60.0, 50.0, vec![])]
    #[case(59.99, 50.0, vec![AlertKind::TempLow])]
    #[case(72.0, 70.0, vec![AlertKind::HumidityHigh])]
    #[case(72.0, 29.5, vec![AlertKind::HumidityLow])]
    #[case(72.0, 30.0, vec![])]
    #[case(95.0, 80.0, vec![AlertKind::TempHigh, AlertKind::HumidityHigh])]
    #[case(40.0, 10.0, vec![AlertKind::TempLow, AlertKind::HumidityLow])]
    fn test_evaluate(#[case] temp: f64, #[case] humidity: f64, #[case] expected: Vec<AlertKind>) {
        assert_eq!(thresholds().evaluate(&sample(temp, humidity)), expected);
    }

    #[test]
    fn test_disabled_warnings_are_skipped() {
        let mut t = thresholds();
        t.temp_warnings_enabled = false;
        assert_eq!(t.evaluate(&sample(100.0, 90.0)), vec![AlertKind::HumidityHigh]);

        t.humidity_warnings_enabled = false;
        assert!(t.evaluate(&sample(100.0, 90.0)).is_empty());
    }

    #[test]
    fn test_subject_by_metric() {
        assert_eq!(AlertKind::TempLow.subject(), "Temperature Warning");
        assert_eq!(AlertKind::HumidityHigh.subject(), "Humidity Warning");
        assert_eq!(AlertKind::HumidityLow.metric(), Metric::Humidity);
    }
}
