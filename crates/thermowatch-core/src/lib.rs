//! # Thermowatch
//!
//! Temperature and humidity monitor.
//!
//! Thermowatch polls a DHT22 sensor, streams every sample to Initial State and
//! emails a distribution list when a reading leaves its configured range. A
//! cooldown window keeps a sustained breach from flooding inboxes.
//!
//! ## Architecture
//!
//! - **Sensor**: DHT readings through the Linux IIO driver, with bounded retry
//! - **Telemetry**: buffered streaming to the Initial State events API
//! - **Alerting**: cooldown-gated email delivery over SMTP
//! - **Monitor**: the polling loop tying them together
//!
//! ## Quick Start
//!
//! ```bash
//! # Take a single reading
//! thermowatch read
//!
//! # Start monitoring
//! thermowatch run --config /etc/thermowatch/settings.json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod retry;
pub mod sensor;
pub mod telemetry;

pub use config::Settings;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{Notifier, NotifyOutcome};
    pub use crate::config::{Settings, SettingsProvider, SettingsStore};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::Monitor;
    pub use crate::sensor::SensorSource;
    pub use crate::telemetry::TelemetrySink;
}
