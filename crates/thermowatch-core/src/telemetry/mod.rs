//! Telemetry streaming
//!
//! Each poll cycle records the current sample under fixed labels and flushes.
//! Failures here are never fatal to the monitor.

mod initial_state;

pub use initial_state::InitialStateStreamer;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Label for temperature samples
pub const TEMPERATURE_LABEL: &str = "Temperature(F)";

/// Label for humidity samples
pub const HUMIDITY_LABEL: &str = "Humidity(%)";

/// Telemetry errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Request never completed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote side answered with a non-success status
    #[error("telemetry API returned {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Destination for labeled numeric samples
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Buffer one value
    fn record(&self, label: &str, value: f64);

    /// Push everything buffered so far
    async fn flush(&self) -> Result<(), TelemetryError>;
}

/// Sink that only writes samples to the log, used when streaming is not configured
#[derive(Debug, Default)]
pub struct LogSink {
    pending: Mutex<Vec<(String, f64)>>,
}

impl LogSink {
    /// Create a new log sink
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetrySink for LogSink {
    fn record(&self, label: &str, value: f64) {
        self.pending.lock().push((label.to_string(), value));
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (label, value) in pending {
            debug!(label = %label, value, "Telemetry sample (streaming disabled)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_drains_on_flush() {
        let sink = LogSink::new();
        sink.record(TEMPERATURE_LABEL, 72.5);
        sink.record(HUMIDITY_LABEL, 40.0);
        assert_eq!(sink.pending.lock().len(), 2);

        sink.flush().await.unwrap();
        assert!(sink.pending.lock().is_empty());
    }
}
