//! Polling loop
//!
//! One cycle: read the sensor, stream the sample, evaluate thresholds and
//! hand each breach to the notifier. Nothing that goes wrong inside a cycle
//! stops the loop.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::alerting::{NotifyError, NotifyOutcome, Notifier};
use crate::clock::{Clock, SystemClock};
use crate::config::SettingsProvider;
use crate::error::Result;
use crate::models::{AlertEvent, AlertKind, Sample};
use crate::sensor::{self, SensorSource};
use crate::telemetry::{TelemetrySink, HUMIDITY_LABEL, TEMPERATURE_LABEL};

/// What happened during one poll cycle
#[derive(Debug)]
pub struct CycleReport {
    /// The sample taken
    pub sample: Sample,
    /// Breaches found, in evaluation order
    pub breaches: Vec<AlertKind>,
    /// Notifier result for each breach
    pub notifications: Vec<(AlertKind, std::result::Result<NotifyOutcome, NotifyError>)>,
}

impl CycleReport {
    /// Number of breaches that resulted in a send
    pub fn sent(&self) -> usize {
        self.notifications
            .iter()
            .filter(|(_, r)| matches!(r, Ok(o) if o.is_sent()))
            .count()
    }
}

/// The sensor monitor
pub struct Monitor {
    settings: Arc<dyn SettingsProvider>,
    sensor: Arc<dyn SensorSource>,
    telemetry: Arc<dyn TelemetrySink>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    /// Create a new monitor
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        sensor: Arc<dyn SensorSource>,
        telemetry: Arc<dyn TelemetrySink>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            settings,
            sensor,
            telemetry,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used to stamp samples
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The notifier shared by all cycles
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Run until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(started_at = %chrono::Local::now(), "Monitor started");
        tokio::pin!(shutdown);

        loop {
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Poll cycle failed");
            }

            let interval = self.settings.current().poll_interval();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Monitor stopped");
        Ok(())
    }

    /// Run a single poll cycle
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let settings = self.settings.current();

        let reading = match sensor::read_with_retry(self.sensor.as_ref(), &settings.sensor_retry()).await {
            Ok(reading) => reading,
            Err(e) => {
                metrics::counter!("thermowatch_sensor_failures_total").increment(1);
                warn!(error = %e, "Sensor cannot get a reading...trying again next cycle");
                return Err(e.into());
            }
        };

        let sample = Sample::from_reading(reading, self.clock.now());
        metrics::counter!("thermowatch_samples_total").increment(1);
        info!(
            temperature_f = sample.temperature,
            humidity_pct = sample.humidity,
            "Sample"
        );

        self.stream(&sample).await;

        let thresholds = settings.thresholds();
        let breaches = thresholds.evaluate(&sample);
        let mut notifications = Vec::with_capacity(breaches.len());

        for kind in &breaches {
            metrics::counter!("thermowatch_breaches_total", "kind" => kind.as_str()).increment(1);
            warn!(kind = %kind, at = %sample.observed_at, "{}", kind.description());

            let event = AlertEvent {
                kind: *kind,
                sample,
                cooldown_minutes: settings.mins_between_emails,
            };

            let result = self.notifier.try_notify(&event, &thresholds).await;
            if let Err(e) = &result {
                error!(kind = %kind, error = %e, "Failed to send warning");
            }
            notifications.push((*kind, result));
        }

        Ok(CycleReport {
            sample,
            breaches,
            notifications,
        })
    }

    async fn stream(&self, sample: &Sample) {
        self.telemetry.record(TEMPERATURE_LABEL, sample.temperature);
        self.telemetry.record(HUMIDITY_LABEL, sample.humidity);

        if let Err(e) = self.telemetry.flush().await {
            warn!(error = %e, "Failed to stream sample");
        }
    }
}
