//! Thermowatch CLI
//!
//! Command-line interface for the Thermowatch sensor monitor.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use thermowatch::alerting::{
    EmailTemplate, FileRecipientStore, MailAccount, Notifier, NotifyOutcome, RecipientStore,
    SmtpMailer,
};
use thermowatch::config::{Settings, SettingsProvider, SettingsStore, DEFAULT_SETTINGS_PATH};
use thermowatch::models::{AlertEvent, AlertKind, Sample};
use thermowatch::monitor::Monitor;
use thermowatch::sensor::{self, IioDhtSensor};
use thermowatch::telemetry::{InitialStateStreamer, LogSink, TelemetrySink};

/// Thermowatch - temperature and humidity monitoring with email alerts
#[derive(Parser)]
#[command(name = "thermowatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file path
    #[arg(short, long, global = true, env = "THERMOWATCH_CONFIG", default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum KindArg {
    TempHigh,
    TempLow,
    HumidityHigh,
    HumidityLow,
}

impl From<KindArg> for AlertKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::TempHigh => AlertKind::TempHigh,
            KindArg::TempLow => AlertKind::TempLow,
            KindArg::HumidityHigh => AlertKind::HumidityHigh,
            KindArg::HumidityLow => AlertKind::HumidityLow,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling loop
    Run,

    /// Take a single sensor reading
    Read,

    /// Send one warning email to the distribution list
    TestEmail {
        /// Breach kind to report
        #[arg(long, value_enum, default_value = "temp-high")]
        kind: KindArg,

        /// Temperature to report in Fahrenheit (reads the sensor if omitted)
        #[arg(long, requires = "humidity")]
        temperature: Option<f64>,

        /// Humidity to report in percent
        #[arg(long, requires = "temperature")]
        humidity: Option<f64>,
    },

    /// List warning recipients
    Recipients,

    /// Inspect settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print all settings (secrets masked)
    Show,

    /// Print one setting by key
    Get {
        /// Settings-file key, e.g. max_temp or BUCKET_KEY
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Pick up .env before clap reads THERMOWATCH_CONFIG
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let store = match SettingsStore::open(&cli.config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error loading settings from {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    let settings = store.current();

    // Initialize logging
    let _log_guard = match init_logging(&settings, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => run_monitor(store).await,
        Commands::Read => run_read(&settings, cli.format).await,
        Commands::TestEmail {
            kind,
            temperature,
            humidity,
        } => run_test_email(&settings, kind.into(), temperature.zip(humidity)).await,
        Commands::Recipients => run_recipients(&settings, cli.format).await,
        Commands::Config { command } => run_config(&settings, command, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(settings: &Settings, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let level = if verbose { "debug" } else { settings.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let dir = settings
        .log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = settings
        .log_file
        .file_name()
        .with_context(|| format!("log_file {} has no file name", settings.log_file.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if settings.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(guard)
}

fn build_notifier(settings: &Settings) -> anyhow::Result<Notifier> {
    let template = EmailTemplate::load(settings.email_template.as_deref())
        .context("loading email template")?;

    Ok(Notifier::new(
        Arc::new(SmtpMailer::new(&settings.smtp_host, settings.smtp_port)),
        Arc::new(FileRecipientStore::new(&settings.emails_path)),
        MailAccount {
            sender: settings.email_sender.clone(),
            password: settings.email_password.clone(),
        },
    )
    .with_template(template)
    .with_login_retry(settings.mail_login_retry()))
}

async fn build_telemetry(settings: &Settings) -> Arc<dyn TelemetrySink> {
    let Some(credentials) = settings.telemetry_credentials() else {
        info!("Telemetry credentials not configured, streaming disabled");
        return Arc::new(LogSink::new());
    };

    match InitialStateStreamer::new(credentials) {
        Ok(streamer) => {
            if let Err(e) = streamer.ensure_bucket().await {
                warn!(error = %e, "Could not create telemetry bucket, will keep trying to stream");
            }
            Arc::new(streamer)
        }
        Err(e) => {
            warn!(error = %e, "Failed to create telemetry client, streaming disabled");
            Arc::new(LogSink::new())
        }
    }
}

async fn run_monitor(store: Arc<SettingsStore>) -> anyhow::Result<()> {
    let settings = store.current();

    if let Some(addr) = settings.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("starting Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let notifier = Arc::new(build_notifier(&settings)?);
    let telemetry = build_telemetry(&settings).await;
    let sensor = Arc::new(IioDhtSensor::new(&settings.sensor_device));

    info!(
        device = %settings.sensor_device.display(),
        interval_secs = settings.secs_between_reads,
        cooldown_mins = settings.mins_between_emails,
        "Starting Thermowatch"
    );

    let monitor = Monitor::new(store, sensor, telemetry, notifier);
    monitor.run().await?;
    Ok(())
}

async fn run_read(settings: &Settings, format: OutputFormat) -> anyhow::Result<()> {
    let sensor = IioDhtSensor::new(&settings.sensor_device);
    let reading = sensor::read_with_retry(&sensor, &settings.sensor_retry()).await?;
    let sample = Sample::from_reading(reading, chrono::Utc::now());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sample)?),
        OutputFormat::Text => {
            println!("Temperature(F): {:.2}", sample.temperature);
            println!("Humidity(%): {:.2}", sample.humidity);
        }
    }
    Ok(())
}

async fn run_test_email(
    settings: &Settings,
    kind: AlertKind,
    values: Option<(f64, f64)>,
) -> anyhow::Result<()> {
    let sample = match values {
        Some((temperature, humidity)) => Sample {
            temperature,
            humidity,
            observed_at: chrono::Utc::now(),
        },
        None => {
            let sensor = IioDhtSensor::new(&settings.sensor_device);
            let reading = sensor::read_with_retry(&sensor, &settings.sensor_retry()).await?;
            Sample::from_reading(reading, chrono::Utc::now())
        }
    };

    let event = AlertEvent {
        kind,
        sample,
        cooldown_minutes: settings.mins_between_emails,
    };

    // A fresh notifier has never sent, so this always goes through.
    let notifier = build_notifier(settings)?;
    match notifier.try_notify(&event, &settings.thresholds()).await? {
        NotifyOutcome::Sent(report) => {
            for delivery in &report.deliveries {
                match &delivery.error {
                    None => println!("sent to {}", delivery.recipient),
                    Some(e) => println!("FAILED {}: {e}", delivery.recipient),
                }
            }
            if report.deliveries.is_empty() {
                println!("recipient list {} is empty", settings.emails_path.display());
            }
        }
        NotifyOutcome::Suppressed { remaining } => {
            println!("suppressed, {}s left in cooldown", remaining.num_seconds());
        }
    }
    Ok(())
}

async fn run_recipients(settings: &Settings, format: OutputFormat) -> anyhow::Result<()> {
    let recipients = FileRecipientStore::new(&settings.emails_path).load().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recipients)?),
        OutputFormat::Text => {
            for recipient in &recipients {
                println!("{recipient}");
            }
        }
    }
    Ok(())
}

fn run_config(settings: &Settings, command: ConfigCommands, format: OutputFormat) -> anyhow::Result<()> {
    let redacted = settings.redacted();

    match command {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&redacted)?);
        }
        ConfigCommands::Get { key } => {
            let value = redacted
                .get(&key)
                .with_context(|| format!("unknown setting {key:?}"))?;
            match (format, &value) {
                (OutputFormat::Text, serde_json::Value::String(s)) => println!("{s}"),
                _ => println!("{value}"),
            }
        }
    }
    Ok(())
}
