//! Notification delivery for alerts
//!
//! The [`Notifier`] owns the cooldown state. A call to
//! [`Notifier::try_notify`] checks the window, delivers to every recipient and
//! records the send as one critical section, so concurrent callers sharing a
//! notifier still produce at most one email per window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::models::{AlertEvent, DeliveryRecord, Thresholds};
use crate::retry::RetryPolicy;

use super::cooldown::{Cooldown, CooldownState, NotificationState};
use super::mail::{MailError, MailTransport, OutgoingMail};
use super::recipients::RecipientStore;
use super::template::EmailTemplate;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Could not log into the mail server within the retry budget
    #[error("mail transport unavailable after {attempts} attempts: {last_error}")]
    TransportUnavailable {
        /// Login attempts made
        attempts: u32,
        /// Final login failure
        last_error: MailError,
    },

    /// Recipient list could not be read
    #[error("could not load recipients: {0}")]
    Recipients(String),
}

/// Outcome of a notification attempt
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// Delivery was attempted and the cooldown restarted
    Sent(DeliveryReport),
    /// Cooldown still running, nothing sent
    Suppressed {
        /// Time left in the window
        remaining: Duration,
    },
}

impl NotifyOutcome {
    /// Whether this call went through to delivery
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Per-recipient results of one send
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    /// When the cooldown was restarted
    pub sent_at: DateTime<Utc>,
    /// One record per recipient, in list order
    pub deliveries: Vec<DeliveryRecord>,
}

impl DeliveryReport {
    /// Recipients that got the email
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.success).count()
    }

    /// Recipients that did not
    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }
}

/// Mail account the notifier sends from
#[derive(Debug, Clone)]
pub struct MailAccount {
    /// Sender address, also the login name
    pub sender: String,
    /// Login password
    pub password: String,
}

/// Gates and dispatches threshold-breach emails
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    recipients: Arc<dyn RecipientStore>,
    template: EmailTemplate,
    account: MailAccount,
    login_retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<NotificationState>,
}

impl Notifier {
    /// Create a notifier that has never sent anything
    pub fn new(
        transport: Arc<dyn MailTransport>,
        recipients: Arc<dyn RecipientStore>,
        account: MailAccount,
    ) -> Self {
        Self {
            transport,
            recipients,
            template: EmailTemplate::default(),
            account,
            login_retry: RetryPolicy::exponential(
                5,
                std::time::Duration::from_secs(10),
                std::time::Duration::from_secs(300),
            ),
            clock: Arc::new(SystemClock),
            state: Mutex::new(NotificationState::new()),
        }
    }

    /// Use a custom email template
    pub fn with_template(mut self, template: EmailTemplate) -> Self {
        self.template = template;
        self
    }

    /// Retry policy for mail server login
    pub fn with_login_retry(mut self, policy: RetryPolicy) -> Self {
        self.login_retry = policy;
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// When the last notification went out
    pub async fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_sent_at()
    }

    /// Current position in the cooldown window
    pub async fn cooldown_state(&self, cooldown_minutes: f64) -> CooldownState {
        let state = self.state.lock().await;
        state.state_at(self.clock.now(), Cooldown::from_minutes(cooldown_minutes))
    }

    /// Send a warning for `event` unless the cooldown window is still running.
    ///
    /// Every recipient is tried even if earlier ones fail. Once delivery has
    /// been attempted the cooldown restarts regardless of how many deliveries
    /// succeeded, including when the recipient list is empty. Login and
    /// recipient-list failures happen before any delivery and leave the
    /// cooldown untouched.
    pub async fn try_notify(
        &self,
        event: &AlertEvent,
        thresholds: &Thresholds,
    ) -> Result<NotifyOutcome, NotifyError> {
        let mut state = self.state.lock().await;

        let cooldown = Cooldown::from_minutes(event.cooldown_minutes);
        if let CooldownState::CooldownActive { remaining } = state.state_at(self.clock.now(), cooldown) {
            info!(
                kind = %event.kind,
                "waiting {} to send next email",
                format_remaining(remaining)
            );
            metrics::counter!("thermowatch_notifications_suppressed_total").increment(1);
            return Ok(NotifyOutcome::Suppressed { remaining });
        }

        let recipients = self
            .recipients
            .load()
            .await
            .map_err(|e| NotifyError::Recipients(e.to_string()))?;

        let deliveries = if recipients.is_empty() {
            warn!(kind = %event.kind, "Recipient list is empty, no warning emails sent");
            Vec::new()
        } else {
            self.login().await?;
            self.deliver(event, thresholds, &recipients).await
        };

        let sent_at = self.clock.now();
        state.record_send(sent_at);

        let report = DeliveryReport {
            sent_at,
            deliveries,
        };

        metrics::counter!("thermowatch_notifications_sent_total").increment(1);
        info!(
            kind = %event.kind,
            delivered = report.delivered(),
            failed = report.failed(),
            "Warning notification sent"
        );

        Ok(NotifyOutcome::Sent(report))
    }

    async fn login(&self) -> Result<(), NotifyError> {
        let account = &self.account;
        let transport = &self.transport;

        match self
            .login_retry
            .run("mail login", |_| transport.authenticate(&account.sender, &account.password))
            .await
        {
            Ok(()) => {
                info!(account = %account.sender, "login to email account succeeded");
                Ok(())
            }
            Err(exhausted) => {
                error!(
                    account = %account.sender,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "login to email account failed"
                );
                Err(NotifyError::TransportUnavailable {
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error,
                })
            }
        }
    }

    async fn deliver(
        &self,
        event: &AlertEvent,
        thresholds: &Thresholds,
        recipients: &[String],
    ) -> Vec<DeliveryRecord> {
        let mail = OutgoingMail {
            from: self.account.sender.clone(),
            subject: event.kind.subject().to_string(),
            html_body: self.template.render(event, thresholds, recipients),
        };

        let mut deliveries = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let result = self.transport.send(&mail, recipient).await;
            let sent_at = self.clock.now();

            match &result {
                Ok(()) => {
                    info!(recipient = %recipient, at = %sent_at, "Warning email sent");
                }
                Err(e) => {
                    metrics::counter!("thermowatch_deliveries_failed_total").increment(1);
                    error!(recipient = %recipient, error = %e, "Warning email failed");
                }
            }

            deliveries.push(DeliveryRecord {
                recipient: recipient.clone(),
                sent_at,
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        deliveries
    }
}

fn format_remaining(remaining: Duration) -> String {
    let remaining = remaining.to_std().unwrap_or_default();
    // Whole seconds are plenty for a log line.
    humantime::format_duration(std::time::Duration::from_secs(remaining.as_secs())).to_string()
}
