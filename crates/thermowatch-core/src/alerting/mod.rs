//! Alerting for Thermowatch
//!
//! Threshold-breach emails, rate limited by a cooldown window.

mod cooldown;
mod mail;
mod notifier;
mod recipients;
mod template;

pub use cooldown::{Cooldown, CooldownState, NotificationState};
pub use mail::{MailError, MailTransport, OutgoingMail, SmtpMailer};
pub use notifier::{DeliveryReport, MailAccount, NotifyError, NotifyOutcome, Notifier};
pub use recipients::{FileRecipientStore, RecipientStore};
pub use template::{EmailTemplate, DEFAULT_TEMPLATE};
