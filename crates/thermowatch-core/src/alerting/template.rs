//! Warning email rendering
//!
//! Templates are HTML with `{name}` placeholders. Unknown placeholders are
//! left untouched so a typo shows up in the delivered mail instead of
//! silently vanishing.

use std::path::Path;

use chrono::Local;

use crate::error::Result;
use crate::models::{AlertEvent, Thresholds};

/// Template used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = r#"<html>
  <body>
    <h2>{reason}</h2>
    <p>Reading taken {date}:</p>
    <ul>
      <li>Temperature: {temp}&deg;F (allowed {min_temp}&ndash;{max_temp}&deg;F)</li>
      <li>Humidity: {humidity}% (allowed {min_humidity}&ndash;{max_humidity}%)</li>
    </ul>
    <p>No further warnings will be sent for the next {min_notify} minutes.</p>
    <p>This warning was sent to:</p>
    <ul>{list_emails}</ul>
  </body>
</html>
"#;

/// HTML email template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    source: String,
}

impl Default for EmailTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl EmailTemplate {
    /// Use `source` as the template text
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Read the template from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }

    /// Load from `path` if given, else the built-in template
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Render the body for an alert sent to `recipients`
    pub fn render(&self, event: &AlertEvent, thresholds: &Thresholds, recipients: &[String]) -> String {
        let list_emails: String = recipients
            .iter()
            .map(|r| format!("<li>{}</li>", escape_html(r)))
            .collect();

        let date = event
            .sample
            .observed_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let values = [
            ("reason", event.kind.description().to_string()),
            ("list_emails", list_emails),
            ("temp", format!("{:.2}", event.sample.temperature)),
            ("humidity", format!("{:.2}", event.sample.humidity)),
            ("date", date),
            ("min_temp", thresholds.min_temp.to_string()),
            ("max_temp", thresholds.max_temp.to_string()),
            ("min_humidity", thresholds.min_humidity.to_string()),
            ("max_humidity", thresholds.max_humidity.to_string()),
            ("min_notify", event.cooldown_minutes.to_string()),
        ];

        let mut body = self.source.clone();
        for (name, value) in values {
            body = body.replace(&format!("{{{name}}}"), &value);
        }
        body
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, Sample};
    use chrono::Utc;

    fn event() -> AlertEvent {
        AlertEvent {
            kind: AlertKind::TempHigh,
            sample: Sample {
                temperature: 88.4,
                humidity: 41.0,
                observed_at: Utc::now(),
            },
            cooldown_minutes: 30.0,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            min_temp: 60.0,
            max_temp: 85.0,
            min_humidity: 30.0,
            max_humidity: 70.5,
            temp_warnings_enabled: true,
            humidity_warnings_enabled: true,
        }
    }

    #[test]
    fn test_render_custom_template() {
        let template = EmailTemplate::new(
            "{temp}|{humidity}|{min_temp}-{max_temp}|{min_humidity}-{max_humidity}|{min_notify}|{list_emails}",
        );

        let body = template.render(
            &event(),
            &thresholds(),
            &["a@x.com".to_string(), "b@x.com".to_string()],
        );

        assert_eq!(
            body,
            "88.40|41.00|60-85|30-70.5|30|<li>a@x.com</li><li>b@x.com</li>"
        );
    }

    #[test]
    fn test_default_template_mentions_reason() {
        let body = EmailTemplate::default().render(&event(), &thresholds(), &[]);

        assert!(body.contains("Temperature has gone above the recommended level"));
        assert!(body.contains("88.40"));
        assert!(!body.contains("{temp}"));
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        let body = EmailTemplate::new("{temp} {nope}").render(&event(), &thresholds(), &[]);
        assert_eq!(body, "88.40 {nope}");
    }

    #[test]
    fn test_recipients_are_escaped() {
        let body = EmailTemplate::new("{list_emails}").render(
            &event(),
            &thresholds(),
            &["<script>@x.com".to_string()],
        );
        assert_eq!(body, "<li>&lt;script&gt;@x.com</li>");
    }

    #[test]
    fn test_load_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "<b>{temp}</b>").unwrap();

        let template = EmailTemplate::load(Some(file.path())).unwrap();
        assert_eq!(template.render(&event(), &thresholds(), &[]), "<b>88.40</b>");
    }
}
