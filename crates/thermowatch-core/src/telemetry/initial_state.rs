//! Initial State streaming client

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{TelemetryError, TelemetrySink};
use crate::config::TelemetryCredentials;

const ACCESS_KEY_HEADER: &str = "X-IS-AccessKey";
const BUCKET_KEY_HEADER: &str = "X-IS-BucketKey";
const ACCEPT_VERSION: &str = "~0";

/// Events kept across failed flushes before the oldest are dropped
const MAX_BUFFERED: usize = 500;

/// Streams samples to an Initial State bucket
pub struct InitialStateStreamer {
    client: Client,
    credentials: TelemetryCredentials,
    buffer: Mutex<Vec<StreamEvent>>,
}

#[derive(Debug, Clone, Serialize)]
struct StreamEvent {
    key: String,
    value: f64,
    epoch: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BucketPayload<'a> {
    bucket_key: &'a str,
    bucket_name: &'a str,
}

impl InitialStateStreamer {
    /// Create a new streamer
    pub fn new(credentials: TelemetryCredentials) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            credentials,
            buffer: Mutex::new(Vec::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.endpoint.trim_end_matches('/'), path)
    }

    /// Create the bucket if it does not exist yet
    pub async fn ensure_bucket(&self) -> Result<(), TelemetryError> {
        let payload = BucketPayload {
            bucket_key: &self.credentials.bucket_key,
            bucket_name: &self.credentials.bucket_name,
        };

        let response = self
            .client
            .post(self.url("/api/buckets"))
            .header(ACCESS_KEY_HEADER, &self.credentials.access_key)
            .header("Accept-Version", ACCEPT_VERSION)
            .json(&payload)
            .send()
            .await?;

        check_status(response).await?;

        info!(bucket_key = %self.credentials.bucket_key, "Telemetry bucket ready");
        Ok(())
    }

    /// Number of events waiting to be flushed
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    fn requeue(&self, mut events: Vec<StreamEvent>) {
        let mut buffer = self.buffer.lock();
        events.append(&mut buffer);
        if events.len() > MAX_BUFFERED {
            let excess = events.len() - MAX_BUFFERED;
            events.drain(..excess);
            warn!(dropped = excess, "Telemetry buffer full, dropping oldest events");
        }
        *buffer = events;
    }
}

#[async_trait]
impl TelemetrySink for InitialStateStreamer {
    fn record(&self, label: &str, value: f64) {
        let now = Utc::now();
        let epoch = now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0;

        self.buffer.lock().push(StreamEvent {
            key: label.to_string(),
            value,
            epoch,
        });
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        let events = std::mem::take(&mut *self.buffer.lock());
        if events.is_empty() {
            return Ok(());
        }

        let result: Result<(), TelemetryError> = async {
            let response = self
                .client
                .post(self.url("/api/events"))
                .header(ACCESS_KEY_HEADER, &self.credentials.access_key)
                .header(BUCKET_KEY_HEADER, &self.credentials.bucket_key)
                .header("Accept-Version", ACCEPT_VERSION)
                .json(&events)
                .send()
                .await?;
            check_status(response).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(count = events.len(), "Telemetry flushed");
                Ok(())
            }
            Err(e) => {
                self.requeue(events);
                Err(e)
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), TelemetryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(TelemetryError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{HUMIDITY_LABEL, TEMPERATURE_LABEL};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(endpoint: &str) -> TelemetryCredentials {
        TelemetryCredentials {
            endpoint: endpoint.to_string(),
            bucket_key: "server-room".to_string(),
            bucket_name: "Server Room".to_string(),
            access_key: "ist_abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_flush_posts_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/events"))
            .and(header(ACCESS_KEY_HEADER, "ist_abc123"))
            .and(header(BUCKET_KEY_HEADER, "server-room"))
            .and(body_partial_json(serde_json::json!([
                { "key": "Temperature(F)", "value": 72.5 },
                { "key": "Humidity(%)", "value": 41.0 }
            ])))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let streamer = InitialStateStreamer::new(credentials(&server.uri())).unwrap();
        streamer.record(TEMPERATURE_LABEL, 72.5);
        streamer.record(HUMIDITY_LABEL, 41.0);

        streamer.flush().await.unwrap();
        assert_eq!(streamer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let streamer = InitialStateStreamer::new(credentials(&server.uri())).unwrap();
        streamer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_flush_keeps_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/events"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad access key"))
            .mount(&server)
            .await;

        let streamer = InitialStateStreamer::new(credentials(&server.uri())).unwrap();
        streamer.record(TEMPERATURE_LABEL, 70.0);

        let err = streamer.flush().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Rejected { status: 401, .. }));
        assert_eq!(streamer.buffered(), 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_drop_oldest_beyond_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/events"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let streamer = InitialStateStreamer::new(credentials(&server.uri())).unwrap();
        for i in 0..400 {
            streamer.record(TEMPERATURE_LABEL, f64::from(i));
        }
        assert!(streamer.flush().await.is_err());
        assert_eq!(streamer.buffered(), 400);

        for i in 400..600 {
            streamer.record(TEMPERATURE_LABEL, f64::from(i));
        }
        assert!(streamer.flush().await.is_err());
        assert_eq!(streamer.buffered(), MAX_BUFFERED);

        let values: Vec<f64> = streamer.buffer.lock().iter().map(|e| e.value).collect();
        assert_eq!(values.first(), Some(&100.0));
        assert_eq!(values.last(), Some(&599.0));
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_ensure_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/buckets"))
            .and(header(ACCESS_KEY_HEADER, "ist_abc123"))
            .and(body_partial_json(serde_json::json!({
                "bucketKey": "server-room",
                "bucketName": "Server Room"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let streamer = InitialStateStreamer::new(credentials(&server.uri())).unwrap();
        streamer.ensure_bucket().await.unwrap();
    }
}
