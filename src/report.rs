use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::{fmt::Write as _, io::Write as _, path::PathBuf, time::Duration};
use tracing::{error, info};

use crate::error::{PadError, Result};

/// Timeout for webhook HTTP requests
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Totals for one finished session, handed to the reporting boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionReport {
    /// When the session began; `None` if the start was never observed
    pub start_ts: Option<DateTime<Utc>>,
    /// Accumulated walking time
    pub duration: Duration,
    /// Accumulated steps
    pub steps: u64,
    /// Accumulated distance in kilometers
    pub distance_km: f64,
}

/// Reporting boundary consulted when the belt stops
///
/// The returned boolean states whether the session was actually delivered;
/// the driver only resets its since-start accumulators on `true`, so skipped
/// or failed deliveries carry forward into the next stop event.
#[async_trait]
pub trait SessionReporter: Send + Sync {
    /// Attempt to deliver the session totals
    ///
    /// # Errors
    ///
    /// Returns an error if delivery was attempted and failed. Skipping
    /// delivery (no target configured, session too short) is `Ok(false)`.
    async fn report(&self, report: &SessionReport) -> Result<bool>;
}

/// Webhook-based [`SessionReporter`] with an append-only JSONL audit log
///
/// The configured URL is a template; `{start_ts}`, `{duration_min}`,
/// `{steps}` and `{distance_km}` are substituted (query-escaped) before the
/// GET request. Every attempt is appended to the log file regardless of
/// outcome.
pub struct WebhookReporter {
    url: Option<String>,
    threshold: Duration,
    client: reqwest::Client,
    log_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct WebhookLogRecord {
    timestamp: DateTime<Utc>,
    url: String,
    status: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    err: String,
    start_ts: Option<DateTime<Utc>>,
    duration_min: f64,
    steps: u64,
    distance_km: f64,
}

impl WebhookReporter {
    /// Create a reporter for the given URL template and minimum session
    /// duration
    ///
    /// With `url == None` every report is skipped (but the threshold check
    /// is not logged either — there is nothing to deliver to).
    #[must_use]
    pub fn new(url: Option<String>, threshold: Duration) -> Self {
        Self {
            url,
            threshold,
            client: reqwest::Client::new(),
            log_path: dirs::config_dir().map(|dir| dir.join("walkingpad_webhooks.jsonl")),
        }
    }

    /// Override the audit log location (mainly for tests)
    #[must_use]
    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    fn append_log(&self, record: &WebhookLogRecord) -> Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    async fn deliver(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(PadError::WebhookStatus { status });
        }
        Ok(status)
    }
}

#[async_trait]
impl SessionReporter for WebhookReporter {
    async fn report(&self, report: &SessionReport) -> Result<bool> {
        let Some(template) = &self.url else {
            return Ok(false);
        };

        let Some(start_ts) = report.start_ts else {
            info!("skip webhook: session start never observed");
            return Ok(false);
        };
        let wall_elapsed = (Utc::now() - start_ts).to_std().unwrap_or_default();
        if wall_elapsed < self.threshold {
            info!("skip webhook: session length too short");
            return Ok(false);
        }

        let url = render_url(template, report);
        info!(url = %url, "send webhook");

        let outcome = self.deliver(&url).await;
        let record = WebhookLogRecord {
            timestamp: Utc::now(),
            url,
            status: match &outcome {
                Ok(status) => *status,
                Err(PadError::WebhookStatus { status }) => *status,
                Err(_) => 0,
            },
            err: outcome.as_ref().err().map(ToString::to_string).unwrap_or_default(),
            start_ts: report.start_ts,
            duration_min: report.duration.as_secs_f64() / 60.0,
            steps: report.steps,
            distance_km: report.distance_km,
        };
        if let Err(err) = self.append_log(&record) {
            error!(error = %err, "failed to append webhook log");
        }

        outcome.map(|_| true)
    }
}

/// Substitute the session placeholders into a URL template
#[must_use]
pub fn render_url(template: &str, report: &SessionReport) -> String {
    let start_ts = report
        .start_ts
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    template
        .replace("{start_ts}", &query_escape(&start_ts))
        .replace(
            "{duration_min}",
            &query_escape(&format!("{:.2}", report.duration.as_secs_f64() / 60.0)),
        )
        .replace("{steps}", &query_escape(&report.steps.to_string()))
        .replace(
            "{distance_km}",
            &query_escape(&format!("{:.2}", report.distance_km)),
        )
}

fn query_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                escaped.push(char::from(byte));
            }
            b' ' => escaped.push('+'),
            _ => {
                let _ = write!(escaped, "%{byte:02X}");
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_report() -> SessionReport {
        SessionReport {
            start_ts: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
            duration: Duration::from_secs(1800),
            steps: 3500,
            distance_km: 2.25,
        }
    }

    #[test]
    fn test_render_url_substitutes_placeholders() {
        let url = render_url(
            "https://example.com/log?start={start_ts}&min={duration_min}&steps={steps}&km={distance_km}",
            &sample_report(),
        );
        assert_eq!(
            url,
            "https://example.com/log?start=2024-03-01T09%3A30%3A00Z&min=30.00&steps=3500&km=2.25"
        );
    }

    #[test]
    fn test_render_url_without_placeholders_is_identity() {
        let url = render_url("https://example.com/ping", &sample_report());
        assert_eq!(url, "https://example.com/ping");
    }

    #[test]
    fn test_query_escape() {
        assert_eq!(query_escape("plain-text_1.0~"), "plain-text_1.0~");
        assert_eq!(query_escape("a b"), "a+b");
        assert_eq!(query_escape("1:2+3"), "1%3A2%2B3");
    }

    #[tokio::test]
    async fn test_no_url_skips() {
        let reporter = WebhookReporter::new(None, Duration::ZERO);
        let sent = reporter.report(&sample_report()).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_short_session_skips() {
        let reporter = WebhookReporter::new(
            Some("https://example.com/{steps}".to_string()),
            Duration::from_secs(300),
        );
        let report = SessionReport {
            start_ts: Some(Utc::now()),
            ..sample_report()
        };
        let sent = reporter.report(&report).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_unobserved_start_skips() {
        let reporter =
            WebhookReporter::new(Some("https://example.com".to_string()), Duration::ZERO);
        let report = SessionReport {
            start_ts: None,
            ..sample_report()
        };
        let sent = reporter.report(&report).await.unwrap();
        assert!(!sent);
    }

    #[test]
    fn test_log_record_shape() {
        let record = WebhookLogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            url: "https://example.com".to_string(),
            status: 200,
            err: String::new(),
            start_ts: sample_report().start_ts,
            duration_min: 30.0,
            steps: 3500,
            distance_km: 2.25,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":200"));
        assert!(json.contains("\"steps\":3500"));
        // empty error string is omitted entirely
        assert!(!json.contains("\"err\""));
    }
}
