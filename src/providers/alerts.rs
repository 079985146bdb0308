//! Active weather alerts client.
//!
//! Alerts carry their own active windows. Whether an alert matters for a
//! request is decided later by the relevance evaluator (window intersection
//! with the planning window); this client only normalizes the feed. Onset and
//! expiry parse to `Option`; a malformed timestamp is "unknown", and an
//! unknown-window alert is treated conservatively downstream.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use tracing::debug;

use crate::model::SafetyRequest;
use crate::providers::Fetched;

/// Base URL for the alerts API.
const ALERTS_API_BASE: &str = "https://api.weather.gov";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// A normalized active alert.
#[derive(Debug, Clone)]
pub struct ActiveAlert {
    pub event: String,
    pub severity: AlertSeverity,
    pub headline: Option<String>,
    pub onset: Option<DateTime<FixedOffset>>,
    pub expires: Option<DateTime<FixedOffset>>,
}

impl ActiveAlert {
    /// Whether this alert's active window intersects [start, end).
    ///
    /// Unknown bounds are treated as open: an alert with no expiry is assumed
    /// still active, one with no onset assumed already begun.
    pub fn intersects(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> bool {
        let begins_before_end = self.onset.map_or(true, |onset| onset < end);
        let ends_after_start = self.expires.map_or(true, |expires| expires > start);
        begins_before_end && ends_after_start
    }
}

/// Alert severity per the upstream scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl AlertSeverity {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Minor" => Some(AlertSeverity::Minor),
            "Moderate" => Some(AlertSeverity::Moderate),
            "Severe" => Some(AlertSeverity::Severe),
            "Extreme" => Some(AlertSeverity::Extreme),
            _ => None,
        }
    }
}

/// Client for the alerts feed.
#[derive(Clone)]
pub struct AlertsClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for AlertsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertsClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: ALERTS_API_BASE.to_string(),
        }
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Run the chain. Never returns an error.
    pub async fn fetch(&self, request: &SafetyRequest) -> Fetched<Vec<ActiveAlert>> {
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_active(request)).await {
            Ok(Ok(alerts)) => Fetched::ok(alerts),
            Ok(Err(e)) => {
                debug!(error = %e, "alerts fetch failed");
                Fetched::zeroed("alerts: feed unavailable")
            }
            Err(_) => {
                debug!("alerts fetch timed out");
                Fetched::zeroed("alerts: feed timed out")
            }
        }
    }

    async fn fetch_active(&self, request: &SafetyRequest) -> anyhow::Result<Vec<ActiveAlert>> {
        let url = format!(
            "{}/alerts/active?point={},{}",
            self.base_url, request.latitude, request.longitude
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("alerts API returned status {}", response.status());
        }
        let body = response.json::<AlertsResponse>().await?;

        let alerts = body
            .features
            .into_iter()
            .map(|f| {
                let p = f.properties;
                ActiveAlert {
                    event: p.event.unwrap_or_else(|| "Unknown".to_string()),
                    severity: p
                        .severity
                        .as_deref()
                        .and_then(AlertSeverity::parse)
                        .unwrap_or(AlertSeverity::Minor),
                    headline: p.headline,
                    onset: p
                        .onset
                        .as_deref()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
                    expires: p
                        .expires
                        .as_deref()
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
                }
            })
            .collect();

        Ok(alerts)
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    #[serde(default)]
    properties: AlertProperties,
}

#[derive(Debug, Default, Deserialize)]
struct AlertProperties {
    #[serde(default)]
    event: Option<String>,

    #[serde(default)]
    severity: Option<String>,

    #[serde(default)]
    headline: Option<String>,

    #[serde(default)]
    onset: Option<String>,

    #[serde(default)]
    expires: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn alert(onset: Option<&str>, expires: Option<&str>) -> ActiveAlert {
        ActiveAlert {
            event: "Winter Storm Warning".into(),
            severity: AlertSeverity::Severe,
            headline: None,
            onset: onset.map(dt),
            expires: expires.map(dt),
        }
    }

    #[test]
    fn test_overlapping_alert_intersects() {
        let a = alert(
            Some("2026-02-14T06:00:00-07:00"),
            Some("2026-02-14T18:00:00-07:00"),
        );
        assert!(a.intersects(
            dt("2026-02-14T07:00:00-07:00"),
            dt("2026-02-14T19:00:00-07:00")
        ));
    }

    #[test]
    fn test_alert_after_window_does_not_intersect() {
        // Alert starts after the travel window ends.
        let a = alert(
            Some("2026-02-14T21:00:00-07:00"),
            Some("2026-02-15T06:00:00-07:00"),
        );
        assert!(!a.intersects(
            dt("2026-02-14T07:00:00-07:00"),
            dt("2026-02-14T19:00:00-07:00")
        ));
    }

    #[test]
    fn test_expired_alert_does_not_intersect() {
        let a = alert(
            Some("2026-02-13T06:00:00-07:00"),
            Some("2026-02-14T05:00:00-07:00"),
        );
        assert!(!a.intersects(
            dt("2026-02-14T07:00:00-07:00"),
            dt("2026-02-14T19:00:00-07:00")
        ));
    }

    #[test]
    fn test_unknown_bounds_treated_as_open() {
        let a = alert(None, None);
        assert!(a.intersects(
            dt("2026-02-14T07:00:00-07:00"),
            dt("2026-02-14T19:00:00-07:00")
        ));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Extreme > AlertSeverity::Severe);
        assert!(AlertSeverity::Severe > AlertSeverity::Moderate);
        assert!(AlertSeverity::Moderate > AlertSeverity::Minor);
    }

    #[test]
    fn test_unknown_severity_parses_to_none() {
        assert_eq!(AlertSeverity::parse("Unknown"), None);
        assert_eq!(AlertSeverity::parse("Severe"), Some(AlertSeverity::Severe));
    }

    #[tokio::test]
    async fn test_fetch_zeroes_when_unreachable() {
        let client = AlertsClient::with_base_url("http://127.0.0.1:1");
        let request = SafetyRequest {
            latitude: 40.55,
            longitude: -111.7,
            date: chrono::NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            start_time: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };

        let fetched = client.fetch(&request).await;
        assert_eq!(fetched.status, crate::model::ProviderStatus::Zeroed);
    }
}
