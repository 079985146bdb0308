//! Air quality (AQI) client.
//!
//! Single-tier chain: the current US AQI and primary pollutant for the
//! request point. Any failure zeroes the envelope; an absent AQI stays
//! `None`, never a number that looks like clean air.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::model::SafetyRequest;
use crate::providers::Fetched;

/// Base URL for the air quality API.
const AIR_QUALITY_API_BASE: &str = "https://air-quality-api.open-meteo.com/v1";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Normalized air quality reading.
#[derive(Debug, Clone)]
pub struct AirQualityData {
    /// Current US AQI. `None` means unknown.
    pub aqi: Option<f64>,

    /// Dominant pollutant label, when reported.
    pub primary_pollutant: Option<String>,
}

impl AirQualityData {
    /// Plain-language AQI band, when the index is known.
    pub fn band(&self) -> Option<&'static str> {
        let aqi = self.aqi?;
        Some(match aqi {
            a if a <= 50.0 => "Good",
            a if a <= 100.0 => "Moderate",
            a if a <= 150.0 => "Unhealthy for Sensitive Groups",
            a if a <= 200.0 => "Unhealthy",
            a if a <= 300.0 => "Very Unhealthy",
            _ => "Hazardous",
        })
    }
}

/// Client for the air quality feed.
#[derive(Clone)]
pub struct AirQualityClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for AirQualityClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AirQualityClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: AIR_QUALITY_API_BASE.to_string(),
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
    pub async fn fetch(&self, request: &SafetyRequest) -> Fetched<AirQualityData> {
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_current(request)).await {
            Ok(Ok(data)) => Fetched::ok(data),
            Ok(Err(e)) => {
                debug!(error = %e, "air quality fetch failed");
                Fetched::zeroed("air quality: feed unavailable")
            }
            Err(_) => {
                debug!("air quality fetch timed out");
                Fetched::zeroed("air quality: feed timed out")
            }
        }
    }

    async fn fetch_current(&self, request: &SafetyRequest) -> anyhow::Result<AirQualityData> {
        let url = format!(
            "{}/air-quality?latitude={}&longitude={}&current=us_aqi,us_aqi_pm2_5",
            self.base_url, request.latitude, request.longitude
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("air quality API returned status {}", response.status());
        }
        let body = response.json::<AirQualityResponse>().await?;
        let current = body.current.unwrap_or_default();

        Ok(AirQualityData {
            aqi: current.us_aqi,
            primary_pollutant: current.primary_pollutant,
        })
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    #[serde(default)]
    current: Option<AirQualityCurrent>,
}

#[derive(Debug, Default, Deserialize)]
struct AirQualityCurrent {
    #[serde(default)]
    us_aqi: Option<f64>,

    #[serde(default)]
    primary_pollutant: Option<String>,
}
