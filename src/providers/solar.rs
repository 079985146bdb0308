//! Solar timing provider with a local solar-geometry fallback.
//!
//! Sun timing drives the terrain classifier: a frozen crust holds until the
//! sun has been meaningfully above the horizon, regardless of what the air
//! temperature alone suggests. The primary tier asks an upstream API for
//! sunrise/sunset/solar-noon; when that fails, the chain degrades to a local
//! declination + hour-angle approximation rather than zeroing out, since the
//! geometry is computable from the request alone.

use std::time::Duration;

use chrono::{Datelike, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use crate::model::SafetyRequest;
use crate::providers::Fetched;

/// Base URL for the solar timing API.
const SOLAR_API_BASE: &str = "https://api.sunrise-sunset.example.org/v1";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Sun timing for the objective date, in the objective's local time.
#[derive(Debug, Clone, Default)]
pub struct SolarTimes {
    pub sunrise_local: Option<NaiveTime>,
    pub sunset_local: Option<NaiveTime>,
    pub solar_noon_local: Option<NaiveTime>,

    /// Solar elevation at solar noon, degrees above the horizon.
    pub max_elevation_deg: Option<f64>,
}

impl SolarTimes {
    /// Hours of daylight, if both ends are known.
    pub fn daylight_hours(&self) -> Option<f64> {
        let sunrise = self.sunrise_local?;
        let sunset = self.sunset_local?;
        Some((sunset - sunrise).num_minutes() as f64 / 60.0)
    }
}

/// Solar elevation above the horizon in degrees for a local hour of day.
///
/// Standard declination + hour-angle approximation; accurate to a degree or
/// two, which is all the surface classifier needs.
pub fn solar_elevation_deg(latitude: f64, day_of_year: u32, local_hour: f64) -> f64 {
    let declination =
        -23.44_f64 * ((360.0 / 365.0) * (day_of_year as f64 + 10.0)).to_radians().cos();
    let hour_angle = 15.0 * (local_hour - 12.0);

    let lat = latitude.to_radians();
    let dec = declination.to_radians();
    let ha = hour_angle.to_radians();

    (lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos())
        .asin()
        .to_degrees()
}

/// Compute sun timing locally from request geometry.
fn compute_local(request: &SafetyRequest) -> SolarTimes {
    let day = request.date.ordinal();
    let declination =
        -23.44_f64 * ((360.0 / 365.0) * (day as f64 + 10.0)).to_radians().cos();

    // Sunrise hour angle; clamped so polar day/night degrade to 0h or 24h of
    // daylight instead of NaN.
    let cos_h0 =
        (-(request.latitude.to_radians().tan()) * declination.to_radians().tan()).clamp(-1.0, 1.0);
    let half_day_hours = cos_h0.acos().to_degrees() / 15.0;

    let to_time = |hour: f64| {
        let clamped = hour.clamp(0.0, 23.99);
        let h = clamped.floor() as u32;
        let m = ((clamped - clamped.floor()) * 60.0).floor() as u32;
        NaiveTime::from_hms_opt(h, m, 0)
    };

    SolarTimes {
        sunrise_local: to_time(12.0 - half_day_hours),
        sunset_local: to_time(12.0 + half_day_hours),
        solar_noon_local: NaiveTime::from_hms_opt(12, 0, 0),
        max_elevation_deg: Some(solar_elevation_deg(request.latitude, day, 12.0)),
    }
}

/// Client for the solar timing chain.
#[derive(Clone)]
pub struct SolarClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for SolarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SolarClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SOLAR_API_BASE.to_string(),
        }
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Run the fallback chain. Never returns an error.
    pub async fn fetch(&self, request: &SafetyRequest) -> Fetched<SolarTimes> {
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_api(request)).await {
            Ok(Ok(times)) => Fetched::ok(times),
            Ok(Err(e)) => {
                debug!(error = %e, "solar API fetch failed, computing locally");
                Fetched::degraded(
                    compute_local(request),
                    "solar: upstream unavailable; sun timing computed locally",
                )
            }
            Err(_) => {
                debug!("solar API fetch timed out, computing locally");
                Fetched::degraded(
                    compute_local(request),
                    "solar: upstream timed out; sun timing computed locally",
                )
            }
        }
    }

    /// The terminal tier on its own: local sun geometry, no network. Used
    /// when the shared request deadline leaves no room for the fetch chain.
    pub fn compute_only(&self, request: &SafetyRequest) -> Fetched<SolarTimes> {
        Fetched::degraded(
            compute_local(request),
            "solar: request deadline exceeded; sun timing computed locally",
        )
    }

    async fn fetch_api(&self, request: &SafetyRequest) -> anyhow::Result<SolarTimes> {
        let url = format!(
            "{}/solar?lat={}&lon={}&date={}",
            self.base_url,
            request.latitude,
            request.longitude,
            request.date.format("%Y-%m-%d")
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("solar API returned status {}", response.status());
        }
        let body = response.json::<SolarResponse>().await?;

        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        };

        Ok(SolarTimes {
            sunrise_local: parse(&body.sunrise),
            sunset_local: parse(&body.sunset),
            solar_noon_local: parse(&body.solar_noon),
            max_elevation_deg: body.max_elevation,
        })
    }
}

/// Raw solar API payload.
#[derive(Debug, Deserialize)]
struct SolarResponse {
    #[serde(default)]
    sunrise: Option<String>,

    #[serde(default)]
    sunset: Option<String>,

    #[serde(default)]
    solar_noon: Option<String>,

    #[serde(default)]
    max_elevation: Option<f64>,
}
