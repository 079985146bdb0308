//! Primary weather forecast client with secondary gap-fill fallback.
//!
//! The primary source provides an hourly trend series (temperature, apparent
//! temperature, wind, precipitation, snowfall) spanning the trailing day and
//! the forecast window, plus the point elevation and UTC offset. On timeout
//! or a non-success HTTP status, a secondary current-conditions provider
//! fills **only the fields the primary left missing**; partially-good
//! primary data is preserved, never replaced wholesale.
//!
//! Response status is checked before body parsing on both tiers; a non-2xx
//! body is never fed to the JSON parser.

use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};
use serde::Deserialize;
use tracing::debug;

use crate::model::SafetyRequest;
use crate::providers::Fetched;

/// Base URL for the primary hourly forecast API.
const PRIMARY_API_BASE: &str = "https://api.open-meteo.com/v1";

/// Base URL for the secondary current-conditions API.
const SECONDARY_API_BASE: &str = "https://api.backup-wx.example.com/v1";

/// Per-call budget for each tier, inside the shared request deadline.
const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// One hour of the normalized trend series.
///
/// `offset_hours` is relative to local midnight of the objective date, so
/// trailing hours are negative and the planning window is non-negative.
#[derive(Debug, Clone, Default)]
pub struct HourPoint {
    pub offset_hours: i32,
    pub temp_f: Option<f64>,
    pub feels_like_f: Option<f64>,
    pub wind_mph: Option<f64>,
    pub gust_mph: Option<f64>,
    pub precip_in: Option<f64>,
    pub snowfall_in: Option<f64>,
}

/// Normalized weather data for one request.
#[derive(Debug, Clone, Default)]
pub struct WeatherData {
    pub elevation_ft: Option<f64>,
    pub utc_offset_seconds: Option<i32>,
    pub current_temp_f: Option<f64>,
    pub current_feels_like_f: Option<f64>,
    pub current_wind_mph: Option<f64>,
    pub current_gust_mph: Option<f64>,

    /// Hourly trend, trailing day through the forecast window, ordered by
    /// `offset_hours`.
    pub hours: Vec<HourPoint>,
}

impl WeatherData {
    /// Peak apparent temperature across the full trailing trend series
    /// (the 24 hours before `start_hour`).
    ///
    /// This is deliberately the maximum of the *feels-like* series. Taking
    /// `max(current feels-like, peak raw temperature)` instead mis-estimates
    /// heat and cold stress whenever wind separates perceived from raw
    /// temperature.
    pub fn peak_trailing_feels_like(&self, start_hour: i32) -> Option<f64> {
        self.hours
            .iter()
            .filter(|h| h.offset_hours >= start_hour - 24 && h.offset_hours < start_hour)
            .filter_map(|h| h.feels_like_f)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
    }

    /// Minimum temperature over the overnight hours before the start.
    pub fn overnight_low_f(&self, start_hour: i32) -> Option<f64> {
        self.hours
            .iter()
            .filter(|h| h.offset_hours >= start_hour - 10 && h.offset_hours <= start_hour)
            .filter_map(|h| h.temp_f)
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
    }

    /// Total forecast precipitation across the planning window, inches.
    ///
    /// `None` when no hour in the window carries a value; "no data" is not
    /// "no precipitation".
    pub fn window_precip_in(&self, start_hour: i32, window_hours: i32) -> Option<f64> {
        let values: Vec<f64> = self
            .hours
            .iter()
            .filter(|h| h.offset_hours >= start_hour && h.offset_hours < start_hour + window_hours)
            .filter_map(|h| h.precip_in)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum())
        }
    }

    /// Total forecast snowfall across the planning window, inches.
    pub fn window_snowfall_in(&self, start_hour: i32, window_hours: i32) -> Option<f64> {
        let values: Vec<f64> = self
            .hours
            .iter()
            .filter(|h| h.offset_hours >= start_hour && h.offset_hours < start_hour + window_hours)
            .filter_map(|h| h.snowfall_in)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum())
        }
    }

    /// Temperature at a specific hour offset, if forecast.
    pub fn temp_at(&self, offset_hours: i32) -> Option<f64> {
        self.hours
            .iter()
            .find(|h| h.offset_hours == offset_hours)
            .and_then(|h| h.temp_f)
    }

    /// Whether the trend crosses freezing anywhere in [from, to).
    pub fn crosses_freezing(&self, from: i32, to: i32) -> bool {
        let temps: Vec<f64> = self
            .hours
            .iter()
            .filter(|h| h.offset_hours >= from && h.offset_hours < to)
            .filter_map(|h| h.temp_f)
            .collect();
        temps.iter().any(|t| *t <= 32.0) && temps.iter().any(|t| *t > 32.0)
    }

    fn missing_current_fields(&self) -> bool {
        self.current_temp_f.is_none()
            || self.current_feels_like_f.is_none()
            || self.current_wind_mph.is_none()
    }

    /// Fill only the fields that are missing from `self` using `other`.
    fn gap_fill(&mut self, other: &SecondaryConditions) {
        if self.current_temp_f.is_none() {
            self.current_temp_f = other.temperature_f;
        }
        if self.current_feels_like_f.is_none() {
            self.current_feels_like_f = other.feels_like_f;
        }
        if self.current_wind_mph.is_none() {
            self.current_wind_mph = other.wind_mph;
        }
        if self.current_gust_mph.is_none() {
            self.current_gust_mph = other.gust_mph;
        }
    }
}

/// Client for the weather fallback chain.
#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    primary_base: String,
    secondary_base: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherClient {
    /// Create a client against the production endpoints.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            primary_base: PRIMARY_API_BASE.to_string(),
            secondary_base: SECONDARY_API_BASE.to_string(),
        }
    }

    /// Create a client with custom base URLs (for testing).
    pub fn with_base_urls(primary: &str, secondary: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            primary_base: primary.to_string(),
            secondary_base: secondary.to_string(),
        }
    }

    /// Run the fallback chain. Never returns an error.
    pub async fn fetch(&self, request: &SafetyRequest) -> Fetched<WeatherData> {
        let primary = tokio::time::timeout(CALL_TIMEOUT, self.fetch_primary(request)).await;

        let mut data = match primary {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                debug!(error = %e, "primary weather fetch failed");
                WeatherData::default()
            }
            Err(_) => {
                debug!("primary weather fetch timed out");
                WeatherData::default()
            }
        };

        let had_primary = !data.hours.is_empty() || data.current_temp_f.is_some();

        if data.missing_current_fields() {
            let secondary =
                tokio::time::timeout(CALL_TIMEOUT, self.fetch_secondary(request)).await;
            match secondary {
                Ok(Ok(conditions)) => {
                    data.gap_fill(&conditions);
                    let warning = if had_primary {
                        "weather: gaps in primary forecast filled from secondary provider"
                    } else {
                        "weather: primary forecast unavailable; secondary current conditions only"
                    };
                    return Fetched::degraded(data, warning);
                }
                Ok(Err(e)) => debug!(error = %e, "secondary weather fetch failed"),
                Err(_) => debug!("secondary weather fetch timed out"),
            }

            if had_primary {
                return Fetched::degraded(
                    data,
                    "weather: primary forecast incomplete and secondary unavailable",
                );
            }
            return Fetched::zeroed("weather: all providers unavailable");
        }

        Fetched::ok(data)
    }

    async fn fetch_primary(&self, request: &SafetyRequest) -> anyhow::Result<WeatherData> {
        let url = format!(
            "{}/forecast?latitude={}&longitude={}\
             &hourly=temperature_2m,apparent_temperature,wind_speed_10m,wind_gusts_10m,precipitation,snowfall\
             &temperature_unit=fahrenheit&wind_speed_unit=mph&precipitation_unit=inch\
             &timezone=auto&past_days=1&forecast_days=2",
            self.primary_base, request.latitude, request.longitude
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("primary weather returned status {}", response.status());
        }
        let body = response.json::<PrimaryForecastResponse>().await?;
        Ok(normalize_primary(&body, request))
    }

    async fn fetch_secondary(&self, request: &SafetyRequest) -> anyhow::Result<SecondaryConditions> {
        let url = format!(
            "{}/conditions?lat={}&lon={}&units=imperial",
            self.secondary_base, request.latitude, request.longitude
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("secondary weather returned status {}", response.status());
        }
        Ok(response.json::<SecondaryConditions>().await?)
    }
}

// ============================================================================
// Response types
// ============================================================================

/// Raw primary forecast payload.
#[derive(Debug, Deserialize)]
struct PrimaryForecastResponse {
    /// Surface elevation in meters.
    #[serde(default)]
    elevation: Option<f64>,

    #[serde(default)]
    utc_offset_seconds: Option<i32>,

    #[serde(default)]
    hourly: Option<PrimaryHourly>,
}

/// Hourly arrays from the primary provider. Entries may be null; nulls stay
/// `None` all the way through.
#[derive(Debug, Default, Deserialize)]
struct PrimaryHourly {
    #[serde(default)]
    time: Vec<String>,

    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,

    #[serde(default)]
    apparent_temperature: Vec<Option<f64>>,

    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,

    #[serde(default)]
    wind_gusts_10m: Vec<Option<f64>>,

    #[serde(default)]
    precipitation: Vec<Option<f64>>,

    #[serde(default)]
    snowfall: Vec<Option<f64>>,
}

/// Raw secondary current-conditions payload.
#[derive(Debug, Default, Deserialize)]
struct SecondaryConditions {
    #[serde(default)]
    temperature_f: Option<f64>,

    #[serde(default)]
    feels_like_f: Option<f64>,

    #[serde(default)]
    wind_mph: Option<f64>,

    #[serde(default)]
    gust_mph: Option<f64>,
}

fn normalize_primary(body: &PrimaryForecastResponse, request: &SafetyRequest) -> WeatherData {
    let midnight = request.date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let mut hours = Vec::new();

    if let Some(hourly) = &body.hourly {
        for (i, time) in hourly.time.iter().enumerate() {
            let Ok(parsed) = NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M") else {
                continue;
            };
            let offset_hours = (parsed - midnight).num_hours() as i32;
            hours.push(HourPoint {
                offset_hours,
                temp_f: hourly.temperature_2m.get(i).copied().flatten(),
                feels_like_f: hourly.apparent_temperature.get(i).copied().flatten(),
                wind_mph: hourly.wind_speed_10m.get(i).copied().flatten(),
                gust_mph: hourly.wind_gusts_10m.get(i).copied().flatten(),
                precip_in: hourly.precipitation.get(i).copied().flatten(),
                snowfall_in: hourly.snowfall.get(i).copied().flatten(),
            });
        }
    }
    hours.sort_by_key(|h| h.offset_hours);

    // "Current" conditions are the hour closest to the planned start.
    let start_hour = request.start_time.hour() as i32;
    let current = hours
        .iter()
        .min_by_key(|h| (h.offset_hours - start_hour).abs())
        .cloned();

    WeatherData {
        elevation_ft: body.elevation.map(|m| m * 3.28084),
        utc_offset_seconds: body.utc_offset_seconds,
        current_temp_f: current.as_ref().and_then(|h| h.temp_f),
        current_feels_like_f: current.as_ref().and_then(|h| h.feels_like_f),
        current_wind_mph: current.as_ref().and_then(|h| h.wind_mph),
        current_gust_mph: current.as_ref().and_then(|h| h.gust_mph),
        hours,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(offset: i32, temp: Option<f64>, feels: Option<f64>) -> HourPoint {
        HourPoint {
            offset_hours: offset,
            temp_f: temp,
            feels_like_f: feels,
            ..HourPoint::default()
        }
    }

    #[test]
    fn test_peak_trailing_feels_like_uses_full_series() {
        // Feels-like peaks at hour 3 (95°F) while raw temperature peaks at
        // hour 6 (90°F). The trailing peak must be 95, not max(current, 90).
        let data = WeatherData {
            current_feels_like_f: Some(70.0),
            hours: vec![
                hour(3, Some(88.0), Some(95.0)),
                hour(6, Some(90.0), Some(84.0)),
                hour(9, Some(80.0), Some(78.0)),
            ],
            ..WeatherData::default()
        };

        assert_eq!(data.peak_trailing_feels_like(10), Some(95.0));
    }

    #[test]
    fn test_peak_trailing_ignores_hours_after_start() {
        let data = WeatherData {
            hours: vec![hour(3, None, Some(80.0)), hour(12, None, Some(99.0))],
            ..WeatherData::default()
        };
        assert_eq!(data.peak_trailing_feels_like(10), Some(80.0));
    }

    #[test]
    fn test_peak_trailing_none_when_no_data() {
        let data = WeatherData {
            hours: vec![hour(3, Some(50.0), None)],
            ..WeatherData::default()
        };
        assert_eq!(data.peak_trailing_feels_like(10), None);
    }

    #[test]
    fn test_window_precip_none_vs_zero() {
        // All-null hours mean "no data", which must stay None.
        let no_data = WeatherData {
            hours: vec![hour(7, None, None), hour(8, None, None)],
            ..WeatherData::default()
        };
        assert_eq!(no_data.window_precip_in(7, 12), None);

        let dry = WeatherData {
            hours: vec![HourPoint {
                offset_hours: 7,
                precip_in: Some(0.0),
                ..HourPoint::default()
            }],
            ..WeatherData::default()
        };
        assert_eq!(dry.window_precip_in(7, 12), Some(0.0));
    }

    #[test]
    fn test_crosses_freezing() {
        let data = WeatherData {
            hours: vec![hour(0, Some(28.0), None), hour(6, Some(40.0), None)],
            ..WeatherData::default()
        };
        assert!(data.crosses_freezing(0, 12));
        assert!(!data.crosses_freezing(0, 3));
    }

    #[test]
    fn test_gap_fill_preserves_primary_fields() {
        let mut data = WeatherData {
            current_temp_f: Some(41.0),
            current_feels_like_f: None,
            ..WeatherData::default()
        };
        let secondary = SecondaryConditions {
            temperature_f: Some(99.0),
            feels_like_f: Some(35.0),
            wind_mph: Some(12.0),
            gust_mph: None,
        };

        data.gap_fill(&secondary);

        // Primary value survives; only gaps are filled.
        assert_eq!(data.current_temp_f, Some(41.0));
        assert_eq!(data.current_feels_like_f, Some(35.0));
        assert_eq!(data.current_wind_mph, Some(12.0));
    }

    #[test]
    fn test_normalize_primary_offsets() {
        let request = SafetyRequest {
            latitude: 40.55,
            longitude: -111.7,
            date: chrono::NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            start_time: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        };
        let body = PrimaryForecastResponse {
            elevation: Some(2600.0),
            utc_offset_seconds: Some(-7 * 3600),
            hourly: Some(PrimaryHourly {
                time: vec![
                    "2026-02-13T23:00".to_string(),
                    "2026-02-14T07:00".to_string(),
                ],
                temperature_2m: vec![Some(20.0), Some(25.0)],
                apparent_temperature: vec![Some(12.0), Some(18.0)],
                ..PrimaryHourly::default()
            }),
        };

        let data = normalize_primary(&body, &request);

        assert_eq!(data.hours[0].offset_hours, -1);
        assert_eq!(data.hours[1].offset_hours, 7);
        assert_eq!(data.current_temp_f, Some(25.0));
        assert!((data.elevation_ft.unwrap() - 8529.0).abs() < 10.0);
    }
}
