//! Data models for Treeline.
//!
//! These are the types that cross component boundaries: the validated safety
//! request, the uniform provider envelope statuses, the hazard factor list,
//! and the final `SafetyResponse` payload consumed by the presentation layer.
//!
//! A few conventions hold throughout:
//!
//! - Upstream numeric fields that can be absent are `Option<f64>`, never a
//!   sentinel number. A missing rainfall total is `None`, not `0.0`, so
//!   downstream consumers can distinguish "no rain" from "no data".
//! - Response types are plain serde structs; once built for a request they
//!   are never mutated.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// How many hours of travel the assessment plans for, starting at `start`.
pub const PLANNING_WINDOW_HOURS: i64 = 12;

// ============================================================================
// Request
// ============================================================================

/// Raw query parameters for GET /safety.
///
/// Everything arrives as optional strings so that validation failures produce
/// our `400 {"error": ...}` shape rather than the framework's default
/// rejection body.
#[derive(Debug, Deserialize)]
pub struct SafetyQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub date: Option<String>,
    pub start: Option<String>,
}

/// A validated safety request.
#[derive(Debug, Clone, Copy)]
pub struct SafetyRequest {
    /// Latitude in decimal degrees, within [-90, 90].
    pub latitude: f64,

    /// Longitude in decimal degrees, within [-180, 180].
    pub longitude: f64,

    /// Objective date in the objective's locale.
    pub date: NaiveDate,

    /// Planned start time in the objective's locale.
    pub start_time: NaiveTime,
}

impl SafetyRequest {
    /// Validate raw query parameters into a request.
    ///
    /// All failures are `RequestError::Validation` (HTTP 400).
    pub fn from_query(query: &SafetyQuery) -> Result<Self, RequestError> {
        let lat_str = query
            .lat
            .as_deref()
            .ok_or_else(|| RequestError::validation("missing required parameter: lat"))?;
        let lon_str = query
            .lon
            .as_deref()
            .ok_or_else(|| RequestError::validation("missing required parameter: lon"))?;
        let date_str = query
            .date
            .as_deref()
            .ok_or_else(|| RequestError::validation("missing required parameter: date"))?;
        let start_str = query
            .start
            .as_deref()
            .ok_or_else(|| RequestError::validation("missing required parameter: start"))?;

        let latitude: f64 = lat_str
            .parse()
            .map_err(|_| RequestError::validation(format!("lat is not a number: {lat_str}")))?;
        let longitude: f64 = lon_str
            .parse()
            .map_err(|_| RequestError::validation(format!("lon is not a number: {lon_str}")))?;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(RequestError::validation(format!(
                "lat must be within [-90, 90], got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(RequestError::validation(format!(
                "lon must be within [-180, 180], got {longitude}"
            )));
        }

        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
            RequestError::validation(format!("date must be YYYY-MM-DD: {date_str}"))
        })?;
        let start_time = NaiveTime::parse_from_str(start_str, "%H:%M")
            .map_err(|_| RequestError::validation(format!("start must be HH:mm: {start_str}")))?;

        Ok(Self {
            latitude,
            longitude,
            date,
            start_time,
        })
    }

    /// The UTC offset for the objective's locale, estimated from longitude.
    ///
    /// Used only until the primary weather provider reports the authoritative
    /// offset for the point.
    pub fn estimated_offset(&self) -> FixedOffset {
        let hours = (self.longitude / 15.0).round() as i32;
        FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// The planned start as a timezone-aware instant.
    ///
    /// `offset_seconds` comes from the weather provider when available.
    pub fn planned_instant(&self, offset_seconds: Option<i32>) -> DateTime<FixedOffset> {
        let offset = offset_seconds
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| self.estimated_offset());
        let naive = self.date.and_time(self.start_time);
        match offset.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt,
            // FixedOffset has no DST gaps.
            chrono::LocalResult::None => offset.from_utc_datetime(&naive),
        }
    }

    /// The planning window [start, start + PLANNING_WINDOW_HOURS).
    pub fn planning_window(
        &self,
        offset_seconds: Option<i32>,
    ) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let start = self.planned_instant(offset_seconds);
        (start, start + chrono::Duration::hours(PLANNING_WINDOW_HOURS))
    }
}

// ============================================================================
// Provider envelope status
// ============================================================================

/// Outcome status of one provider's fallback chain for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Fresh data from the primary tier.
    Ok,
    /// Data obtained through a fallback tier (secondary source, gap-fill,
    /// local approximation).
    Degraded,
    /// Served from a cache entry past its TTL.
    Stale,
    /// Terminal fallback: no data at all; values are explicitly null.
    Zeroed,
    /// Reserved for request-invalidating conditions inside a chain; never the
    /// final status of a fetched envelope once the terminal tier has run.
    Failed,
}

impl ProviderStatus {
    /// Whether this status represents anything less than fresh data.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ProviderStatus::Ok)
    }
}

// ============================================================================
// Hazard categories and factors
// ============================================================================

/// The fixed set of hazard categories evaluated for every request.
///
/// The declaration order here is the canonical ordering of the factor list in
/// the response, which keeps repeated assembly byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardCategory {
    Avalanche,
    Wind,
    TemperatureStress,
    Precipitation,
    SurfaceConditions,
    AirQuality,
    Alerts,
}

impl HazardCategory {
    /// All categories in canonical order.
    pub const ALL: [HazardCategory; 7] = [
        HazardCategory::Avalanche,
        HazardCategory::Wind,
        HazardCategory::TemperatureStress,
        HazardCategory::Precipitation,
        HazardCategory::SurfaceConditions,
        HazardCategory::AirQuality,
        HazardCategory::Alerts,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            HazardCategory::Avalanche => "Avalanche",
            HazardCategory::Wind => "Wind",
            HazardCategory::TemperatureStress => "Temperature Stress",
            HazardCategory::Precipitation => "Precipitation",
            HazardCategory::SurfaceConditions => "Surface Conditions",
            HazardCategory::AirQuality => "Air Quality",
            HazardCategory::Alerts => "Alerts",
        }
    }
}

/// One scored hazard category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardFactor {
    /// The category this factor scores.
    pub category: HazardCategory,

    /// Points deducted from the safety score. Always within [0, cap].
    pub impact: f64,

    /// The maximum contribution this category may make.
    pub cap: f64,

    /// Whether the category applies to this objective/time context. A
    /// non-relevant category always has `impact = 0` but stays in the list so
    /// the omission is auditable.
    pub relevant: bool,

    /// Why the factor scored (or didn't) the way it did.
    pub explanation: String,
}

// ============================================================================
// Rainfall
// ============================================================================

/// Trailing rainfall accumulation totals.
///
/// When `status` is `zeroed`, every total is `None`: explicitly "no data",
/// never a misleading `0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RainfallTotals {
    #[serde(rename = "past12hIn")]
    pub past_12h_in: Option<f64>,

    #[serde(rename = "past24hIn")]
    pub past_24h_in: Option<f64>,

    #[serde(rename = "past48hIn")]
    pub past_48h_in: Option<f64>,

    pub status: ProviderStatus,
}

impl RainfallTotals {
    /// The terminal zeroed fallback: all totals null.
    pub fn zeroed() -> Self {
        Self {
            past_12h_in: None,
            past_24h_in: None,
            past_48h_in: None,
            status: ProviderStatus::Zeroed,
        }
    }

    /// Whether any total actually carries data.
    pub fn has_data(&self) -> bool {
        self.past_12h_in.is_some() || self.past_24h_in.is_some() || self.past_48h_in.is_some()
    }
}

// ============================================================================
// Avalanche
// ============================================================================

/// How the forecast zone for a point was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneResolution {
    /// The point fell inside the zone's polygon.
    Polygon,
    /// The point was outside all polygons; the nearest zone centroid won.
    Nearest,
    /// A named regional override rule assigned the zone.
    RegionOverride,
}

/// Danger ratings by elevation band on the standard 1-5 scale.
///
/// `None` means the rating is unknown (feed missing or band not forecast),
/// never "no danger".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DangerByBand {
    pub below_treeline: Option<u8>,
    pub near_treeline: Option<u8>,
    pub above_treeline: Option<u8>,
}

impl DangerByBand {
    /// The highest rated band, if any band is rated.
    pub fn max_rating(&self) -> Option<u8> {
        [self.below_treeline, self.near_treeline, self.above_treeline]
            .into_iter()
            .flatten()
            .max()
    }
}

/// An avalanche bulletin for the resolved zone.
///
/// `zone_id` is always resolved; zone resolution never fails silently to
/// "no zone". Bulletin content may still be missing when every feed tier is
/// unavailable, in which case the envelope status says so.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvalancheBulletin {
    pub zone_id: String,
    pub zone_name: String,
    pub danger: DangerByBand,
    pub problems: Vec<String>,
    pub bottom_line: Option<String>,
    pub resolution_method: ZoneResolution,
}

// ============================================================================
// Scores
// ============================================================================

/// Label bands for the aggregate safety score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLabel {
    Optimal,
    Caution,
    Critical,
}

/// Cut point at and above which conditions are labeled Optimal.
pub const OPTIMAL_THRESHOLD: u8 = 80;
/// Cut point at and above which conditions are labeled Caution.
pub const CAUTION_THRESHOLD: u8 = 50;

impl SafetyLabel {
    /// Classify a safety score by fixed thresholds.
    ///
    /// - `Optimal`: score >= 80
    /// - `Caution`: 50 <= score < 80
    /// - `Critical`: score < 50
    pub fn from_score(score: u8) -> Self {
        if score >= OPTIMAL_THRESHOLD {
            SafetyLabel::Optimal
        } else if score >= CAUTION_THRESHOLD {
            SafetyLabel::Caution
        } else {
            SafetyLabel::Critical
        }
    }
}

/// The aggregate safety score, 0-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyScore {
    pub score: u8,
    pub label: SafetyLabel,
}

impl SafetyScore {
    /// Build from a raw (possibly out-of-range) aggregate value.
    pub fn from_value(value: f64) -> Self {
        let score = value.clamp(0.0, 100.0).round() as u8;
        Self {
            score,
            label: SafetyLabel::from_score(score),
        }
    }
}

/// Floor below which confidence never drops.
pub const CONFIDENCE_FLOOR: u8 = 20;

/// How much of the safety score rests on complete vs. degraded data, 20-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: u8,
}

impl ConfidenceScore {
    /// Build from a raw deducted value, applying the floor.
    pub fn from_value(value: f64) -> Self {
        Self {
            score: value.clamp(f64::from(CONFIDENCE_FLOOR), 100.0).round() as u8,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Weather summary included in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSummary {
    pub current_temp_f: Option<f64>,
    pub current_feels_like_f: Option<f64>,

    /// Maximum apparent temperature across the full trailing trend series.
    pub peak_trailing_feels_like_f: Option<f64>,

    pub wind_mph: Option<f64>,
    pub wind_gust_mph: Option<f64>,

    /// Forecast precipitation over the planning window, inches.
    pub precip_window_in: Option<f64>,

    /// Surface elevation at the point, feet.
    pub elevation_ft: Option<f64>,

    pub status: ProviderStatus,
}

/// The final payload for one safety request.
///
/// Owned by exactly one request's lifecycle; assembly from identical inputs
/// is byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResponse {
    pub safety: SafetyScore,
    pub confidence: ConfidenceScore,
    pub factors: Vec<HazardFactor>,
    pub rainfall: RainfallTotals,
    pub avalanche: AvalancheBulletin,
    pub weather: WeatherSummary,
    pub terrain: crate::terrain::TerrainAssessment,

    #[serde(rename = "partialData", skip_serializing_if = "Option::is_none")]
    pub partial_data: Option<bool>,

    #[serde(rename = "apiWarning", skip_serializing_if = "Option::is_none")]
    pub api_warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(lat: &str, lon: &str, date: &str, start: &str) -> SafetyQuery {
        SafetyQuery {
            lat: Some(lat.to_string()),
            lon: Some(lon.to_string()),
            date: Some(date.to_string()),
            start: Some(start.to_string()),
        }
    }

    #[test]
    fn test_valid_request_parses() {
        let req =
            SafetyRequest::from_query(&query("40.55", "-111.7", "2026-02-14", "07:30")).unwrap();
        assert!((req.latitude - 40.55).abs() < 1e-9);
        assert_eq!(req.start_time, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    }

    #[test]
    fn test_latitude_out_of_range_rejected() {
        let err =
            SafetyRequest::from_query(&query("91.0", "0.0", "2026-02-14", "07:30")).unwrap_err();
        assert!(err.to_string().contains("lat"));
    }

    #[test]
    fn test_missing_parameter_rejected() {
        let q = SafetyQuery {
            lat: None,
            lon: Some("0".into()),
            date: Some("2026-02-14".into()),
            start: Some("07:00".into()),
        };
        assert!(SafetyRequest::from_query(&q).is_err());
    }

    #[test]
    fn test_bad_date_rejected() {
        assert!(SafetyRequest::from_query(&query("40", "-111", "02/14/2026", "07:30")).is_err());
        assert!(SafetyRequest::from_query(&query("40", "-111", "2026-02-14", "7:3pm")).is_err());
    }

    #[test]
    fn test_planned_instant_uses_provider_offset() {
        let req =
            SafetyRequest::from_query(&query("40.55", "-111.7", "2026-02-14", "07:30")).unwrap();
        // Mountain Standard Time
        let instant = req.planned_instant(Some(-7 * 3600));
        assert_eq!(instant.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(instant.time(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    }

    #[test]
    fn test_estimated_offset_from_longitude() {
        let req =
            SafetyRequest::from_query(&query("40.55", "-111.7", "2026-02-14", "07:30")).unwrap();
        // -111.7 / 15 rounds to -7 hours
        assert_eq!(req.estimated_offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_safety_label_thresholds() {
        assert_eq!(SafetyLabel::from_score(100), SafetyLabel::Optimal);
        assert_eq!(SafetyLabel::from_score(80), SafetyLabel::Optimal);
        assert_eq!(SafetyLabel::from_score(79), SafetyLabel::Caution);
        assert_eq!(SafetyLabel::from_score(50), SafetyLabel::Caution);
        assert_eq!(SafetyLabel::from_score(49), SafetyLabel::Critical);
        assert_eq!(SafetyLabel::from_score(0), SafetyLabel::Critical);
    }

    #[test]
    fn test_safety_score_clamps() {
        assert_eq!(SafetyScore::from_value(-12.0).score, 0);
        assert_eq!(SafetyScore::from_value(140.0).score, 100);
    }

    #[test]
    fn test_confidence_floor() {
        assert_eq!(ConfidenceScore::from_value(-50.0).score, 20);
        assert_eq!(ConfidenceScore::from_value(5.0).score, 20);
        assert_eq!(ConfidenceScore::from_value(87.0).score, 87);
    }

    #[test]
    fn test_zeroed_rainfall_is_null_not_zero() {
        let totals = RainfallTotals::zeroed();
        assert_eq!(totals.status, ProviderStatus::Zeroed);
        assert!(totals.past_12h_in.is_none());
        assert!(totals.past_24h_in.is_none());
        assert!(totals.past_48h_in.is_none());
        assert!(!totals.has_data());
    }

    #[test]
    fn test_danger_max_rating() {
        let danger = DangerByBand {
            below_treeline: Some(1),
            near_treeline: Some(3),
            above_treeline: None,
        };
        assert_eq!(danger.max_rating(), Some(3));
        assert_eq!(DangerByBand::default().max_rating(), None);
    }
}
