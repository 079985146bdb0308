//! Final response assembly.
//!
//! A pure merge of already-computed pieces into the `SafetyResponse` shape.
//! No fetching, no scoring, no clock reads happen here, so assembling twice
//! from the same inputs produces byte-identical JSON.

use crate::error::RequestError;
use crate::model::{
    ConfidenceScore, HazardFactor, RainfallTotals, SafetyRequest, SafetyResponse, SafetyScore,
    WeatherSummary, PLANNING_WINDOW_HOURS,
};
use crate::orchestrator::ProviderSet;
use crate::terrain::TerrainAssessment;

/// Merge the scored pieces into the response payload.
///
/// The avalanche fetch chain guarantees a zone-resolved bulletin even on
/// total upstream failure, so a missing one here is an internal invariant
/// violation, not a data problem.
pub fn assemble(
    request: &SafetyRequest,
    set: &ProviderSet,
    mut factors: Vec<HazardFactor>,
    safety: SafetyScore,
    confidence: ConfidenceScore,
    terrain: TerrainAssessment,
) -> Result<SafetyResponse, RequestError> {
    use chrono::Timelike;

    // Canonical category order regardless of how the factors arrived.
    factors.sort_by_key(|f| f.category);

    let avalanche = set
        .avalanche
        .payload
        .clone()
        .ok_or_else(|| RequestError::computation("avalanche envelope has no resolved zone"))?;

    let rainfall = set
        .rainfall
        .payload
        .clone()
        .unwrap_or_else(RainfallTotals::zeroed);

    let start_hour = request.start_time.hour() as i32;
    let weather = match set.weather.payload.as_ref() {
        Some(w) => WeatherSummary {
            current_temp_f: w.current_temp_f,
            current_feels_like_f: w.current_feels_like_f,
            peak_trailing_feels_like_f: w.peak_trailing_feels_like(start_hour),
            wind_mph: w.current_wind_mph,
            wind_gust_mph: w.current_gust_mph,
            precip_window_in: w.window_precip_in(start_hour, PLANNING_WINDOW_HOURS as i32),
            elevation_ft: w.elevation_ft,
            status: set.weather.status,
        },
        None => WeatherSummary {
            current_temp_f: None,
            current_feels_like_f: None,
            peak_trailing_feels_like_f: None,
            wind_mph: None,
            wind_gust_mph: None,
            precip_window_in: None,
            elevation_ft: None,
            status: set.weather.status,
        },
    };

    let degraded = set.degraded_categories();
    let (partial_data, api_warning) = if degraded.is_empty() {
        (None, None)
    } else {
        (
            Some(true),
            Some(format!(
                "degraded or missing data from: {}",
                degraded.join(", ")
            )),
        )
    };

    Ok(SafetyResponse {
        safety,
        confidence,
        factors,
        rainfall,
        avalanche,
        weather,
        terrain,
        partial_data,
        api_warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AvalancheBulletin, DangerByBand, HazardCategory, SafetyQuery, ZoneResolution,
    };
    use crate::providers::Fetched;
    use crate::{relevance, scoring, terrain};

    fn request() -> SafetyRequest {
        let query = SafetyQuery {
            lat: Some("40.58".into()),
            lon: Some("-111.64".into()),
            date: Some("2026-02-14".into()),
            start: Some("07:00".into()),
        };
        SafetyRequest::from_query(&query).unwrap()
    }

    fn set_with_bulletin() -> ProviderSet {
        let bulletin = AvalancheBulletin {
            zone_id: "wasatch-salt-lake".into(),
            zone_name: "Salt Lake".into(),
            danger: DangerByBand {
                below_treeline: Some(1),
                near_treeline: Some(2),
                above_treeline: Some(2),
            },
            problems: vec![],
            bottom_line: None,
            resolution_method: ZoneResolution::Polygon,
        };
        ProviderSet {
            weather: Fetched::zeroed("weather down"),
            solar: Fetched::zeroed("solar down"),
            avalanche: Fetched {
                status: crate::model::ProviderStatus::Zeroed,
                payload: Some(bulletin),
                age_seconds: 0,
                warning: Some("feed down".into()),
            },
            snowpack: Fetched::zeroed("snowpack down"),
            rainfall: Fetched::zeroed("rainfall down"),
            alerts: Fetched::zeroed("alerts down"),
            air_quality: Fetched::zeroed("air quality down"),
        }
    }

    fn respond(set: &ProviderSet) -> SafetyResponse {
        let req = request();
        let map = relevance::evaluate(&req, set);
        let terrain = terrain::classify(&req, set);
        let factors = scoring::score_factors(&req, set, &map, &terrain).unwrap();
        let safety = scoring::safety_score(&factors);
        let confidence = scoring::confidence_score(set, &map).unwrap();
        assemble(&req, set, factors, safety, confidence, terrain).unwrap()
    }

    #[test]
    fn test_partial_data_flagged_when_any_provider_degraded() {
        let response = respond(&set_with_bulletin());
        assert_eq!(response.partial_data, Some(true));
        let warning = response.api_warning.unwrap();
        assert!(warning.contains("weather"));
        assert!(warning.contains("rainfall"));
    }

    #[test]
    fn test_zeroed_rainfall_serializes_null_totals() {
        let response = respond(&set_with_bulletin());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["rainfall"]["past12hIn"], serde_json::Value::Null);
        assert_eq!(json["rainfall"]["past24hIn"], serde_json::Value::Null);
    }

    #[test]
    fn test_factors_in_canonical_order() {
        let response = respond(&set_with_bulletin());
        let order: Vec<HazardCategory> = response.factors.iter().map(|f| f.category).collect();
        assert_eq!(order, HazardCategory::ALL.to_vec());
    }

    #[test]
    fn test_repeated_assembly_is_byte_identical() {
        let set = set_with_bulletin();
        let first = serde_json::to_string(&respond(&set)).unwrap();
        let second = serde_json::to_string(&respond(&set)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_bulletin_is_computation_error() {
        let mut set = set_with_bulletin();
        set.avalanche = Fetched::zeroed("no payload at all");
        let req = request();
        let map = relevance::evaluate(&req, &set);
        let terrain = terrain::classify(&req, &set);
        let factors = scoring::score_factors(&req, &set, &map, &terrain).unwrap();
        let safety = scoring::safety_score(&factors);
        let confidence = scoring::confidence_score(&set, &map).unwrap();
        let err = assemble(&req, &set, factors, safety, confidence, terrain).unwrap_err();
        assert!(matches!(err, RequestError::Computation(_)));
    }
}
