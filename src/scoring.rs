//! Hazard impact scoring and the safety/confidence aggregates.
//!
//! Every category scores through the same shape: a monotone-adverse function
//! of its inputs, hard-capped at the category's maximum contribution. The
//! safety score is 100 minus the impacts of the relevant categories, clamped
//! to [0, 100]. Confidence tracks data completeness separately, so a clean
//! forecast built on stale caches reads as a high score the caller should
//! still treat with suspicion.
//!
//! Each factor moves through an explicit state machine: unknown, then
//! relevant or not relevant, then scored. A scored factor is never revisited,
//! and an impact above its cap or a category the relevance pass skipped is an
//! internal invariant violation surfaced as a 500, never silently patched.

use crate::error::RequestError;
use crate::model::{
    ConfidenceScore, HazardCategory, HazardFactor, SafetyRequest, SafetyScore,
};
use crate::orchestrator::ProviderSet;
use crate::providers::alerts::AlertSeverity;
use crate::relevance::RelevanceMap;
use crate::terrain::{FreezeThawCode, SurfaceCode, TerrainAssessment};

// ============================================================================
// Category caps
// ============================================================================

pub const AVALANCHE_CAP: f64 = 30.0;
pub const WIND_CAP: f64 = 25.0;
pub const TEMPERATURE_CAP: f64 = 25.0;
pub const PRECIPITATION_CAP: f64 = 20.0;
pub const ALERTS_CAP: f64 = 20.0;
pub const SURFACE_CAP: f64 = 15.0;
pub const AIR_QUALITY_CAP: f64 = 15.0;

/// Maximum contribution each category may make to the safety deduction.
pub fn cap_for(category: HazardCategory) -> f64 {
    match category {
        HazardCategory::Avalanche => AVALANCHE_CAP,
        HazardCategory::Wind => WIND_CAP,
        HazardCategory::TemperatureStress => TEMPERATURE_CAP,
        HazardCategory::Precipitation => PRECIPITATION_CAP,
        HazardCategory::Alerts => ALERTS_CAP,
        HazardCategory::SurfaceConditions => SURFACE_CAP,
        HazardCategory::AirQuality => AIR_QUALITY_CAP,
    }
}

// ============================================================================
// Factor state machine
// ============================================================================

/// Scoring lifecycle for one category. Scoring consumes the slot, so a
/// scored factor cannot be revisited.
#[derive(Debug)]
enum FactorState {
    Unknown,
    NotRelevant { reason: String },
    Relevant { reason: String },
}

/// One category's slot in the scoring pass.
#[derive(Debug)]
struct FactorSlot {
    category: HazardCategory,
    state: FactorState,
}

impl FactorSlot {
    fn new(category: HazardCategory) -> Self {
        Self {
            category,
            state: FactorState::Unknown,
        }
    }

    fn mark(&mut self, relevant: bool, reason: String) -> Result<(), RequestError> {
        match self.state {
            FactorState::Unknown => {
                self.state = if relevant {
                    FactorState::Relevant { reason }
                } else {
                    FactorState::NotRelevant { reason }
                };
                Ok(())
            }
            _ => Err(RequestError::computation(format!(
                "relevance marked twice for {:?}",
                self.category
            ))),
        }
    }

    /// Finish the slot. Relevant slots take the computed impact; non-relevant
    /// slots always score zero and keep the relevance reason.
    fn score(self, impact: f64, explanation: String) -> Result<HazardFactor, RequestError> {
        let cap = cap_for(self.category);
        match self.state {
            FactorState::Relevant { .. } => {
                if !impact.is_finite() || impact < 0.0 || impact > cap {
                    return Err(RequestError::computation(format!(
                        "impact {impact} out of [0, {cap}] for {:?}",
                        self.category
                    )));
                }
                Ok(HazardFactor {
                    category: self.category,
                    impact,
                    cap,
                    relevant: true,
                    explanation,
                })
            }
            FactorState::NotRelevant { reason } => Ok(HazardFactor {
                category: self.category,
                impact: 0.0,
                cap,
                relevant: false,
                explanation: reason,
            }),
            FactorState::Unknown => Err(RequestError::computation(format!(
                "scoring out of order for {:?}",
                self.category
            ))),
        }
    }
}

// ============================================================================
// Per-category impact functions
// ============================================================================

/// (raw impact, explanation) from the avalanche bulletin.
fn avalanche_impact(set: &ProviderSet) -> (f64, String) {
    let Some(bulletin) = set.avalanche.payload.as_ref() else {
        return (0.0, "no avalanche bulletin available".to_string());
    };
    let Some(rating) = bulletin.danger.max_rating() else {
        return (
            0.0,
            format!("no danger rating published for {}", bulletin.zone_name),
        );
    };
    // North American danger scale, 1 (low) through 5 (extreme).
    let base = match rating {
        1 => 2.0,
        2 => 8.0,
        3 => 16.0,
        4 => 25.0,
        _ => AVALANCHE_CAP,
    };
    let impact = (base + 1.5 * bulletin.problems.len() as f64).min(AVALANCHE_CAP);
    (
        impact,
        format!(
            "danger rating {rating}/5 in {} with {} listed problem(s)",
            bulletin.zone_name,
            bulletin.problems.len()
        ),
    )
}

fn wind_impact(set: &ProviderSet, start_hour: i32) -> (f64, String) {
    let Some(weather) = set.weather.payload.as_ref() else {
        return (0.0, "no wind data available".to_string());
    };
    let window_gust = weather
        .hours
        .iter()
        .filter(|h| h.offset_hours >= start_hour && h.offset_hours < start_hour + 12)
        .filter_map(|h| h.gust_mph)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
    let peak = [
        weather.current_gust_mph,
        window_gust,
        // Sustained wind is harder than the same gust figure.
        weather.current_wind_mph.map(|w| w * 1.3),
    ]
    .into_iter()
    .flatten()
    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

    match peak {
        Some(peak) if peak > 15.0 => {
            let impact = ((peak - 15.0) * 0.7).min(WIND_CAP);
            (impact, format!("peak effective wind {peak:.0} mph"))
        }
        Some(peak) => (0.0, format!("light wind, peak {peak:.0} mph")),
        None => (0.0, "no wind data available".to_string()),
    }
}

fn temperature_impact(set: &ProviderSet, start_hour: i32) -> (f64, String) {
    let Some(weather) = set.weather.payload.as_ref() else {
        return (0.0, "no temperature data available".to_string());
    };

    // Heat risk keys on the peak apparent temperature across the full
    // trailing series, not on the current reading or the raw-temperature peak.
    let heat = weather
        .peak_trailing_feels_like(start_hour)
        .map(|peak| (peak, ((peak - 85.0) * 1.2).max(0.0)));

    let window_low = weather
        .hours
        .iter()
        .filter(|h| h.offset_hours >= start_hour && h.offset_hours < start_hour + 12)
        .filter_map(|h| h.feels_like_f)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));
    let cold = window_low.map(|low| (low, ((10.0 - low) * 1.2).max(0.0)));

    match (heat, cold) {
        (Some((peak, h)), Some((_, c))) if h >= c && h > 0.0 => (
            h.min(TEMPERATURE_CAP),
            format!("peak trailing feels-like {peak:.0} F"),
        ),
        (_, Some((low, c))) if c > 0.0 => (
            c.min(TEMPERATURE_CAP),
            format!("feels-like low of {low:.0} F in the travel window"),
        ),
        (Some((peak, h)), _) if h > 0.0 => (
            h.min(TEMPERATURE_CAP),
            format!("peak trailing feels-like {peak:.0} F"),
        ),
        (None, None) => (0.0, "no temperature data available".to_string()),
        _ => (0.0, "temperatures within the comfortable band".to_string()),
    }
}

fn precipitation_impact(set: &ProviderSet, start_hour: i32) -> (f64, String) {
    let Some(weather) = set.weather.payload.as_ref() else {
        return (0.0, "no forecast precipitation data available".to_string());
    };
    let rain = weather.window_precip_in(start_hour, 12);
    let snow = weather.window_snowfall_in(start_hour, 12);
    if rain.is_none() && snow.is_none() {
        return (0.0, "no forecast precipitation data available".to_string());
    }
    let rain_in = rain.unwrap_or(0.0);
    let snow_in = snow.unwrap_or(0.0);
    let impact = (rain_in * 12.0 + snow_in * 2.5).min(PRECIPITATION_CAP);
    (
        impact,
        format!(
            "{rain_in:.2} in rain and {snow_in:.1} in snow forecast over the travel window"
        ),
    )
}

fn alerts_impact(set: &ProviderSet, request: &SafetyRequest) -> (f64, String) {
    let Some(alerts) = set.alerts.payload.as_ref() else {
        return (0.0, "no alert data available".to_string());
    };
    let offset = set
        .weather
        .payload
        .as_ref()
        .and_then(|w| w.utc_offset_seconds);
    let (start, end) = request.planning_window(offset);
    let in_window: Vec<_> = alerts.iter().filter(|a| a.intersects(start, end)).collect();
    let Some(worst) = in_window.iter().map(|a| a.severity).max() else {
        return (0.0, "no alerts overlap the travel window".to_string());
    };
    let base = match worst {
        AlertSeverity::Extreme => ALERTS_CAP,
        AlertSeverity::Severe => 14.0,
        AlertSeverity::Moderate => 8.0,
        AlertSeverity::Minor => 4.0,
    };
    let impact = (base + 2.0 * (in_window.len() as f64 - 1.0)).min(ALERTS_CAP);
    let events: Vec<&str> = in_window.iter().map(|a| a.event.as_str()).collect();
    (impact, format!("active: {}", events.join(", ")))
}

fn surface_impact(terrain: &TerrainAssessment) -> (f64, String) {
    let base: f64 = match terrain.surface {
        SurfaceCode::Posthole => 12.0,
        SurfaceCode::Slush => 10.0,
        SurfaceCode::Mud => 8.0,
        SurfaceCode::FrozenCrust => 6.0,
        SurfaceCode::SnowUnknown => 5.0,
        SurfaceCode::ConsolidatedSnow => 2.0,
        SurfaceCode::Dry => 0.0,
    };
    let refreeze_penalty = if terrain.freeze_thaw == FreezeThawCode::NoRefreeze {
        3.0
    } else {
        0.0
    };
    let impact = (base + refreeze_penalty).min(SURFACE_CAP);
    (impact, format!("expected surface: {:?}", terrain.surface))
}

fn air_quality_impact(set: &ProviderSet) -> (f64, String) {
    let aqi = set.air_quality.payload.as_ref().and_then(|a| a.aqi);
    let band = set.air_quality.payload.as_ref().and_then(|a| a.band());
    match (aqi, band) {
        (Some(aqi), Some(band)) => {
            let impact = ((aqi - 50.0) * 0.075).clamp(0.0, AIR_QUALITY_CAP);
            (impact, format!("AQI {aqi:.0} ({band})"))
        }
        _ => (0.0, "no air quality data available".to_string()),
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Score every category, in canonical order.
pub fn score_factors(
    request: &SafetyRequest,
    set: &ProviderSet,
    relevance: &RelevanceMap,
    terrain: &TerrainAssessment,
) -> Result<Vec<HazardFactor>, RequestError> {
    use chrono::Timelike;
    let start_hour = request.start_time.hour() as i32;

    let mut factors = Vec::with_capacity(HazardCategory::ALL.len());
    for category in HazardCategory::ALL {
        let decision = relevance.get(category)?;
        let mut slot = FactorSlot::new(category);
        slot.mark(decision.relevant, decision.reason.clone())?;

        let (impact, explanation) = if decision.relevant {
            match category {
                HazardCategory::Avalanche => avalanche_impact(set),
                HazardCategory::Wind => wind_impact(set, start_hour),
                HazardCategory::TemperatureStress => temperature_impact(set, start_hour),
                HazardCategory::Precipitation => precipitation_impact(set, start_hour),
                HazardCategory::SurfaceConditions => surface_impact(terrain),
                HazardCategory::AirQuality => air_quality_impact(set),
                HazardCategory::Alerts => alerts_impact(set, request),
            }
        } else {
            (0.0, String::new())
        };
        factors.push(slot.score(impact, explanation)?);
    }
    Ok(factors)
}

/// The aggregate safety score from scored factors.
///
/// Non-relevant factors carry `impact = 0`, so summing over everything is
/// summing over the relevant ones.
pub fn safety_score(factors: &[HazardFactor]) -> SafetyScore {
    let total: f64 = factors.iter().map(|f| f.impact).sum();
    SafetyScore::from_value(100.0 - total)
}

/// Confidence deduction for one provider status.
fn status_deduction(status: crate::model::ProviderStatus) -> f64 {
    use crate::model::ProviderStatus;
    match status {
        ProviderStatus::Ok => 0.0,
        ProviderStatus::Degraded => 8.0,
        ProviderStatus::Stale => 12.0,
        ProviderStatus::Zeroed | ProviderStatus::Failed => 15.0,
    }
}

/// Data-completeness confidence, 20-100.
///
/// Beyond per-provider deductions, a zeroed provider whose data feeds a
/// downstream relevance decision deducts again when that decision came back
/// negative: the factor may have been suppressed by the missing data rather
/// than by real conditions. Zeroed rainfall that left surface conditions
/// non-relevant is the canonical case.
pub fn confidence_score(
    set: &ProviderSet,
    relevance: &RelevanceMap,
) -> Result<ConfidenceScore, RequestError> {
    use crate::model::ProviderStatus;

    let mut value = 100.0;
    for (_, status) in set.statuses() {
        value -= status_deduction(status);
    }

    let suppressed_chains: [(ProviderStatus, HazardCategory); 2] = [
        (set.rainfall.status, HazardCategory::SurfaceConditions),
        (set.snowpack.status, HazardCategory::Avalanche),
    ];
    for (status, category) in suppressed_chains {
        let downstream_suppressed = !relevance.get(category)?.relevant;
        if matches!(status, ProviderStatus::Zeroed | ProviderStatus::Failed)
            && downstream_suppressed
        {
            value -= 10.0;
        }
    }

    Ok(ConfidenceScore::from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AvalancheBulletin, DangerByBand, ProviderStatus, SafetyQuery, ZoneResolution,
    };
    use crate::providers::weather::{HourPoint, WeatherData};
    use crate::providers::Fetched;
    use crate::relevance;
    use crate::terrain;

    fn request() -> SafetyRequest {
        let query = SafetyQuery {
            lat: Some("40.58".into()),
            lon: Some("-111.64".into()),
            date: Some("2026-02-14".into()),
            start: Some("07:00".into()),
        };
        SafetyRequest::from_query(&query).unwrap()
    }

    fn empty_set() -> ProviderSet {
        ProviderSet {
            weather: Fetched::zeroed("test"),
            solar: Fetched::zeroed("test"),
            avalanche: Fetched::zeroed("test"),
            snowpack: Fetched::zeroed("test"),
            rainfall: Fetched::zeroed("test"),
            alerts: Fetched::zeroed("test"),
            air_quality: Fetched::zeroed("test"),
        }
    }

    fn bulletin(rating: u8, problems: usize) -> AvalancheBulletin {
        AvalancheBulletin {
            zone_id: "wasatch-salt-lake".into(),
            zone_name: "Salt Lake".into(),
            danger: DangerByBand {
                below_treeline: Some(rating.saturating_sub(1).max(1)),
                near_treeline: Some(rating),
                above_treeline: Some(rating),
            },
            problems: vec!["Wind Slab".into(); problems],
            bottom_line: None,
            resolution_method: ZoneResolution::Polygon,
        }
    }

    fn calm_winter_weather() -> WeatherData {
        let hours = (-24..20)
            .map(|h| HourPoint {
                offset_hours: h,
                temp_f: Some(28.0),
                feels_like_f: Some(24.0),
                wind_mph: Some(5.0),
                gust_mph: Some(8.0),
                precip_in: Some(0.0),
                snowfall_in: Some(0.0),
            })
            .collect();
        WeatherData {
            elevation_ft: Some(8500.0),
            utc_offset_seconds: Some(-7 * 3600),
            current_temp_f: Some(28.0),
            current_feels_like_f: Some(24.0),
            current_wind_mph: Some(5.0),
            current_gust_mph: Some(8.0),
            hours,
        }
    }

    fn score_pipeline(set: &ProviderSet) -> Vec<HazardFactor> {
        let req = request();
        let map = relevance::evaluate(&req, set);
        let terrain = terrain::classify(&req, set);
        score_factors(&req, set, &map, &terrain).unwrap()
    }

    #[test]
    fn test_every_impact_within_cap() {
        let mut set = empty_set();
        set.weather = Fetched::ok(calm_winter_weather());
        set.avalanche = Fetched::ok(bulletin(5, 6));

        for factor in score_pipeline(&set) {
            assert!(factor.impact >= 0.0 && factor.impact <= factor.cap);
        }
    }

    #[test]
    fn test_surface_impact_adds_refreeze_penalty_up_to_cap() {
        let assessment = TerrainAssessment {
            surface: SurfaceCode::Posthole,
            freeze_thaw: FreezeThawCode::NoRefreeze,
            segments: Vec::new(),
        };
        let (impact, _) = surface_impact(&assessment);
        assert_eq!(impact, SURFACE_CAP);

        let assessment = TerrainAssessment {
            surface: SurfaceCode::Mud,
            freeze_thaw: FreezeThawCode::NoFreeze,
            segments: Vec::new(),
        };
        let (impact, _) = surface_impact(&assessment);
        assert_eq!(impact, 8.0);
    }

    #[test]
    fn test_not_relevant_scores_zero_with_reason() {
        let factors = score_pipeline(&empty_set());
        let alerts = factors
            .iter()
            .find(|f| f.category == HazardCategory::Alerts)
            .unwrap();
        assert!(!alerts.relevant);
        assert_eq!(alerts.impact, 0.0);
        assert!(!alerts.explanation.is_empty());
    }

    #[test]
    fn test_higher_danger_scores_higher() {
        let mut low = empty_set();
        low.weather = Fetched::ok(calm_winter_weather());
        low.avalanche = Fetched::ok(bulletin(2, 1));

        let mut high = low.clone();
        high.avalanche = Fetched::ok(bulletin(4, 1));

        let low_impact = score_pipeline(&low)
            .into_iter()
            .find(|f| f.category == HazardCategory::Avalanche)
            .unwrap()
            .impact;
        let high_impact = score_pipeline(&high)
            .into_iter()
            .find(|f| f.category == HazardCategory::Avalanche)
            .unwrap()
            .impact;
        assert!(high_impact > low_impact);
    }

    #[test]
    fn test_heat_risk_uses_trailing_peak_not_current() {
        // The current feels-like is mild but the trailing series peaked hot.
        let mut weather = calm_winter_weather();
        for h in weather.hours.iter_mut() {
            h.feels_like_f = Some(if h.offset_hours == -10 { 102.0 } else { 70.0 });
            h.temp_f = Some(70.0);
        }
        weather.current_feels_like_f = Some(70.0);
        let mut set = empty_set();
        set.weather = Fetched::ok(weather);

        let factors = score_pipeline(&set);
        let temp = factors
            .iter()
            .find(|f| f.category == HazardCategory::TemperatureStress)
            .unwrap();
        assert!(temp.impact > 0.0);
        assert!(temp.explanation.contains("102"));
    }

    #[test]
    fn test_safety_score_clamps_and_labels() {
        let factors = vec![HazardFactor {
            category: HazardCategory::Avalanche,
            impact: 30.0,
            cap: AVALANCHE_CAP,
            relevant: true,
            explanation: String::new(),
        }];
        let safety = safety_score(&factors);
        assert_eq!(safety.score, 70);
        assert_eq!(safety.label, crate::model::SafetyLabel::Caution);

        let heavy: Vec<HazardFactor> = HazardCategory::ALL
            .into_iter()
            .map(|category| HazardFactor {
                category,
                impact: cap_for(category),
                cap: cap_for(category),
                relevant: true,
                explanation: String::new(),
            })
            .collect();
        assert_eq!(safety_score(&heavy).score, 0);
    }

    #[test]
    fn test_confidence_deducts_per_status_and_floors() {
        let req = request();
        let set = empty_set();
        let map = relevance::evaluate(&req, &set);
        // Seven zeroed providers deduct past the floor.
        let confidence = confidence_score(&set, &map).unwrap();
        assert_eq!(confidence.score, crate::model::CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_zeroed_rainfall_lowers_confidence_below_all_ok() {
        let req = request();
        let mut set = empty_set();
        set.weather = Fetched::ok(calm_winter_weather());
        set.solar = Fetched::ok(Default::default());
        set.avalanche = Fetched::ok(bulletin(2, 0));
        set.snowpack = Fetched::ok(crate::providers::snowpack::SnowpackData {
            station_id: "824".into(),
            station_name: "Brighton".into(),
            distance_mi: 6.0,
            snow_depth_in: Some(0.0),
            swe_in: None,
        });
        set.rainfall = Fetched::ok(crate::model::RainfallTotals {
            past_12h_in: Some(0.0),
            past_24h_in: Some(0.0),
            past_48h_in: Some(0.0),
            status: ProviderStatus::Ok,
        });
        set.alerts = Fetched::ok(vec![]);
        set.air_quality = Fetched::ok(crate::providers::air_quality::AirQualityData {
            aqi: Some(30.0),
            primary_pollutant: None,
        });

        let all_ok = confidence_score(&set, &relevance::evaluate(&req, &set)).unwrap();
        assert_eq!(all_ok.score, 100);

        set.rainfall = Fetched::zeroed("upstream down");
        let degraded = confidence_score(&set, &relevance::evaluate(&req, &set)).unwrap();
        // 15 for the zeroed provider plus 10 for the suppressed surface chain.
        assert_eq!(degraded.score, 75);
    }

    #[test]
    fn test_missing_relevance_entry_is_computation_error() {
        let req = request();
        let set = empty_set();
        let terrain = terrain::classify(&req, &set);
        let empty_map = RelevanceMap::default();
        let err = score_factors(&req, &set, &empty_map, &terrain).unwrap_err();
        assert!(matches!(err, RequestError::Computation(_)));
    }

    #[test]
    fn test_double_mark_is_rejected() {
        let mut slot = FactorSlot::new(HazardCategory::Wind);
        slot.mark(true, "first".into()).unwrap();
        assert!(slot.mark(true, "second".into()).is_err());
    }

    #[test]
    fn test_impact_above_cap_is_rejected() {
        let mut slot = FactorSlot::new(HazardCategory::Wind);
        slot.mark(true, "windy".into()).unwrap();
        assert!(slot.score(WIND_CAP + 1.0, "too much".into()).is_err());
    }
}
