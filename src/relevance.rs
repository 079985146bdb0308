//! Hazard-category relevance evaluation.
//!
//! Relevance decides whether a hazard category meaningfully applies to this
//! objective and time context, independent of whether data for it exists. It
//! is a genuine function of elevation, season, snowpack, and the planning
//! window, never a constant. Every category gets an entry with a recorded
//! reason; downstream, a non-relevant category still appears in the factor
//! list with zero impact so the omission is auditable.

use std::collections::BTreeMap;

use crate::error::RequestError;
use crate::model::{HazardCategory, SafetyRequest};
use crate::orchestrator::ProviderSet;

/// Elevation above which avalanche terrain is assumed present, feet.
const AVALANCHE_ELEVATION_FLOOR_FT: f64 = 4900.0;

/// Trailing rain beyond which the surface is assumed affected, inches.
const SURFACE_RAIN_THRESHOLD_IN: f64 = 0.1;

/// One category's relevance decision.
#[derive(Debug, Clone)]
pub struct Relevance {
    pub relevant: bool,
    pub reason: String,
}

impl Relevance {
    fn yes(reason: impl Into<String>) -> Self {
        Self {
            relevant: true,
            reason: reason.into(),
        }
    }

    fn no(reason: impl Into<String>) -> Self {
        Self {
            relevant: false,
            reason: reason.into(),
        }
    }
}

/// Relevance decisions for every category.
///
/// A missing entry is an internal contract violation: lookups return
/// `RequestError::Computation` rather than defaulting.
#[derive(Debug, Clone, Default)]
pub struct RelevanceMap {
    entries: BTreeMap<HazardCategory, Relevance>,
}

impl RelevanceMap {
    pub fn insert(&mut self, category: HazardCategory, relevance: Relevance) {
        self.entries.insert(category, relevance);
    }

    /// Look up a category. Absence is a scorer/evaluator bug, not a data
    /// problem.
    pub fn get(&self, category: HazardCategory) -> Result<&Relevance, RequestError> {
        self.entries.get(&category).ok_or_else(|| {
            RequestError::computation(format!(
                "relevance map is missing category {:?}",
                category
            ))
        })
    }
}

/// Whether the date falls inside the avalanche season for the hemisphere.
fn in_avalanche_season(latitude: f64, month: u32) -> bool {
    if latitude >= 0.0 {
        // Northern hemisphere: November through May.
        month >= 11 || month <= 5
    } else {
        // Southern hemisphere: May through October.
        (5..=10).contains(&month)
    }
}

/// Evaluate every hazard category for this request.
pub fn evaluate(request: &SafetyRequest, set: &ProviderSet) -> RelevanceMap {
    use chrono::Datelike;

    let mut map = RelevanceMap::default();
    let month = request.date.month();

    // Avalanche: seasonal + elevation/snowpack envelope.
    let elevation_ft = set.weather.payload.as_ref().and_then(|w| w.elevation_ft);
    let has_snow = set.snowpack.payload.as_ref().and_then(|s| s.has_snow());

    let avalanche = if !in_avalanche_season(request.latitude, month) {
        Relevance::no(format!(
            "outside the avalanche season envelope for this hemisphere (month {month})"
        ))
    } else {
        match (elevation_ft, has_snow) {
            (Some(elev), _) if elev >= AVALANCHE_ELEVATION_FLOOR_FT => Relevance::yes(format!(
                "in season at {elev:.0} ft, above the {AVALANCHE_ELEVATION_FLOOR_FT:.0} ft avalanche terrain floor"
            )),
            (_, Some(true)) => {
                Relevance::yes("in season with measured snow on the ground nearby")
            }
            (_, Some(false)) => {
                Relevance::no("in season but the nearest station reports bare ground")
            }
            (Some(elev), None) => Relevance::no(format!(
                "in season but {elev:.0} ft is below the avalanche terrain floor and no snow is confirmed"
            )),
            (None, None) => {
                // No elevation, no snowpack: assume terrain in season.
                Relevance::yes("in season; elevation and snowpack unknown, assuming avalanche terrain")
            }
        }
    };
    map.insert(HazardCategory::Avalanche, avalanche);

    map.insert(
        HazardCategory::Wind,
        Relevance::yes("wind exposure applies to any outdoor objective"),
    );
    map.insert(
        HazardCategory::TemperatureStress,
        Relevance::yes("heat and cold stress apply to any outdoor objective"),
    );
    map.insert(
        HazardCategory::Precipitation,
        Relevance::yes("forecast precipitation applies to any outdoor objective"),
    );

    // Surface conditions: needs a freeze-thaw, snow, or recent-rain trigger.
    let start_hour = {
        use chrono::Timelike;
        request.start_time.hour() as i32
    };
    let crosses_freezing = set
        .weather
        .payload
        .as_ref()
        .is_some_and(|w| w.crosses_freezing(start_hour - 12, start_hour + 12));
    let trailing_rain = set
        .rainfall
        .payload
        .as_ref()
        .and_then(|r| r.past_24h_in)
        .is_some_and(|r| r >= SURFACE_RAIN_THRESHOLD_IN);

    let surface = if has_snow == Some(true) {
        Relevance::yes("snow surface: supportability varies with freeze-thaw timing")
    } else if crosses_freezing {
        Relevance::yes("temperature trend crosses freezing across the travel window")
    } else if trailing_rain {
        Relevance::yes("recent rainfall indicates saturated or muddy surfaces")
    } else {
        Relevance::no("no freeze-thaw crossing, snow cover, or recent rain indicated")
    };
    map.insert(HazardCategory::SurfaceConditions, surface);

    map.insert(
        HazardCategory::AirQuality,
        Relevance::yes("sustained exertion increases exposure to ambient air"),
    );

    // Alerts: an alert exists AND its active window intersects the planning
    // window. Existence alone is not relevance.
    let offset = set
        .weather
        .payload
        .as_ref()
        .and_then(|w| w.utc_offset_seconds);
    let (window_start, window_end) = request.planning_window(offset);
    let intersecting = set
        .alerts
        .payload
        .as_ref()
        .map(|alerts| {
            alerts
                .iter()
                .filter(|a| a.intersects(window_start, window_end))
                .count()
        })
        .unwrap_or(0);

    let alerts = if intersecting > 0 {
        Relevance::yes(format!(
            "{intersecting} active alert(s) overlap the planning window"
        ))
    } else if set
        .alerts
        .payload
        .as_ref()
        .is_some_and(|alerts| !alerts.is_empty())
    {
        Relevance::no("active alerts exist but none overlap the planning window")
    } else {
        Relevance::no("no active alerts overlap the planning window")
    };
    map.insert(HazardCategory::Alerts, alerts);

    map
}
