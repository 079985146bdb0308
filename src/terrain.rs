//! Surface and freeze-thaw classification.
//!
//! Classification crosses the diurnal temperature trend with solar geometry:
//! an above-freezing forecast alone does not make a thaw. A shaded winter sun
//! barely above the horizon will not soften a frozen crust even at 35 F, so
//! each time band only counts as thawed when the trend is above freezing AND
//! the sun is meaningfully up.

use serde::{Deserialize, Serialize};

use crate::model::SafetyRequest;
use crate::orchestrator::ProviderSet;
use crate::providers::snowpack::SnowpackData;
use crate::providers::solar::{solar_elevation_deg, SolarTimes};
use crate::providers::weather::WeatherData;

/// Minimum solar elevation for the sun to contribute to a thaw, degrees.
const MIN_THAW_SUN_ELEVATION_DEG: f64 = 10.0;

/// Trailing rain beyond which bare ground is treated as mud, inches.
const MUD_RAIN_THRESHOLD_IN: f64 = 0.1;

/// Local hours of the three assessment bands.
const BAND_HOURS: [(&str, i32); 3] = [("morning", 8), ("midday", 12), ("afternoon", 16)];

// ============================================================================
// Codes
// ============================================================================

/// What the ground underfoot is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceCode {
    Dry,
    Mud,
    FrozenCrust,
    /// Unconsolidated snow that will not support body weight.
    Posthole,
    Slush,
    /// Firm, supportable snow.
    ConsolidatedSnow,
    /// Snow is present but its condition could not be determined.
    SnowUnknown,
}

impl SurfaceCode {
    /// Ordering by how adverse the surface is for travel. Used to pick the
    /// headline code from the band segments.
    fn adversity(self) -> u8 {
        match self {
            SurfaceCode::Dry => 0,
            SurfaceCode::ConsolidatedSnow => 1,
            SurfaceCode::SnowUnknown => 2,
            SurfaceCode::FrozenCrust => 3,
            SurfaceCode::Mud => 4,
            SurfaceCode::Slush => 5,
            SurfaceCode::Posthole => 6,
        }
    }
}

/// The diurnal freeze-thaw regime across the travel day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeThawCode {
    /// The trend never reaches freezing.
    NoFreeze,
    /// Froze overnight, thaws during the day.
    OvernightFreezeDayThaw,
    /// Froze overnight and the day never climbs above freezing.
    DeepFreeze,
    /// Stayed above freezing overnight; snow never refroze.
    NoRefreeze,
}

/// One time band's expected surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainSegment {
    #[serde(rename = "timeOfDay")]
    pub time_of_day: String,
    pub code: SurfaceCode,
}

/// The full surface assessment attached to the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainAssessment {
    pub surface: SurfaceCode,
    #[serde(rename = "freezeThaw")]
    pub freeze_thaw: FreezeThawCode,
    pub segments: Vec<TerrainSegment>,
}

// ============================================================================
// Classification
// ============================================================================

/// Classify surface and freeze-thaw conditions for the travel day.
///
/// Degrades gracefully: with no temperature trend the result falls back to
/// `SnowUnknown` over snow or `Dry`/`Mud` over bare ground, never an error.
pub fn classify(request: &SafetyRequest, set: &ProviderSet) -> TerrainAssessment {
    use chrono::{Datelike, Timelike};

    let weather = set.weather.payload.as_ref();
    let snowpack = set.snowpack.payload.as_ref();
    let rainfall = set.rainfall.payload.as_ref();
    let solar = set.solar.payload.as_ref();

    let start_hour = request.start_time.hour() as i32;
    let has_snow = snowpack.and_then(SnowpackData::has_snow);
    let muddy = rainfall
        .and_then(|r| r.past_24h_in)
        .is_some_and(|r| r >= MUD_RAIN_THRESHOLD_IN);

    let overnight_low = weather.and_then(|w| w.overnight_low_f(start_hour));
    let day_max = weather.and_then(|w| day_max_f(w, start_hour));

    let freeze_thaw = freeze_thaw_code(overnight_low, day_max, has_snow);
    let day_of_year = request.date.ordinal();

    let segments: Vec<TerrainSegment> = BAND_HOURS
        .iter()
        .map(|&(name, hour)| {
            let band_temp = weather.and_then(|w| w.temp_at(hour));
            let sun_elev = solar_elevation_deg(request.latitude, day_of_year, hour as f64);
            // Fetched sun timing bounds the geometry approximation: a band
            // outside the reported sunrise/sunset window gets no thaw credit.
            let in_daylight = solar
                .map(|s| band_in_daylight(s, hour))
                .unwrap_or(true);
            let thawed = band_thawed(band_temp, sun_elev) && in_daylight;
            TerrainSegment {
                time_of_day: name.to_string(),
                code: band_code(freeze_thaw, has_snow, muddy, thawed, band_temp.is_some()),
            }
        })
        .collect();

    let surface = segments
        .iter()
        .map(|s| s.code)
        .max_by_key(|c| c.adversity())
        .unwrap_or(SurfaceCode::Dry);

    TerrainAssessment {
        surface,
        freeze_thaw,
        segments,
    }
}

/// Highest forecast temperature over the daytime half of the window.
fn day_max_f(weather: &WeatherData, start_hour: i32) -> Option<f64> {
    weather
        .hours
        .iter()
        .filter(|h| h.offset_hours >= start_hour && h.offset_hours < start_hour + 12)
        .filter_map(|h| h.temp_f)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

fn freeze_thaw_code(
    overnight_low: Option<f64>,
    day_max: Option<f64>,
    has_snow: Option<bool>,
) -> FreezeThawCode {
    match (overnight_low, day_max) {
        (Some(low), Some(max)) if low <= 32.0 && max <= 32.0 => FreezeThawCode::DeepFreeze,
        (Some(low), _) if low <= 32.0 => FreezeThawCode::OvernightFreezeDayThaw,
        (Some(_), _) if has_snow == Some(true) => FreezeThawCode::NoRefreeze,
        (Some(_), _) => FreezeThawCode::NoFreeze,
        // No trend data: the neutral regime.
        (None, _) => FreezeThawCode::NoFreeze,
    }
}

/// A band thaws only with both an above-freezing temperature and real sun.
fn band_thawed(band_temp: Option<f64>, sun_elevation_deg: f64) -> bool {
    band_temp.is_some_and(|t| t > 32.0) && sun_elevation_deg >= MIN_THAW_SUN_ELEVATION_DEG
}

/// Whether a band hour falls inside the fetched sunrise/sunset window.
/// Unknown ends are treated as open.
fn band_in_daylight(times: &SolarTimes, hour: i32) -> bool {
    let band = match chrono::NaiveTime::from_hms_opt(hour as u32, 0, 0) {
        Some(t) => t,
        None => return true,
    };
    let after_sunrise = times.sunrise_local.map_or(true, |sunrise| band >= sunrise);
    let before_sunset = times.sunset_local.map_or(true, |sunset| band < sunset);
    after_sunrise && before_sunset
}

fn band_code(
    freeze_thaw: FreezeThawCode,
    has_snow: Option<bool>,
    muddy: bool,
    thawed: bool,
    trend_known: bool,
) -> SurfaceCode {
    match has_snow {
        Some(true) => {
            if !trend_known {
                return SurfaceCode::SnowUnknown;
            }
            match freeze_thaw {
                FreezeThawCode::DeepFreeze => SurfaceCode::ConsolidatedSnow,
                FreezeThawCode::NoRefreeze => SurfaceCode::Posthole,
                FreezeThawCode::OvernightFreezeDayThaw => {
                    if thawed {
                        SurfaceCode::Slush
                    } else {
                        SurfaceCode::FrozenCrust
                    }
                }
                FreezeThawCode::NoFreeze => SurfaceCode::Posthole,
            }
        }
        _ => {
            // Bare or unknown ground.
            if muddy {
                if trend_known && !thawed && freeze_thaw != FreezeThawCode::NoFreeze {
                    SurfaceCode::FrozenCrust
                } else {
                    SurfaceCode::Mud
                }
            } else {
                SurfaceCode::Dry
            }
        }
    }
}
