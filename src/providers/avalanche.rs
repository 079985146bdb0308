//! Avalanche bulletin client: zone resolution, regional overrides, and a
//! two-tier bulletin feed.
//!
//! # Zone resolution
//!
//! The forecast zone for a point is resolved against an embedded zone table:
//! regional override rules first, then polygon containment, then nearest
//! centroid. Resolution never fails; a point in the middle of the ocean
//! still maps to its nearest zone, with the method recorded so the caller can
//! judge how meaningful the match is.
//!
//! # Regional overrides
//!
//! Some avalanche centers need bespoke handling (merged single-rating feeds,
//! polygon gaps along center boundaries). Those rules live in one enumerated
//! table, [`REGIONAL_OVERRIDES`], applied as a single lookup before generic
//! resolution and parsing, never as inline special cases.
//!
//! # Bulletin feed
//!
//! The structured JSON feed is tried first (cached ~10 minutes). An HTML
//! scrape of the center's public page is used only when the structured feed
//! is unavailable, and validates response status before touching markup.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{cache_key, SafetyCache, AVALANCHE_FEED_TTL_SECS};
use crate::model::{AvalancheBulletin, DangerByBand, SafetyRequest, ZoneResolution};
use crate::providers::Fetched;

/// Base URL for the structured bulletin feed.
const BULLETIN_API_BASE: &str = "https://api.avalanche.example.org/v2";

/// Base URL for the HTML scrape fallback.
const SCRAPE_BASE: &str = "https://www.avalanche.example.org";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

// ============================================================================
// Embedded zone table
// ============================================================================

struct Zone {
    id: &'static str,
    name: &'static str,
    centroid: (f64, f64),
    /// Counter-clockwise (lat, lon) vertices.
    polygon: &'static [(f64, f64)],
}

static ZONES: &[Zone] = &[
    Zone {
        id: "wasatch-salt-lake",
        name: "Salt Lake Area Mountains",
        centroid: (40.60, -111.65),
        polygon: &[
            (40.40, -111.85),
            (40.40, -111.45),
            (40.85, -111.45),
            (40.85, -111.85),
        ],
    },
    Zone {
        id: "colorado-front-range",
        name: "Front Range",
        centroid: (39.90, -105.70),
        polygon: &[
            (39.40, -106.10),
            (39.40, -105.30),
            (40.40, -105.30),
            (40.40, -106.10),
        ],
    },
    Zone {
        id: "sierra-central",
        name: "Central Sierra Nevada",
        centroid: (39.10, -120.20),
        polygon: &[
            (38.70, -120.45),
            (38.70, -119.90),
            (39.45, -119.90),
            (39.45, -120.45),
        ],
    },
    Zone {
        id: "mt-hood",
        name: "Mt Hood",
        centroid: (45.37, -121.70),
        polygon: &[
            (45.20, -121.90),
            (45.20, -121.50),
            (45.55, -121.50),
            (45.55, -121.90),
        ],
    },
    Zone {
        id: "chugach-turnagain",
        name: "Turnagain Pass",
        centroid: (60.78, -149.20),
        polygon: &[
            (60.55, -149.60),
            (60.55, -148.80),
            (61.00, -148.80),
            (61.00, -149.60),
        ],
    },
];

// ============================================================================
// Regional override table
// ============================================================================

/// A bespoke handling rule for one region's feed.
///
/// `lat_range`/`lon_range` assign the zone directly when the point falls in
/// the box, covering known polygon gaps. `merged_band_rating` marks feeds
/// that publish one overall rating instead of per-band ratings.
pub struct RegionalOverride {
    pub region_id: &'static str,
    pub zone_id: &'static str,
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
    pub merged_band_rating: bool,
    pub note: &'static str,
}

/// The enumerated override set. Auditable and testable on its own; generic
/// resolution and parsing consult it as a single lookup.
pub static REGIONAL_OVERRIDES: &[RegionalOverride] = &[
    RegionalOverride {
        region_id: "wasatch-benches",
        zone_id: "wasatch-salt-lake",
        lat_range: (40.40, 40.85),
        lon_range: (-112.05, -111.85),
        merged_band_rating: false,
        note: "valley bench terrain west of the zone polygon forecasts with Salt Lake",
    },
    RegionalOverride {
        region_id: "sierra-merged-feed",
        zone_id: "sierra-central",
        lat_range: (38.70, 39.45),
        lon_range: (-120.45, -119.90),
        merged_band_rating: true,
        note: "center publishes a single combined rating; applied to all bands",
    },
];

fn override_for_point(latitude: f64, longitude: f64) -> Option<&'static RegionalOverride> {
    REGIONAL_OVERRIDES.iter().find(|o| {
        latitude >= o.lat_range.0
            && latitude <= o.lat_range.1
            && longitude >= o.lon_range.0
            && longitude <= o.lon_range.1
    })
}

fn override_for_zone(zone_id: &str) -> Option<&'static RegionalOverride> {
    REGIONAL_OVERRIDES.iter().find(|o| o.zone_id == zone_id)
}

// ============================================================================
// Zone resolution
// ============================================================================

/// Ray-casting point-in-polygon test over (lat, lon) vertices.
fn point_in_polygon(lat: f64, lon: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let (lat_i, lon_i) = polygon[i];
        let (lat_j, lon_j) = polygon[j];
        if ((lat_i > lat) != (lat_j > lat))
            && (lon < (lon_j - lon_i) * (lat - lat_i) / (lat_j - lat_i) + lon_i)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn centroid_distance_sq(lat: f64, lon: f64, centroid: (f64, f64)) -> f64 {
    let dlat = lat - centroid.0;
    let dlon = lon - centroid.1;
    dlat * dlat + dlon * dlon
}

/// Resolve the forecast zone for a point. Never fails.
fn resolve_zone(latitude: f64, longitude: f64) -> (&'static Zone, ZoneResolution) {
    // Regional overrides apply before general resolution completes.
    if let Some(rule) = override_for_point(latitude, longitude) {
        if let Some(zone) = ZONES.iter().find(|z| z.id == rule.zone_id) {
            return (zone, ZoneResolution::RegionOverride);
        }
    }

    for zone in ZONES {
        if point_in_polygon(latitude, longitude, zone.polygon) {
            return (zone, ZoneResolution::Polygon);
        }
    }

    // Outside all polygons: nearest centroid. The table is non-empty, so the
    // unwrap cannot fire.
    let nearest = ZONES
        .iter()
        .min_by(|a, b| {
            centroid_distance_sq(latitude, longitude, a.centroid)
                .total_cmp(&centroid_distance_sq(latitude, longitude, b.centroid))
        })
        .expect("zone table is non-empty");
    (nearest, ZoneResolution::Nearest)
}

// ============================================================================
// Client
// ============================================================================

/// Client for the avalanche bulletin chain.
#[derive(Clone)]
pub struct AvalancheClient {
    client: reqwest::Client,
    feed_base: String,
    scrape_base: String,
}

impl Default for AvalancheClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AvalancheClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            feed_base: BULLETIN_API_BASE.to_string(),
            scrape_base: SCRAPE_BASE.to_string(),
        }
    }

    /// Create a client with custom base URLs (for testing).
    pub fn with_base_urls(feed: &str, scrape: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            feed_base: feed.to_string(),
            scrape_base: scrape.to_string(),
        }
    }

    /// Run the chain. The zone always resolves; only bulletin content can
    /// degrade.
    pub async fn fetch(&self, request: &SafetyRequest, cache: &SafetyCache) -> Fetched<AvalancheBulletin> {
        let (zone, resolution) = resolve_zone(request.latitude, request.longitude);
        let rule = override_for_zone(zone.id);

        let key = cache_key("avalanche", zone.centroid.0, zone.centroid.1, zone.id);

        // Cached structured feed first.
        if let Some((value, age)) = cache.get(&key) {
            if let Ok(feed) = serde_json::from_value::<BulletinFeed>(value) {
                let mut fetched = Fetched::ok(bulletin_from_feed(zone, resolution, rule, &feed));
                fetched.age_seconds = age;
                return fetched;
            }
        }

        // Live structured feed.
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_feed(zone.id)).await {
            Ok(Ok(feed)) => {
                if let Ok(value) = serde_json::to_value(&feed) {
                    cache.set(&key, value, AVALANCHE_FEED_TTL_SECS);
                }
                return Fetched::ok(bulletin_from_feed(zone, resolution, rule, &feed));
            }
            Ok(Err(e)) => debug!(error = %e, zone = zone.id, "bulletin feed fetch failed"),
            Err(_) => debug!(zone = zone.id, "bulletin feed fetch timed out"),
        }

        // HTML scrape fallback.
        match tokio::time::timeout(CALL_TIMEOUT, self.scrape_danger(zone.id)).await {
            Ok(Ok(rating)) => {
                let bulletin = AvalancheBulletin {
                    zone_id: zone.id.to_string(),
                    zone_name: zone.name.to_string(),
                    danger: DangerByBand {
                        below_treeline: Some(rating),
                        near_treeline: Some(rating),
                        above_treeline: Some(rating),
                    },
                    problems: Vec::new(),
                    bottom_line: None,
                    resolution_method: resolution,
                };
                return Fetched::degraded(
                    bulletin,
                    "avalanche: structured feed unavailable; danger scraped from center page",
                );
            }
            Ok(Err(e)) => debug!(error = %e, zone = zone.id, "bulletin scrape failed"),
            Err(_) => debug!(zone = zone.id, "bulletin scrape timed out"),
        }

        // Terminal: zone still resolved, ratings unknown.
        let mut fetched = Fetched::zeroed("avalanche: bulletin unavailable from all tiers");
        fetched.payload = Some(AvalancheBulletin {
            zone_id: zone.id.to_string(),
            zone_name: zone.name.to_string(),
            danger: DangerByBand::default(),
            problems: Vec::new(),
            bottom_line: None,
            resolution_method: resolution,
        });
        fetched
    }

    /// Zone-resolution-only envelope, for when the shared request deadline
    /// has already expired. The zone still resolves; ratings stay unknown.
    pub fn resolve_only(&self, request: &SafetyRequest) -> Fetched<AvalancheBulletin> {
        let (zone, resolution) = resolve_zone(request.latitude, request.longitude);
        let mut fetched = Fetched::zeroed("avalanche: deadline exceeded before bulletin fetch");
        fetched.payload = Some(AvalancheBulletin {
            zone_id: zone.id.to_string(),
            zone_name: zone.name.to_string(),
            danger: DangerByBand::default(),
            problems: Vec::new(),
            bottom_line: None,
            resolution_method: resolution,
        });
        fetched
    }

    async fn fetch_feed(&self, zone_id: &str) -> anyhow::Result<BulletinFeed> {
        let url = format!("{}/bulletin?zone={}", self.feed_base, zone_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("bulletin feed returned status {}", response.status());
        }
        Ok(response.json::<BulletinFeed>().await?)
    }

    /// Scrape the center's public page for a danger-rating keyword. Status is
    /// validated before the markup is searched.
    async fn scrape_danger(&self, zone_id: &str) -> anyhow::Result<u8> {
        let url = format!("{}/zone/{}", self.scrape_base, zone_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("bulletin page returned status {}", response.status());
        }
        let html = response.text().await?;

        danger_from_markup(&html)
            .ok_or_else(|| anyhow::anyhow!("no danger rating keyword found in page"))
    }
}

/// Extract the highest danger-rating keyword present in page markup.
///
/// Keywords only count as whole words, and only when a rating-context word
/// ("danger", "rating", "avalanche") appears within a few words before them.
/// Page chrome like "Season highlights" or "Follow us" must not mint a
/// rating.
fn danger_from_markup(html: &str) -> Option<u8> {
    const CONTEXT_WINDOW: usize = 6;

    let lowered = html.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut best: Option<u8> = None;
    for (i, word) in words.iter().enumerate() {
        let rating = match *word {
            "extreme" => 5u8,
            "high" => 4,
            "considerable" => 3,
            "moderate" => 2,
            "low" => 1,
            _ => continue,
        };
        let context_start = i.saturating_sub(CONTEXT_WINDOW);
        let in_context = words[context_start..i]
            .iter()
            .any(|w| matches!(*w, "danger" | "rating" | "avalanche"));
        if in_context && best.map_or(true, |b| rating > b) {
            best = Some(rating);
        }
    }
    best
}

// ============================================================================
// Feed types
// ============================================================================

/// Structured bulletin feed payload. Serialized into the cache as-is.
#[derive(Debug, serde::Serialize, Deserialize)]
struct BulletinFeed {
    #[serde(default)]
    danger: Option<FeedDanger>,

    #[serde(default)]
    overall: Option<DangerValue>,

    #[serde(default)]
    problems: Vec<FeedProblem>,

    #[serde(default)]
    bottom_line: Option<String>,
}

#[derive(Debug, Default, serde::Serialize, Deserialize)]
struct FeedDanger {
    #[serde(default)]
    below_treeline: Option<DangerValue>,

    #[serde(default)]
    near_treeline: Option<DangerValue>,

    #[serde(default)]
    above_treeline: Option<DangerValue>,
}

/// A danger rating as it arrives on the wire: some feeds send the 1-5 number,
/// others the rating name. Normalized at this boundary; downstream code only
/// ever sees `Option<u8>`.
#[derive(Debug, serde::Serialize, Deserialize)]
#[serde(untagged)]
enum DangerValue {
    Level(f64),
    Name(String),
}

impl DangerValue {
    fn to_rating(&self) -> Option<u8> {
        match self {
            DangerValue::Level(n) if (1.0..=5.0).contains(n) => Some(*n as u8),
            DangerValue::Level(_) => None,
            DangerValue::Name(name) => match name.to_lowercase().as_str() {
                "low" => Some(1),
                "moderate" => Some(2),
                "considerable" => Some(3),
                "high" => Some(4),
                "extreme" => Some(5),
                _ => None,
            },
        }
    }
}

#[derive(Debug, serde::Serialize, Deserialize)]
struct FeedProblem {
    #[serde(default)]
    name: Option<String>,
}

fn bulletin_from_feed(
    zone: &Zone,
    resolution: ZoneResolution,
    rule: Option<&RegionalOverride>,
    feed: &BulletinFeed,
) -> AvalancheBulletin {
    let merged = rule.is_some_and(|r| r.merged_band_rating);

    let danger = if merged {
        // Merged-feed override: one overall rating applied to every band.
        let rating = feed
            .overall
            .as_ref()
            .and_then(DangerValue::to_rating)
            .or_else(|| {
                feed.danger
                    .as_ref()
                    .and_then(|d| d.above_treeline.as_ref())
                    .and_then(DangerValue::to_rating)
            });
        DangerByBand {
            below_treeline: rating,
            near_treeline: rating,
            above_treeline: rating,
        }
    } else {
        let d = feed.danger.as_ref();
        DangerByBand {
            below_treeline: d
                .and_then(|d| d.below_treeline.as_ref())
                .and_then(DangerValue::to_rating),
            near_treeline: d
                .and_then(|d| d.near_treeline.as_ref())
                .and_then(DangerValue::to_rating),
            above_treeline: d
                .and_then(|d| d.above_treeline.as_ref())
                .and_then(DangerValue::to_rating),
        }
    };

    AvalancheBulletin {
        zone_id: zone.id.to_string(),
        zone_name: zone.name.to_string(),
        danger,
        problems: feed
            .problems
            .iter()
            .filter_map(|p| p.name.clone())
            .collect(),
        bottom_line: feed.bottom_line.clone(),
        resolution_method: resolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn request(lat: f64, lon: f64) -> SafetyRequest {
        SafetyRequest {
            latitude: lat,
            longitude: lon,
            date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_point_inside_polygon_resolves_via_polygon() {
        let (zone, method) = resolve_zone(40.58, -111.64);
        assert_eq!(zone.id, "wasatch-salt-lake");
        assert_eq!(method, ZoneResolution::Polygon);
    }

    #[test]
    fn test_point_outside_all_polygons_resolves_nearest() {
        // Idaho backcountry: no polygon contains it, nearest centroid wins.
        let (zone, method) = resolve_zone(43.5, -114.3);
        assert_eq!(method, ZoneResolution::Nearest);
        assert!(!zone.id.is_empty());
    }

    #[test]
    fn test_resolution_never_unresolved() {
        // Middle of the Pacific still maps to some zone.
        let (zone, method) = resolve_zone(10.0, -150.0);
        assert_eq!(method, ZoneResolution::Nearest);
        assert!(!zone.id.is_empty());
    }

    #[test]
    fn test_override_box_beats_polygon_resolution() {
        // West bench terrain outside the Salt Lake polygon but inside the
        // override box.
        let (zone, method) = resolve_zone(40.60, -111.95);
        assert_eq!(zone.id, "wasatch-salt-lake");
        assert_eq!(method, ZoneResolution::RegionOverride);
    }

    #[test]
    fn test_danger_value_variants_normalize() {
        assert_eq!(DangerValue::Level(3.0).to_rating(), Some(3));
        assert_eq!(DangerValue::Level(9.0).to_rating(), None);
        assert_eq!(DangerValue::Name("Considerable".into()).to_rating(), Some(3));
        assert_eq!(DangerValue::Name("pockets".into()).to_rating(), None);
    }

    #[test]
    fn test_merged_feed_override_applies_overall_to_all_bands() {
        let zone = ZONES.iter().find(|z| z.id == "sierra-central").unwrap();
        let rule = override_for_zone("sierra-central");
        assert!(rule.is_some_and(|r| r.merged_band_rating));

        let feed = BulletinFeed {
            danger: None,
            overall: Some(DangerValue::Name("High".into())),
            problems: vec![],
            bottom_line: None,
        };

        let bulletin = bulletin_from_feed(zone, ZoneResolution::Polygon, rule, &feed);
        assert_eq!(bulletin.danger.below_treeline, Some(4));
        assert_eq!(bulletin.danger.near_treeline, Some(4));
        assert_eq!(bulletin.danger.above_treeline, Some(4));
    }

    #[test]
    fn test_per_band_feed_parses_each_band() {
        let zone = ZONES.iter().find(|z| z.id == "wasatch-salt-lake").unwrap();
        let feed = BulletinFeed {
            danger: Some(FeedDanger {
                below_treeline: Some(DangerValue::Level(1.0)),
                near_treeline: Some(DangerValue::Name("moderate".into())),
                above_treeline: None,
            }),
            overall: None,
            problems: vec![FeedProblem {
                name: Some("Wind Slab".into()),
            }],
            bottom_line: Some("Watch wind-loaded slopes.".into()),
        };

        let bulletin = bulletin_from_feed(zone, ZoneResolution::Polygon, None, &feed);
        assert_eq!(bulletin.danger.below_treeline, Some(1));
        assert_eq!(bulletin.danger.near_treeline, Some(2));
        assert_eq!(bulletin.danger.above_treeline, None);
        assert_eq!(bulletin.problems, vec!["Wind Slab".to_string()]);
    }

    #[test]
    fn test_danger_from_markup_prefers_worst_keyword() {
        let html = "<div class='rating'>Danger is MODERATE near treeline \
                    and the danger is HIGH above treeline</div>";
        assert_eq!(danger_from_markup(html), Some(4));
        assert_eq!(danger_from_markup("<p>nothing here</p>"), None);
    }

    #[test]
    fn test_danger_from_markup_ignores_keywords_outside_rating_context() {
        // Whole-word and context rules keep page chrome from minting a
        // rating: "Follow" contains "low" and "highlights" contains "high".
        assert_eq!(danger_from_markup("<p>Follow us on social media</p>"), None);
        assert_eq!(danger_from_markup("<h2>Season highlights</h2>"), None);
        assert_eq!(
            danger_from_markup("<p>high winds expected this weekend</p>"),
            None
        );
    }

    #[tokio::test]
    async fn test_fetch_terminal_still_resolves_zone() {
        let client = AvalancheClient::with_base_urls("http://127.0.0.1:1", "http://127.0.0.1:1");
        let cache = SafetyCache::with_capacity(8);

        let fetched = client.fetch(&request(40.58, -111.64), &cache).await;

        assert_eq!(fetched.status, crate::model::ProviderStatus::Zeroed);
        let bulletin = fetched.payload.unwrap();
        assert_eq!(bulletin.zone_id, "wasatch-salt-lake");
        assert_eq!(bulletin.resolution_method, ZoneResolution::Polygon);
        assert_eq!(bulletin.danger.max_rating(), None);
    }
}
