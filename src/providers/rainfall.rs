//! Rainfall accumulation client with a four-tier fallback chain.
//!
//! Tiers, in order:
//!
//! 1. Live forecast API trailing precipitation accumulation.
//! 2. Fresh cache entry within TTL.
//! 3. Archive/historical API, whose result is written back into the cache so
//!    future requests hit the fresh tier.
//! 4. Stale cache entry past TTL (status `stale`).
//! 5. Terminal zeroed fallback: all totals explicitly null, never `0.0`, so
//!    downstream scoring records "no data" instead of silently treating the
//!    gap as favorable conditions.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::{cache_key, SafetyCache, RAINFALL_ARCHIVE_TTL_SECS};
use crate::model::{ProviderStatus, RainfallTotals, SafetyRequest};
use crate::providers::Fetched;

/// Base URL for the live precipitation API.
const LIVE_API_BASE: &str = "https://api.open-meteo.com/v1";

/// Base URL for the historical archive API.
const ARCHIVE_API_BASE: &str = "https://archive-api.open-meteo.com/v1";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Client for the rainfall chain.
#[derive(Clone)]
pub struct RainfallClient {
    client: reqwest::Client,
    live_base: String,
    archive_base: String,
}

impl Default for RainfallClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RainfallClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            live_base: LIVE_API_BASE.to_string(),
            archive_base: ARCHIVE_API_BASE.to_string(),
        }
    }

    /// Create a client with custom base URLs (for testing).
    pub fn with_base_urls(live: &str, archive: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            live_base: live.to_string(),
            archive_base: archive.to_string(),
        }
    }

    /// Run the full chain. Never returns an error; the terminal tier always
    /// produces a zeroed envelope.
    pub async fn fetch(&self, request: &SafetyRequest, cache: &SafetyCache) -> Fetched<RainfallTotals> {
        let key = cache_key(
            "rainfall",
            request.latitude,
            request.longitude,
            &request.date.format("%Y-%m-%d").to_string(),
        );

        // Tier 1: live forecast accumulation.
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_live(request)).await {
            Ok(Ok(totals)) if totals.has_data() => {
                cache.set(&key, totals_to_value(&totals), RAINFALL_ARCHIVE_TTL_SECS);
                return Fetched::ok(totals);
            }
            Ok(Ok(_)) => debug!("live rainfall returned no usable totals"),
            Ok(Err(e)) => debug!(error = %e, "live rainfall fetch failed"),
            Err(_) => debug!("live rainfall fetch timed out"),
        }

        // Tier 2: fresh cache entry.
        if let Some((value, age)) = cache.get(&key) {
            if let Some(totals) = totals_from_value(&value, ProviderStatus::Ok) {
                let mut fetched = Fetched::ok(totals);
                fetched.age_seconds = age;
                return fetched;
            }
        }

        // Tier 3: archive API, written back into the cache.
        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_archive(request)).await {
            Ok(Ok(totals)) if totals.has_data() => {
                cache.set(&key, totals_to_value(&totals), RAINFALL_ARCHIVE_TTL_SECS);
                let mut degraded = totals;
                degraded.status = ProviderStatus::Degraded;
                return Fetched::degraded(
                    degraded,
                    "rainfall: live source unavailable; totals from archive API",
                );
            }
            Ok(Ok(_)) => debug!("archive rainfall returned no usable totals"),
            Ok(Err(e)) => debug!(error = %e, "archive rainfall fetch failed"),
            Err(_) => debug!("archive rainfall fetch timed out"),
        }

        // Tier 4: stale cache entry past TTL.
        if let Some((value, age, past_ttl)) = cache.get_stale(&key) {
            if past_ttl {
                if let Some(totals) = totals_from_value(&value, ProviderStatus::Stale) {
                    return Fetched::stale(
                        totals,
                        age,
                        "rainfall: serving cached totals past their TTL",
                    );
                }
            }
        }

        // Tier 5: terminal zeroed fallback.
        let mut fetched = Fetched::zeroed("rainfall: all tiers unavailable; totals are null");
        fetched.payload = Some(RainfallTotals::zeroed());
        fetched
    }

    /// Cache-only tiers, for when the shared request deadline has already
    /// expired: fresh cache, then stale cache, then zeroed. No network.
    pub fn fetch_from_cache_only(
        &self,
        request: &SafetyRequest,
        cache: &SafetyCache,
    ) -> Fetched<RainfallTotals> {
        let key = cache_key(
            "rainfall",
            request.latitude,
            request.longitude,
            &request.date.format("%Y-%m-%d").to_string(),
        );

        if let Some((value, age, past_ttl)) = cache.get_stale(&key) {
            let status = if past_ttl {
                ProviderStatus::Stale
            } else {
                ProviderStatus::Ok
            };
            if let Some(totals) = totals_from_value(&value, status) {
                return if past_ttl {
                    Fetched::stale(totals, age, "rainfall: serving cached totals past their TTL")
                } else {
                    let mut fetched = Fetched::ok(totals);
                    fetched.age_seconds = age;
                    fetched
                };
            }
        }

        let mut fetched = Fetched::zeroed("rainfall: deadline exceeded with no cached totals");
        fetched.payload = Some(RainfallTotals::zeroed());
        fetched
    }

    async fn fetch_live(&self, request: &SafetyRequest) -> anyhow::Result<RainfallTotals> {
        let url = format!(
            "{}/forecast?latitude={}&longitude={}&hourly=precipitation\
             &precipitation_unit=inch&past_days=2&forecast_days=1",
            self.live_base, request.latitude, request.longitude
        );
        self.fetch_hourly(&url, ProviderStatus::Ok).await
    }

    async fn fetch_archive(&self, request: &SafetyRequest) -> anyhow::Result<RainfallTotals> {
        let start = request.date - chrono::Duration::days(2);
        let url = format!(
            "{}/archive?latitude={}&longitude={}&hourly=precipitation\
             &precipitation_unit=inch&start_date={}&end_date={}",
            self.archive_base,
            request.latitude,
            request.longitude,
            start.format("%Y-%m-%d"),
            request.date.format("%Y-%m-%d")
        );
        self.fetch_hourly(&url, ProviderStatus::Degraded).await
    }

    async fn fetch_hourly(
        &self,
        url: &str,
        status: ProviderStatus,
    ) -> anyhow::Result<RainfallTotals> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("rainfall API returned status {}", response.status());
        }
        let body = response.json::<HourlyPrecipResponse>().await?;
        let hourly = body.hourly.unwrap_or_default().precipitation;
        Ok(totals_from_hourly(&hourly, status))
    }
}

/// Sum the trailing `hours` entries. `None` when every entry in the window is
/// null; a window of real zeroes sums to `Some(0.0)`.
fn sum_trailing(hourly: &[Option<f64>], hours: usize) -> Option<f64> {
    let start = hourly.len().saturating_sub(hours);
    let present: Vec<f64> = hourly[start..].iter().copied().flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum())
    }
}

fn totals_from_hourly(hourly: &[Option<f64>], status: ProviderStatus) -> RainfallTotals {
    RainfallTotals {
        past_12h_in: sum_trailing(hourly, 12),
        past_24h_in: sum_trailing(hourly, 24),
        past_48h_in: sum_trailing(hourly, 48),
        status,
    }
}

fn totals_to_value(totals: &RainfallTotals) -> serde_json::Value {
    json!({
        "past12hIn": totals.past_12h_in,
        "past24hIn": totals.past_24h_in,
        "past48hIn": totals.past_48h_in,
    })
}

fn totals_from_value(value: &serde_json::Value, status: ProviderStatus) -> Option<RainfallTotals> {
    let totals = RainfallTotals {
        past_12h_in: value.get("past12hIn").and_then(|v| v.as_f64()),
        past_24h_in: value.get("past24hIn").and_then(|v| v.as_f64()),
        past_48h_in: value.get("past48hIn").and_then(|v| v.as_f64()),
        status,
    };
    totals.has_data().then_some(totals)
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HourlyPrecipResponse {
    #[serde(default)]
    hourly: Option<HourlyPrecip>,
}

#[derive(Debug, Default, Deserialize)]
struct HourlyPrecip {
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}
