//! Fan-out/fan-in of all provider fetchers under one shared request deadline.
//!
//! The orchestrator's only job is to run every fetcher concurrently and
//! collect a complete [`ProviderSet`], one envelope per category, no matter
//! how many fetchers degrade. It performs no retries; the tiering inside each
//! fetcher is the retry policy. A fetcher that exceeds the deadline gets its
//! chain's deadline fallback (for rainfall and avalanche, the local tiers are
//! still consulted; everything else zeroes).
//!
//! The set is field-structured rather than completion-ordered, so the output
//! is identical regardless of how the concurrent completions interleave, and
//! downstream components never observe partial completion.

use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::SafetyCache;
use crate::model::{AvalancheBulletin, ProviderStatus, RainfallTotals, SafetyRequest};
use crate::providers::air_quality::AirQualityData;
use crate::providers::alerts::ActiveAlert;
use crate::providers::snowpack::SnowpackData;
use crate::providers::solar::SolarTimes;
use crate::providers::weather::WeatherData;
use crate::providers::{
    AirQualityClient, AlertsClient, AvalancheClient, Fetched, RainfallClient, SnowpackClient,
    SolarClient, WeatherClient,
};

/// Default shared deadline for one request's provider fan-out.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(9);

/// The complete fetched set for one request: exactly one envelope per
/// category.
#[derive(Debug, Clone)]
pub struct ProviderSet {
    pub weather: Fetched<WeatherData>,
    pub solar: Fetched<SolarTimes>,
    pub avalanche: Fetched<AvalancheBulletin>,
    pub snowpack: Fetched<SnowpackData>,
    pub rainfall: Fetched<RainfallTotals>,
    pub alerts: Fetched<Vec<ActiveAlert>>,
    pub air_quality: Fetched<AirQualityData>,
}

impl ProviderSet {
    /// Per-category statuses in canonical order.
    pub fn statuses(&self) -> [(&'static str, ProviderStatus); 7] {
        [
            ("weather", self.weather.status),
            ("solar", self.solar.status),
            ("avalanche", self.avalanche.status),
            ("snowpack", self.snowpack.status),
            ("rainfall", self.rainfall.status),
            ("alerts", self.alerts.status),
            ("air quality", self.air_quality.status),
        ]
    }

    /// Names of every category that resolved below fresh.
    pub fn degraded_categories(&self) -> Vec<&'static str> {
        self.statuses()
            .into_iter()
            .filter(|(_, status)| status.is_degraded())
            .map(|(name, _)| name)
            .collect()
    }
}

/// All provider clients plus the shared cache: the fetch side of one server
/// process.
#[derive(Clone)]
pub struct Providers {
    weather: WeatherClient,
    solar: SolarClient,
    avalanche: AvalancheClient,
    snowpack: SnowpackClient,
    rainfall: RainfallClient,
    alerts: AlertsClient,
    air_quality: AirQualityClient,
    cache: SafetyCache,
    deadline: Duration,
}

impl Providers {
    /// Production clients against their real endpoints.
    pub fn new(cache: SafetyCache, deadline: Duration) -> Self {
        Self {
            weather: WeatherClient::new(),
            solar: SolarClient::new(),
            avalanche: AvalancheClient::new(),
            snowpack: SnowpackClient::new(),
            rainfall: RainfallClient::new(),
            alerts: AlertsClient::new(),
            air_quality: AirQualityClient::new(),
            cache,
            deadline,
        }
    }

    /// Every client pointed at one base URL (for testing).
    pub fn with_base_url(base: &str, cache: SafetyCache, deadline: Duration) -> Self {
        Self {
            weather: WeatherClient::with_base_urls(base, base),
            solar: SolarClient::with_base_url(base),
            avalanche: AvalancheClient::with_base_urls(base, base),
            snowpack: SnowpackClient::with_base_url(base),
            rainfall: RainfallClient::with_base_urls(base, base),
            alerts: AlertsClient::with_base_url(base),
            air_quality: AirQualityClient::with_base_url(base),
            cache,
            deadline,
        }
    }

    /// Fan out every fetcher concurrently and collect the complete set.
    ///
    /// Never fails. Each branch is bounded by the shared deadline; a branch
    /// that exceeds it yields its deadline fallback instead.
    pub async fn fetch_all(&self, request: &SafetyRequest) -> ProviderSet {
        let deadline = self.deadline;

        let (weather, solar, avalanche, snowpack, rainfall, alerts, air_quality) = tokio::join!(
            tokio::time::timeout(deadline, self.weather.fetch(request)),
            tokio::time::timeout(deadline, self.solar.fetch(request)),
            tokio::time::timeout(deadline, self.avalanche.fetch(request, &self.cache)),
            tokio::time::timeout(deadline, self.snowpack.fetch(request, &self.cache)),
            tokio::time::timeout(deadline, self.rainfall.fetch(request, &self.cache)),
            tokio::time::timeout(deadline, self.alerts.fetch(request)),
            tokio::time::timeout(deadline, self.air_quality.fetch(request)),
        );

        let set = ProviderSet {
            weather: weather.unwrap_or_else(|_| {
                debug!("weather fetcher exceeded request deadline");
                Fetched::zeroed("weather: request deadline exceeded")
            }),
            solar: solar.unwrap_or_else(|_| {
                debug!("solar fetcher exceeded request deadline");
                self.solar.compute_only(request)
            }),
            avalanche: avalanche.unwrap_or_else(|_| {
                debug!("avalanche fetcher exceeded request deadline");
                self.avalanche.resolve_only(request)
            }),
            snowpack: snowpack.unwrap_or_else(|_| {
                debug!("snowpack fetcher exceeded request deadline");
                Fetched::zeroed("snowpack: request deadline exceeded")
            }),
            rainfall: rainfall.unwrap_or_else(|_| {
                debug!("rainfall fetcher exceeded request deadline");
                self.rainfall.fetch_from_cache_only(request, &self.cache)
            }),
            alerts: alerts.unwrap_or_else(|_| {
                debug!("alerts fetcher exceeded request deadline");
                Fetched::zeroed("alerts: request deadline exceeded")
            }),
            air_quality: air_quality.unwrap_or_else(|_| {
                debug!("air quality fetcher exceeded request deadline");
                Fetched::zeroed("air quality: request deadline exceeded")
            }),
        };

        let degraded = set.degraded_categories();
        if !degraded.is_empty() {
            warn!(
                degraded = ?degraded,
                lat = request.latitude,
                lon = request.longitude,
                "provider fan-out completed with degraded categories"
            );
        }

        set
    }
}
