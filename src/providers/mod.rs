//! Provider fetchers for every upstream data category.
//!
//! Each submodule wraps one external source plus its fallback chain and
//! returns a uniform [`Fetched`] envelope. The shared contract:
//!
//! - A fetcher never propagates an error past its boundary. Every failure
//!   mode (timeout, non-2xx status, malformed body) resolves to a
//!   [`ProviderStatus`], with the terminal tier producing `Zeroed` and
//!   explicitly null values.
//! - Response status is checked before any body parse. A non-success status
//!   routes straight into the owning fetcher's fallback chain.
//! - Numeric fields parse to `Option<f64>`; absent or non-numeric upstream
//!   values are `None`, never a sentinel number.
//!
//! # Sources
//!
//! - [`weather`]: primary hourly forecast with secondary gap-fill fallback
//! - [`solar`]: sun timing, with a local solar-geometry fallback
//! - [`avalanche`]: zone resolution + bulletin feed + HTML scrape fallback
//! - [`snowpack`]: nearest-station snow depth and water equivalent
//! - [`rainfall`]: four-tier trailing accumulation chain
//! - [`alerts`]: active weather alerts with onset/expiry windows
//! - [`air_quality`]: current AQI

pub mod air_quality;
pub mod alerts;
pub mod avalanche;
pub mod rainfall;
pub mod snowpack;
pub mod solar;
pub mod weather;

pub use air_quality::AirQualityClient;
pub use alerts::AlertsClient;
pub use avalanche::AvalancheClient;
pub use rainfall::RainfallClient;
pub use snowpack::SnowpackClient;
pub use solar::SolarClient;
pub use weather::WeatherClient;

use crate::model::ProviderStatus;

/// Uniform result envelope produced by every fetcher.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    /// Outcome of the fallback chain.
    pub status: ProviderStatus,

    /// The normalized payload. `None` only for the zeroed terminal tier.
    pub payload: Option<T>,

    /// Age of the data in seconds (0 for live fetches).
    pub age_seconds: i64,

    /// Human-readable caveat attached by a fallback tier.
    pub warning: Option<String>,
}

impl<T> Fetched<T> {
    /// Fresh data from the primary tier.
    pub fn ok(payload: T) -> Self {
        Self {
            status: ProviderStatus::Ok,
            payload: Some(payload),
            age_seconds: 0,
            warning: None,
        }
    }

    /// Data recovered through a fallback tier.
    pub fn degraded(payload: T, warning: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Degraded,
            payload: Some(payload),
            age_seconds: 0,
            warning: Some(warning.into()),
        }
    }

    /// Data served from a cache entry past its TTL.
    pub fn stale(payload: T, age_seconds: i64, warning: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Stale,
            payload: Some(payload),
            age_seconds,
            warning: Some(warning.into()),
        }
    }

    /// Terminal fallback: no data at all.
    pub fn zeroed(warning: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Zeroed,
            payload: None,
            age_seconds: 0,
            warning: Some(warning.into()),
        }
    }

    /// Whether this envelope carries anything less than fresh data.
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }
}
