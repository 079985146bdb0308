//! Snowpack telemetry client (nearest-station snow depth and SWE).
//!
//! The station list changes rarely, so it is cached for 12 hours and reused
//! across requests. The chain: resolve the nearest station (cache, then API
//! with write-back), fetch its latest measurement, and degrade to a zeroed
//! envelope when neither works. Snow depth of `None` is "unknown", never
//! "bare ground".

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{SafetyCache, STATION_LIST_TTL_SECS};
use crate::model::SafetyRequest;
use crate::providers::Fetched;

/// Base URL for the snowpack telemetry API.
const SNOWPACK_API_BASE: &str = "https://api.snowtel.example.gov/v1";

const CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// Normalized snowpack reading from the nearest station.
#[derive(Debug, Clone)]
pub struct SnowpackData {
    pub station_id: String,
    pub station_name: String,
    pub distance_mi: f64,
    pub snow_depth_in: Option<f64>,
    pub swe_in: Option<f64>,
}

impl SnowpackData {
    /// Whether measured snow is on the ground. `None` means unknown.
    pub fn has_snow(&self) -> Option<bool> {
        self.snow_depth_in.map(|d| d > 0.0)
    }
}

/// Client for the snowpack chain.
#[derive(Clone)]
pub struct SnowpackClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for SnowpackClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SnowpackClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SNOWPACK_API_BASE.to_string(),
        }
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Run the fallback chain. Never returns an error.
    pub async fn fetch(&self, request: &SafetyRequest, cache: &SafetyCache) -> Fetched<SnowpackData> {
        let station = match self.resolve_station(request, cache).await {
            Ok(station) => station,
            Err(e) => {
                debug!(error = %e, "snowpack station resolution failed");
                return Fetched::zeroed("snowpack: station list unavailable");
            }
        };

        match tokio::time::timeout(CALL_TIMEOUT, self.fetch_latest(&station.id)).await {
            Ok(Ok(reading)) => {
                let distance_mi = station.distance_mi(request);
                Fetched::ok(SnowpackData {
                    station_id: station.id,
                    station_name: station.name,
                    distance_mi,
                    snow_depth_in: reading.snow_depth_in,
                    swe_in: reading.swe_in,
                })
            }
            Ok(Err(e)) => {
                debug!(error = %e, station = %station.id, "snowpack reading fetch failed");
                Fetched::zeroed("snowpack: station reading unavailable")
            }
            Err(_) => {
                debug!(station = %station.id, "snowpack reading fetch timed out");
                Fetched::zeroed("snowpack: station reading timed out")
            }
        }
    }

    /// Find the station nearest the request point, consulting the cached
    /// station list before the API.
    async fn resolve_station(
        &self,
        request: &SafetyRequest,
        cache: &SafetyCache,
    ) -> anyhow::Result<Station> {
        const STATIONS_KEY: &str = "snowpack:stations";

        let stations: Vec<Station> = match cache.get(STATIONS_KEY) {
            Some((value, _age)) => serde_json::from_value(value)?,
            None => {
                let fetched =
                    tokio::time::timeout(CALL_TIMEOUT, self.fetch_stations()).await??;
                cache.set(
                    STATIONS_KEY,
                    serde_json::to_value(&fetched)?,
                    STATION_LIST_TTL_SECS,
                );
                fetched
            }
        };

        stations
            .into_iter()
            .min_by(|a, b| {
                a.distance_mi(request)
                    .total_cmp(&b.distance_mi(request))
            })
            .ok_or_else(|| anyhow::anyhow!("station list is empty"))
    }

    async fn fetch_stations(&self) -> anyhow::Result<Vec<Station>> {
        let url = format!("{}/stations", self.base_url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("snowpack stations returned status {}", response.status());
        }
        let body = response.json::<StationsResponse>().await?;
        Ok(body.stations)
    }

    async fn fetch_latest(&self, station_id: &str) -> anyhow::Result<StationReading> {
        let url = format!("{}/stations/{}/latest", self.base_url, station_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("snowpack reading returned status {}", response.status());
        }
        Ok(response.json::<StationReading>().await?)
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<Station>,
}

/// A telemetry station. Serialized into the cache as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Station {
    #[serde(default)]
    id: String,

    #[serde(default)]
    name: String,

    #[serde(default)]
    latitude: f64,

    #[serde(default)]
    longitude: f64,
}

impl Station {
    /// Approximate great-circle distance to the request point, miles.
    fn distance_mi(&self, request: &SafetyRequest) -> f64 {
        let dlat = (self.latitude - request.latitude).to_radians();
        let dlon = (self.longitude - request.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + request.latitude.to_radians().cos()
                * self.latitude.to_radians().cos()
                * (dlon / 2.0).sin().powi(2);
        2.0 * 3958.8 * a.sqrt().asin()
    }
}

#[derive(Debug, Deserialize)]
struct StationReading {
    #[serde(default)]
    snow_depth_in: Option<f64>,

    #[serde(default)]
    swe_in: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn request() -> SafetyRequest {
        SafetyRequest {
            latitude: 40.55,
            longitude: -111.7,
            date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_station_distance() {
        let station = Station {
            id: "824".into(),
            name: "Brighton".into(),
            latitude: 40.60,
            longitude: -111.58,
        };
        let d = station.distance_mi(&request());
        assert!(d > 4.0 && d < 10.0, "distance was {d}");
    }

    #[test]
    fn test_has_snow_distinguishes_unknown() {
        let mut data = SnowpackData {
            station_id: "824".into(),
            station_name: "Brighton".into(),
            distance_mi: 6.0,
            snow_depth_in: None,
            swe_in: None,
        };
        assert_eq!(data.has_snow(), None);

        data.snow_depth_in = Some(0.0);
        assert_eq!(data.has_snow(), Some(false));

        data.snow_depth_in = Some(34.0);
        assert_eq!(data.has_snow(), Some(true));
    }

    /// Minimal HTTP stub answering every request with one JSON body.
    async fn stub_server(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_returns_nearest_station_reading() {
        let base = stub_server(r#"{"snow_depth_in": 34.5, "swe_in": 9.1}"#).await;
        let client = SnowpackClient::with_base_url(&base);
        let cache = SafetyCache::with_capacity(8);

        let stations = vec![Station {
            id: "824".into(),
            name: "Brighton".into(),
            latitude: 40.60,
            longitude: -111.58,
        }];
        cache.set(
            "snowpack:stations",
            serde_json::to_value(&stations).unwrap(),
            STATION_LIST_TTL_SECS,
        );

        let fetched = client.fetch(&request(), &cache).await;

        assert_eq!(fetched.status, crate::model::ProviderStatus::Ok);
        let data = fetched.payload.unwrap();
        assert_eq!(data.station_id, "824");
        assert_eq!(data.station_name, "Brighton");
        assert!(data.distance_mi > 4.0 && data.distance_mi < 10.0);
        assert_eq!(data.snow_depth_in, Some(34.5));
        assert_eq!(data.swe_in, Some(9.1));
    }

    #[tokio::test]
    async fn test_fetch_zeroes_when_unreachable() {
        let client = SnowpackClient::with_base_url("http://127.0.0.1:1");
        let cache = SafetyCache::with_capacity(8);

        let fetched = client.fetch(&request(), &cache).await;

        assert_eq!(fetched.status, crate::model::ProviderStatus::Zeroed);
        assert!(fetched.payload.is_none());
        assert!(fetched.warning.is_some());
    }

    #[tokio::test]
    async fn test_cached_station_list_short_circuits_api() {
        let client = SnowpackClient::with_base_url("http://127.0.0.1:1");
        let cache = SafetyCache::with_capacity(8);

        let stations = vec![Station {
            id: "824".into(),
            name: "Brighton".into(),
            latitude: 40.60,
            longitude: -111.58,
        }];
        cache.set(
            "snowpack:stations",
            serde_json::to_value(&stations).unwrap(),
            STATION_LIST_TTL_SECS,
        );

        // Station resolution succeeds from cache even with the API down; the
        // reading fetch then fails and the chain zeroes.
        let station = client.resolve_station(&request(), &cache).await.unwrap();
        assert_eq!(station.id, "824");
    }
}
