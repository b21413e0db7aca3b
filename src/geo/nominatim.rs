use crate::domain::model::Coordinates;
use crate::domain::ports::Geocoder;
use crate::utils::error::{EstimatorError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "price_estimator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Nominatim usage policy: at most one request per second.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub min_interval: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct ReverseResult {
    display_name: Option<String>,
    error: Option<String>,
}

pub struct NominatimGeocoder {
    endpoint: String,
    client: Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        validate_url("geocoder.endpoint", &config.endpoint)?;
        validate_non_empty_string("geocoder.user_agent", &config.user_agent)?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            min_interval: config.min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Waits until `min_interval` has elapsed since the previous request.
    /// The lock is held while sleeping so concurrent callers queue up.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        self.throttle().await;

        let url = format!("{}/{}", self.endpoint, path);
        tracing::debug!("Nominatim request: {} {:?}", url, query);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EstimatorError::GeocodingError {
                message: format!("Nominatim returned HTTP {}", status),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let response = self
            .get(
                "search",
                &[
                    ("q", address.to_string()),
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let results: Vec<SearchResult> = response.json().await?;
        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };

        let parse = |value: &str, name: &str| {
            value
                .parse::<f64>()
                .map_err(|_| EstimatorError::GeocodingError {
                    message: format!("Malformed {} in Nominatim response: {}", name, value),
                })
        };
        let latitude = parse(&first.lat, "latitude")?;
        let longitude = parse(&first.lon, "longitude")?;

        Coordinates::new(latitude, longitude).map(Some)
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<Option<String>> {
        let response = self
            .get(
                "reverse",
                &[
                    ("lat", coordinates.latitude.to_string()),
                    ("lon", coordinates.longitude.to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let result: ReverseResult = response.json().await?;
        if let Some(error) = result.error {
            tracing::debug!("Nominatim reverse lookup found nothing: {}", error);
            return Ok(None);
        }
        Ok(result.display_name)
    }
}

/// Address to coordinates. Any failure is logged and mapped to `None`.
pub async fn address_to_coordinates<G: Geocoder + ?Sized>(
    geocoder: &G,
    address: &str,
) -> Option<Coordinates> {
    if address.trim().is_empty() {
        return None;
    }

    match geocoder.geocode(address).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Error geocoding {}: {}", address, e);
            None
        }
    }
}

/// Coordinates to address. Out-of-range input and any failure map to `None`.
pub async fn coordinates_to_address<G: Geocoder + ?Sized>(
    geocoder: &G,
    latitude: f64,
    longitude: f64,
) -> Option<String> {
    let coordinates = match Coordinates::new(latitude, longitude) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Error reverse geocoding ({}, {}): {}", latitude, longitude, e);
            return None;
        }
    };

    match geocoder.reverse(coordinates).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Error reverse geocoding ({}, {}): {}", latitude, longitude, e);
            None
        }
    }
}
