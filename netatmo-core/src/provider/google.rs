use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{geo::Coordinate, model::Place};

use super::{AUTH_TIMEOUT, truncate_body};

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Address lookup through the Google Maps Geocoding API.
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    api_key: String,
    base_url: String,
    http: Client,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(AUTH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for geocoding")?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Resolve `address` to zero or more places, in the order Google ranks them.
    pub async fn geocode(&self, address: &str, language: &str) -> Result<Vec<Place>> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        debug!(%address, %language, "geocoding address");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("address", address),
                ("language", language),
            ])
            .send()
            .await
            .context("Failed to send request to Google Geocoding API")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read geocoding response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Geocoding request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: GeocodeResponse =
            serde_json::from_str(&body).context("Failed to parse geocoding JSON")?;

        match parsed.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(anyhow!(
                    "Geocoding failed with status {}: {}",
                    other,
                    parsed.error_message.unwrap_or_default()
                ));
            }
        }

        Ok(parsed
            .results
            .into_iter()
            .map(|r| Place {
                formatted_address: r.formatted_address,
                location: Coordinate::new(r.geometry.location.lat, r.geometry.location.lng),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
    status: String,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLatLng,
}

#[derive(Debug, Deserialize)]
struct GeocodeLatLng {
    lat: f64,
    lng: f64,
}
