use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PlacesConfig;

/// Results beyond this many are dropped, in provider order.
pub const MAX_PLACES: usize = 3;

/// A point to search around
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// One nearby-search result
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub name: Option<String>,
    /// Short address
    #[serde(default, rename = "vicinity")]
    pub address: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    #[cfg(test)]
    pub fn new(name: Option<&str>, address: Option<&str>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.map(str::to_string),
            geometry: Geometry {
                location: LatLng { lat, lng },
            },
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.geometry.location.lat,
            lng: self.geometry.location.lng,
        }
    }

    pub fn map_url(&self) -> String {
        format!("https://www.google.com/maps?q={}", self.coordinates())
    }
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Place>,
}

impl NearbySearchResponse {
    fn into_places(self) -> Result<Vec<Place>> {
        match self.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => {}
            Some(status) => anyhow::bail!(
                "Places API returned {}: {}",
                status,
                self.error_message.unwrap_or_default()
            ),
        }
        let mut places = self.results;
        places.truncate(MAX_PLACES);
        Ok(places)
    }
}

/// Nearby place lookup
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// At most [`MAX_PLACES`] results, in provider order.
    async fn search(&self, keyword: &str, origin: Coordinates) -> Result<Vec<Place>>;
}

/// Google Places "nearby search" client
pub struct GooglePlacesClient {
    client: reqwest::Client,
    config: PlacesConfig,
}

impl GooglePlacesClient {
    pub fn new(config: PlacesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PlaceSearch for GooglePlacesClient {
    async fn search(&self, keyword: &str, origin: Coordinates) -> Result<Vec<Place>> {
        let location = origin.to_string();
        let radius = self.config.radius.to_string();

        debug!(
            "Nearby search: keyword={} location={} radius={}",
            keyword, location, radius
        );

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("keyword", keyword),
                ("language", self.config.language.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to Places API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Places API error ({}): {}", status, error_body);
        }

        let body: NearbySearchResponse = response
            .json()
            .await
            .context("Failed to parse Places API response")?;

        let places = body.into_places()?;
        info!("Places API returned {} result(s) for {}", places.len(), keyword);
        Ok(places)
    }
}
