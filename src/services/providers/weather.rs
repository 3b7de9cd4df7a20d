//! Weather lookup backed by the Open-Meteo forecast API
//!
//! Only the current 2 m air temperature is requested. It is cached in Redis
//! for a few minutes since every recommendation asks for it.

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    services::providers::WeatherStatus,
};

const TEMPERATURE_CACHE_TTL: u64 = 600; // 10 minutes

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
}

#[derive(Clone)]
pub struct OpenMeteoWeather {
    http_client: HttpClient,
    api_url: String,
    latitude: f64,
    longitude: f64,
    cold_threshold_celsius: f64,
    cache: Option<Cache>,
}

impl OpenMeteoWeather {
    pub fn new(api_url: String, latitude: f64, longitude: f64, cold_threshold_celsius: f64) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            latitude,
            longitude,
            cold_threshold_celsius,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::Temperature(format!("{:.2},{:.2}", self.latitude, self.longitude))
    }

    /// Current temperature in °C, from cache when fresh
    pub async fn current_temperature(&self) -> AppResult<f64> {
        let key = self.cache_key();

        if let Some(cache) = &self.cache {
            match cache.get_from_cache::<f64>(&key).await {
                Ok(Some(temperature)) => {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(temperature);
                }
                Ok(None) => tracing::debug!(key = %key, "Cache miss"),
                Err(e) => tracing::warn!(error = %e, "Cache read failed, fetching live weather"),
            }
        }

        let temperature = self.fetch_temperature().await?;

        if let Some(cache) = &self.cache {
            cache.set_in_background(&key, &temperature, TEMPERATURE_CACHE_TTL);
        }

        Ok(temperature)
    }

    async fn fetch_temperature(&self) -> AppResult<f64> {
        let url = format!("{}/v1/forecast", self.api_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("latitude", self.latitude.to_string()),
                ("longitude", self.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Weather API returned status {}: {}",
                status, body
            )));
        }

        let forecast: ForecastResponse = response.json().await?;
        tracing::info!(temperature = forecast.current.temperature_2m, "Fetched current temperature");

        Ok(forecast.current.temperature_2m)
    }
}

#[async_trait::async_trait]
impl WeatherStatus for OpenMeteoWeather {
    async fn is_cold_now(&self) -> AppResult<bool> {
        let temperature = self.current_temperature().await?;
        Ok(temperature < self.cold_threshold_celsius)
    }
}

/// Weather that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWeather {
    pub cold: bool,
}

impl FixedWeather {
    pub fn cold() -> Self {
        Self { cold: true }
    }

    pub fn mild() -> Self {
        Self { cold: false }
    }
}

#[async_trait::async_trait]
impl WeatherStatus for FixedWeather {
    async fn is_cold_now(&self) -> AppResult<bool> {
        Ok(self.cold)
    }
}
