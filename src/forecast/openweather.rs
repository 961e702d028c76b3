use super::types::*;
use super::WeatherSource;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("{endpoint} request failed with HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Weather provider is not configured: {0}")]
    NotConfigured(String),
    #[error("Invalid coordinates")]
    InvalidCoordinates,
}

pub struct OpenWeatherClient {
    client: Client,
    config: Config,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent("SkyCast/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.config
            .openweather_api_key
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("OPENWEATHER_API_KEY not set".to_string()))
    }

    pub async fn get_current(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeatherResponse, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }

        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_current_path
        );

        self.get_json("current weather", &url, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("units", units.as_str()),
            ("appid", self.api_key()?),
        ])
        .await
    }

    pub async fn get_forecast3h(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<Forecast3hResponse, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }

        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_forecast3h_path
        );

        self.get_json("forecast", &url, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("units", units.as_str()),
            ("appid", self.api_key()?),
        ])
        .await
    }

    pub async fn geocode_direct(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_geocode_direct_path
        );

        self.get_json("geocoding", &url, &[
            ("q", query),
            ("limit", &limit.to_string()),
            ("appid", self.api_key()?),
        ])
        .await
    }

    pub async fn geocode_reverse(
        &self,
        lat: f64,
        lon: f64,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }

        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_geocode_reverse_path
        );

        self.get_json("reverse geocoding", &url, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("limit", &limit.to_string()),
            ("appid", self.api_key()?),
        ])
        .await
    }

    /// Single GET with no retry. Any non-200 status becomes
    /// [`UpstreamError::Status`] carrying a short excerpt of the body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();

        if status != reqwest::StatusCode::OK {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("OpenWeather {} request returned {}", endpoint, status);
            return Err(UpstreamError::Status {
                endpoint,
                status,
                body: truncate_body(&error_text),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeatherResponse, UpstreamError> {
        self.get_current(lat, lon, units).await
    }

    async fn forecast3h(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<Forecast3hResponse, UpstreamError> {
        self.get_forecast3h(lat, lon, units).await
    }

    async fn geocode_direct(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        OpenWeatherClient::geocode_direct(self, query, limit).await
    }

    async fn geocode_reverse(
        &self,
        lat: f64,
        lon: f64,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        OpenWeatherClient::geocode_reverse(self, lat, lon, limit).await
    }
}

pub fn is_valid_coordinates(lat: f64, lon: f64) -> bool {
    crate::utils::validate_coordinates(lat, lon).is_ok()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Rounds a provider float to the integer shown on the dashboard.
pub(crate) fn round_temp(value: f64) -> i32 {
    value.round() as i32
}

/// Converts a provider percentage reading into 0..=100.
pub(crate) fn to_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

// Convert OpenWeather data to internal format
impl From<&CurrentWeatherResponse> for CurrentConditions {
    fn from(raw: &CurrentWeatherResponse) -> Self {
        let (description, icon) = raw
            .weather
            .first()
            .map(|w| (w.description.clone(), w.icon.clone()))
            .unwrap_or_default();

        Self {
            name: raw.name.clone(),
            display_name: None,
            country: raw.sys.country.clone().unwrap_or_default(),
            temp: round_temp(raw.main.temp),
            feels_like: round_temp(raw.main.feels_like),
            humidity: to_percent(raw.main.humidity),
            wind_speed: raw.wind.speed,
            wind_deg: raw.wind.deg,
            pressure: raw.main.pressure,
            visibility: raw.visibility.unwrap_or(0.0).max(0.0) as u32,
            description,
            icon,
            timestamp: raw.dt,
            sunrise: raw.sys.sunrise,
            sunset: raw.sys.sunset,
            uv_index: None,
        }
    }
}

impl From<&Forecast3hItem> for ForecastPoint {
    fn from(item: &Forecast3hItem) -> Self {
        let (description, icon) = item
            .weather
            .first()
            .map(|w| (w.description.clone(), w.icon.clone()))
            .unwrap_or_default();

        Self {
            dt: item.dt,
            temp: round_temp(item.main.temp),
            min_temp: None,
            max_temp: None,
            description,
            icon,
            rain_prob: to_percent(item.pop.unwrap_or(0.0) * 100.0),
            humidity: to_percent(item.main.humidity),
        }
    }
}
