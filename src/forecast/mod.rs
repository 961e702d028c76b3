pub mod aggregate;
pub mod mock;
pub mod openweather;
pub mod types;

use async_trait::async_trait;
use moka::future::Cache;
use openweather::UpstreamError;
use std::time::Duration;
use types::*;

/// Upstream weather data provider. Implemented by the OpenWeather client and
/// by the demo source used when no API key is configured.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeatherResponse, UpstreamError>;

    async fn forecast3h(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<Forecast3hResponse, UpstreamError>;

    async fn geocode_direct(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError>;

    async fn geocode_reverse(
        &self,
        lat: f64,
        lon: f64,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError>;
}

/// Fetches current conditions and the 3-hour forecast list concurrently.
/// Both calls must succeed; the first failure fails the whole fetch.
pub async fn fetch_current_and_forecast(
    source: &dyn WeatherSource,
    lat: f64,
    lon: f64,
    units: Units,
) -> Result<(CurrentConditions, Vec<Forecast3hItem>), UpstreamError> {
    if !openweather::is_valid_coordinates(lat, lon) {
        return Err(UpstreamError::InvalidCoordinates);
    }

    let (current, forecast) = tokio::try_join!(
        source.current(lat, lon, units),
        source.forecast3h(lat, lon, units),
    )?;

    Ok((CurrentConditions::from(&current), forecast.list))
}

pub type GeocodeCache = Cache<String, Vec<GeocodeResponse>>;

pub fn init_geocode_cache() -> GeocodeCache {
    Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(24 * 60 * 60)) // 24 hours
        .build()
}

pub fn geocode_cache_key(query: &str, limit: u32) -> String {
    format!("direct_{}_{}", query.trim().to_lowercase(), limit)
}

pub fn reverse_geocode_cache_key(lat: f64, lon: f64, limit: u32) -> String {
    format!("reverse_{:.4}_{:.4}_{}", lat, lon, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use openweather::OpenWeatherClient;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenWeatherClient {
        OpenWeatherClient::new(Config {
            openweather_api_key: Some("test_key".to_string()),
            openweather_base_url: base_url.to_string(),
            ..Config::default()
        })
        .unwrap()
    }

    fn current_body() -> serde_json::Value {
        serde_json::json!({
            "name": "London",
            "dt": 1704067200,
            "main": {"temp": 8.4, "feels_like": 6.1, "pressure": 1021, "humidity": 81},
            "weather": [{"id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04d"}],
            "wind": {"speed": 4.6, "deg": 220},
            "visibility": 10000,
            "sys": {"country": "GB", "sunrise": 1704096000, "sunset": 1704124800}
        })
    }

    fn forecast_body() -> serde_json::Value {
        let list: Vec<_> = (0..4)
            .map(|i| {
                serde_json::json!({
                    "dt": 1704067200 + i * 10800,
                    "main": {"temp": 8.0, "feels_like": 6.0, "temp_min": 7.0,
                             "temp_max": 9.0, "pressure": 1021, "humidity": 80},
                    "weather": [{"id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04d"}],
                    "pop": 0.1
                })
            })
            .collect();
        serde_json::json!({"cnt": 4, "list": list})
    }

    #[tokio::test]
    async fn test_fetch_returns_current_and_raw_list() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let (current, list) = fetch_current_and_forecast(&client, 51.5074, -0.1278, Units::Metric)
            .await
            .unwrap();

        assert_eq!(current.name, "London");
        assert_eq!(current.temp, 8);
        assert_eq!(list.len(), 4);
    }

    #[tokio::test]
    async fn test_forecast_failure_fails_whole_fetch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let err = fetch_current_and_forecast(&client, 51.5074, -0.1278, Units::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Status { endpoint: "forecast", .. }));
    }

    #[tokio::test]
    async fn test_current_failure_fails_whole_fetch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(404).set_body_string("city not found"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let err = fetch_current_and_forecast(&client, 51.5074, -0.1278, Units::Metric)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("city not found"));
    }

    #[test]
    fn test_geocode_cache_keys_normalise_query() {
        assert_eq!(geocode_cache_key("  London ", 5), geocode_cache_key("london", 5));
        assert_ne!(geocode_cache_key("london", 5), geocode_cache_key("london", 1));
        assert_eq!(reverse_geocode_cache_key(51.50736, -0.12776, 1), "reverse_51.5074_-0.1278_1");
    }
}
