use crate::ai::{generate_insight, Insight, TextGenerator};
use crate::forecast::aggregate::aggregate;
use crate::forecast::openweather::UpstreamError;
use crate::forecast::types::{Units, WeatherPayload};
use crate::forecast::{fetch_current_and_forecast, WeatherSource};
use crate::store::WeatherStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoadedWeather {
    pub lat: f64,
    pub lon: f64,
    pub unit: Units,
    #[serde(flatten)]
    pub payload: WeatherPayload,
    /// True when served from the local cache instead of the provider.
    pub cached: bool,
    #[schema(value_type = String, format = DateTime)]
    pub fetched_at: DateTime<Utc>,
}

/// Ties the weather source, aggregator, store and insight generator
/// together into the operations the dashboard calls.
pub struct DashboardService {
    source: Arc<dyn WeatherSource>,
    text_generator: Arc<dyn TextGenerator>,
    store: Arc<WeatherStore>,
    timezone: chrono_tz::Tz,
}

impl DashboardService {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        text_generator: Arc<dyn TextGenerator>,
        store: Arc<WeatherStore>,
        timezone: chrono_tz::Tz,
    ) -> Self {
        Self {
            source,
            text_generator,
            store,
            timezone,
        }
    }

    pub fn source(&self) -> &dyn WeatherSource {
        self.source.as_ref()
    }

    pub fn store(&self) -> &WeatherStore {
        &self.store
    }

    /// Stored preference when the caller did not pick a unit system.
    pub async fn resolve_units(&self, requested: Option<Units>) -> Units {
        match requested {
            Some(units) => units,
            None => self.store.get_preferences().await.unit,
        }
    }

    pub async fn load_weather(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        display_name: Option<&str>,
    ) -> Result<LoadedWeather, UpstreamError> {
        if let Some(entry) = self.store.get_cached(lat, lon, units).await {
            let mut payload = entry.data;
            payload.current.display_name = display_name.map(str::to_string);

            return Ok(LoadedWeather {
                lat,
                lon,
                unit: units,
                payload,
                cached: true,
                fetched_at: entry.timestamp,
            });
        }

        tracing::info!("Fetching weather for {},{} ({})", lat, lon, units);

        let (current, raw) =
            fetch_current_and_forecast(self.source.as_ref(), lat, lon, units).await?;

        let (hourly, daily) = aggregate(&raw, &self.timezone);
        let mut payload = WeatherPayload {
            current,
            hourly,
            daily,
        };

        // Labels are per request and never stored.
        self.store
            .set_cached(lat, lon, units, payload.clone())
            .await;
        payload.current.display_name = display_name.map(str::to_string);

        Ok(LoadedWeather {
            lat,
            lon,
            unit: units,
            payload,
            cached: false,
            fetched_at: Utc::now(),
        })
    }

    pub async fn load_insight(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<Insight, UpstreamError> {
        let weather = self.load_weather(lat, lon, units, None).await?;
        Ok(generate_insight(
            self.text_generator.as_ref(),
            &weather.payload.current,
            &weather.payload.daily,
        )
        .await)
    }
}
