//! Weather cache, recent-search history and user preferences, persisted as
//! three JSON records in a [`KeyValueStorage`].
//!
//! Unreadable or malformed records are treated as absent and never surface
//! as errors; failed writes are logged and dropped.

use crate::forecast::types::{Units, WeatherPayload};
use crate::storage::KeyValueStorage;
use crate::utils::round_to_decimals;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;

pub const CACHE_KEY: &str = "skycast_weather_cache";
pub const HISTORY_KEY: &str = "skycast_location_history";
pub const SETTINGS_KEY: &str = "skycast_user_settings";

pub const FRESHNESS_WINDOW_SECS: i64 = 300;
pub const HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub data: WeatherPayload,
    pub lat: f64,
    pub lon: f64,
    pub unit: Units,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::seconds(FRESHNESS_WINDOW_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryItem {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    pub state: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Preferences {
    pub unit: Units,
    pub theme: Theme,
}

/// Cache key shared by requests within roughly a kilometre of each other.
/// Halves round away from zero (`0.125` becomes `0.13`).
pub fn cache_key(lat: f64, lon: f64, unit: Units) -> String {
    format!(
        "{:.2}_{:.2}_{}",
        round_to_decimals(lat, 2),
        round_to_decimals(lon, 2),
        unit
    )
}

pub struct WeatherStore {
    storage: Arc<dyn KeyValueStorage>,
    // Serialises read-modify-write of the persisted blobs.
    write_lock: Mutex<()>,
}

impl WeatherStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    // Weather cache

    pub async fn get_cached(&self, lat: f64, lon: f64, unit: Units) -> Option<CacheEntry> {
        self.get_cached_at(lat, lon, unit, Utc::now()).await
    }

    pub async fn get_cached_at(
        &self,
        lat: f64,
        lon: f64,
        unit: Units,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        let key = cache_key(lat, lon, unit);
        let mut cache: HashMap<String, serde_json::Value> = self.read_json(CACHE_KEY).await?;
        let raw = cache.remove(&key)?;

        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discarding malformed cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.is_fresh(now) {
            tracing::debug!("Weather cache hit for {}", key);
            Some(entry)
        } else {
            None
        }
    }

    pub async fn set_cached(&self, lat: f64, lon: f64, unit: Units, data: WeatherPayload) {
        self.set_cached_at(lat, lon, unit, data, Utc::now()).await
    }

    /// Overwrites the entry for the key. Entries already past the freshness
    /// window are dropped from the blob in the same write.
    pub async fn set_cached_at(
        &self,
        lat: f64,
        lon: f64,
        unit: Units,
        data: WeatherPayload,
        now: DateTime<Utc>,
    ) {
        let _guard = self.write_lock.lock().await;

        let mut cache: HashMap<String, serde_json::Value> =
            self.read_json(CACHE_KEY).await.unwrap_or_default();

        cache.retain(|_, raw| {
            serde_json::from_value::<CacheEntry>(raw.clone())
                .map(|entry| entry.is_fresh(now))
                .unwrap_or(false)
        });

        let entry = CacheEntry {
            timestamp: now,
            data,
            lat,
            lon,
            unit,
        };

        match serde_json::to_value(&entry) {
            Ok(value) => {
                cache.insert(cache_key(lat, lon, unit), value);
                self.write_json(CACHE_KEY, &cache).await;
            }
            Err(e) => tracing::warn!("Failed to serialize cache entry: {}", e),
        }
    }

    // Location history

    pub async fn history(&self) -> Vec<HistoryItem> {
        self.read_json(HISTORY_KEY).await.unwrap_or_default()
    }

    pub async fn record_history(
        &self,
        name: &str,
        lat: f64,
        lon: f64,
        country: Option<&str>,
        state: Option<&str>,
    ) -> Vec<HistoryItem> {
        self.record_history_at(name, lat, lon, country, state, Utc::now())
            .await
    }

    /// Moves `name` to the front of the history, keeping at most
    /// [`HISTORY_LIMIT`] entries.
    pub async fn record_history_at(
        &self,
        name: &str,
        lat: f64,
        lon: f64,
        country: Option<&str>,
        state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<HistoryItem> {
        let _guard = self.write_lock.lock().await;

        let mut history = self.history().await;
        history.retain(|h| h.name != name);
        history.insert(
            0,
            HistoryItem {
                name: name.to_string(),
                lat,
                lon,
                country: country.unwrap_or("IN").to_string(),
                state: state.map(str::to_string),
                timestamp: now,
            },
        );
        history.truncate(HISTORY_LIMIT);

        self.write_json(HISTORY_KEY, &history).await;
        tracing::info!("Search history entry recorded: {} ({},{})", name, lat, lon);

        history
    }

    pub async fn clear_history(&self) {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.storage.remove(HISTORY_KEY).await {
            tracing::warn!("Failed to clear search history: {}", e);
        } else {
            tracing::info!("Search history cleared");
        }
    }

    // Preferences

    pub async fn get_preferences(&self) -> Preferences {
        self.read_json(SETTINGS_KEY).await.unwrap_or_default()
    }

    pub async fn set_preferences(&self, prefs: Preferences) {
        let _guard = self.write_lock.lock().await;

        self.write_json(SETTINGS_KEY, &prefs).await;
        tracing::info!("Preferences updated: unit={} theme={:?}", prefs.unit, prefs.theme);
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Persisted {} is corrupt, using defaults: {}", key, e);
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.storage.set(key, &raw).await {
            tracing::warn!("Failed to persist {}: {}", key, e);
        }
    }
}
