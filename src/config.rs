use serde::{Deserialize, Serialize};
use std::env;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub or_model: String,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub openweather_current_path: String,
    pub openweather_forecast3h_path: String,
    pub openweather_geocode_direct_path: String,
    pub openweather_geocode_reverse_path: String,
    pub app_timezone: String,
    pub database_url: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            openrouter_api_key: None,
            openrouter_base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            or_model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
            openweather_api_key: None,
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            openweather_current_path: "/data/2.5/weather".to_string(),
            openweather_forecast3h_path: "/data/2.5/forecast".to_string(),
            openweather_geocode_direct_path: "/geo/1.0/direct".to_string(),
            openweather_geocode_reverse_path: "/geo/1.0/reverse".to_string(),
            app_timezone: "UTC".to_string(),
            database_url: "sqlite:./skycast.db?mode=rwc".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Builds the configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset. API keys are optional: without
    /// an OpenWeather key the server runs on the demo source, and without an
    /// OpenRouter key insights always use the rule-based fallback.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let config = Config {
            openrouter_api_key: non_empty_var("OPENROUTER_API_KEY"),
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or(defaults.openrouter_base_url),
            or_model: env::var("OR_MODEL").unwrap_or(defaults.or_model),
            openweather_api_key: non_empty_var("OPENWEATHER_API_KEY"),
            openweather_base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or(defaults.openweather_base_url),
            openweather_current_path: env::var("OPENWEATHER_CURRENT_PATH")
                .unwrap_or(defaults.openweather_current_path),
            openweather_forecast3h_path: env::var("OPENWEATHER_FORECAST3H_PATH")
                .unwrap_or(defaults.openweather_forecast3h_path),
            openweather_geocode_direct_path: env::var("OPENWEATHER_GEOCODE_DIRECT_PATH")
                .unwrap_or(defaults.openweather_geocode_direct_path),
            openweather_geocode_reverse_path: env::var("OPENWEATHER_GEOCODE_REVERSE_PATH")
                .unwrap_or(defaults.openweather_geocode_reverse_path),
            app_timezone: env::var("APP_TIMEZONE").unwrap_or(defaults.app_timezone),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        };

        // Fail at startup rather than on the first forecast request.
        crate::utils::parse_timezone(&config.app_timezone).map_err(|e| anyhow::anyhow!(e))?;

        Ok(config)
    }

    /// `DATABASE_URL=memory` keeps cache, history and preferences in
    /// process memory instead of SQLite.
    pub fn uses_memory_storage(&self) -> bool {
        self.database_url.trim().eq_ignore_ascii_case("memory")
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        crate::utils::parse_timezone(&self.app_timezone).unwrap_or(chrono_tz::UTC)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
