use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Unit system requested from the provider. Temperatures come back in °C or
/// °F and wind speed in m/s or mph accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(format!(
                "Unknown unit system '{value}'. Supported: metric, imperial."
            )),
        }
    }
}

// Internal view models

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentConditions {
    /// Location name as reported by the provider.
    pub name: String,
    /// Name the user searched for, shown instead of `name` when present.
    pub display_name: Option<String>,
    pub country: String,
    pub temp: i32,
    pub feels_like: i32,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub pressure: f64,
    /// Meters.
    pub visibility: u32,
    pub description: String,
    pub icon: String,
    pub timestamp: i64,
    pub sunrise: i64,
    pub sunset: i64,
    pub uv_index: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastPoint {
    pub dt: i64,
    pub temp: i32,
    /// Only set on daily roll-ups.
    pub min_temp: Option<i32>,
    /// Only set on daily roll-ups.
    pub max_temp: Option<i32>,
    pub description: String,
    pub icon: String,
    pub rain_prob: u8,
    pub humidity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherPayload {
    pub current: CurrentConditions,
    pub hourly: Vec<ForecastPoint>,
    pub daily: Vec<ForecastPoint>,
}

// OpenWeather wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    pub name: String,
    pub dt: i64,
    pub main: CurrentMain,
    pub weather: Vec<WeatherDescription>,
    pub wind: Wind,
    pub visibility: Option<f64>,
    pub sys: CurrentSys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMain {
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSys {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: i64,
    #[serde(default)]
    pub sunset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hResponse {
    #[serde(default)]
    pub cnt: i32,
    pub list: Vec<Forecast3hItem>,
    pub city: Option<Forecast3hCity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hItem {
    pub dt: i64,
    pub main: Forecast3hMain,
    pub weather: Vec<WeatherDescription>,
    pub wind: Option<Wind>,
    pub pop: Option<f64>,
    pub rain: Option<HashMap<String, f64>>,
    pub dt_txt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hMain {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherDescription {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hCity {
    pub name: String,
    pub country: Option<String>,
    pub timezone: Option<i32>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeocodeResponse {
    pub name: String,
    pub local_names: Option<HashMap<String, String>>,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    pub state: Option<String>,
}
