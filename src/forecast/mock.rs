use super::openweather::{is_valid_coordinates, UpstreamError};
use super::types::*;
use super::WeatherSource;
use async_trait::async_trait;
use chrono::Utc;

const THREE_HOURS: i64 = 3 * 3600;

/// Synthetic provider used when no OpenWeather key is configured. Output is
/// seeded from the coordinates, so the same place always looks the same
/// within a 3-hour slot.
pub struct DemoWeatherSource;

impl DemoWeatherSource {
    pub fn new() -> Self {
        Self
    }

    fn rng(lat: f64, lon: f64, slot: i64) -> fastrand::Rng {
        let seed = ((lat * 100.0).round() as i64 as u64)
            .wrapping_mul(31)
            .wrapping_add((lon * 100.0).round() as i64 as u64)
            .wrapping_mul(31)
            .wrapping_add(slot as u64);
        fastrand::Rng::with_seed(seed)
    }

    /// Warmer near the equator, cooler towards the poles.
    fn base_temp_c(lat: f64) -> f64 {
        30.0 - lat.abs() * 0.4
    }

    fn convert(temp_c: f64, units: Units) -> f64 {
        match units {
            Units::Metric => temp_c,
            Units::Imperial => crate::utils::celsius_to_fahrenheit(temp_c),
        }
    }

    fn convert_wind(speed_ms: f64, units: Units) -> f64 {
        match units {
            Units::Metric => speed_ms,
            Units::Imperial => crate::utils::ms_to_mph(speed_ms),
        }
    }

    fn condition(pop: f64, is_day: bool) -> WeatherDescription {
        let suffix = if is_day { "d" } else { "n" };
        let (id, main, description, icon) = if pop > 0.6 {
            (501, "Rain", "moderate rain", "10")
        } else if pop > 0.3 {
            (500, "Rain", "light rain", "09")
        } else if pop > 0.15 {
            (803, "Clouds", "broken clouds", "04")
        } else {
            (800, "Clear", "clear sky", "01")
        };

        WeatherDescription {
            id,
            main: main.to_string(),
            description: description.to_string(),
            icon: format!("{icon}{suffix}"),
        }
    }
}

impl Default for DemoWeatherSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherSource for DemoWeatherSource {
    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeatherResponse, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }

        let now = Utc::now().timestamp();
        let slot = now / THREE_HOURS;
        let mut rng = Self::rng(lat, lon, slot);

        let temp_c = Self::base_temp_c(lat) + 4.0 * (rng.f64() - 0.5);
        let pop = rng.f64() * 0.5;
        let day_start = now - now.rem_euclid(24 * 3600);

        Ok(CurrentWeatherResponse {
            name: format!("Demo location ({lat:.2}, {lon:.2})"),
            dt: now,
            main: CurrentMain {
                temp: Self::convert(temp_c, units),
                feels_like: Self::convert(temp_c + 1.5, units),
                pressure: 1005.0 + 15.0 * rng.f64(),
                humidity: 50.0 + 40.0 * rng.f64(),
            },
            weather: vec![Self::condition(pop, true)],
            wind: Wind {
                speed: Self::convert_wind(1.0 + 6.0 * rng.f64(), units),
                deg: 360.0 * rng.f64(),
                gust: None,
            },
            visibility: Some(10000.0),
            sys: CurrentSys {
                country: Some("XX".to_string()),
                sunrise: day_start + 6 * 3600,
                sunset: day_start + 18 * 3600,
            },
        })
    }

    async fn forecast3h(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<Forecast3hResponse, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }

        let first_slot = Utc::now().timestamp() / THREE_HOURS + 1;

        // 5 days of 3-hour forecast data (40 items)
        let list = (0..40)
            .map(|i| {
                let slot = first_slot + i;
                let dt = slot * THREE_HOURS;
                let mut rng = Self::rng(lat, lon, slot);

                let hour_of_day = (dt.rem_euclid(24 * 3600) / 3600) as f64;
                let diurnal = 4.0 * ((hour_of_day - 9.0) / 24.0 * std::f64::consts::TAU).sin();
                let temp_c = Self::base_temp_c(lat) + diurnal + 2.0 * (rng.f64() - 0.5);
                let pop = if rng.f64() > 0.7 { 0.3 + 0.6 * rng.f64() } else { 0.15 * rng.f64() };
                let is_day = (6.0..18.0).contains(&hour_of_day);

                Forecast3hItem {
                    dt,
                    main: Forecast3hMain {
                        temp: Self::convert(temp_c, units),
                        feels_like: Self::convert(temp_c + 1.0, units),
                        temp_min: Self::convert(temp_c - 1.5, units),
                        temp_max: Self::convert(temp_c + 1.5, units),
                        pressure: 1005.0 + 15.0 * rng.f64(),
                        humidity: 45.0 + 45.0 * rng.f64(),
                    },
                    weather: vec![Self::condition(pop, is_day)],
                    wind: Some(Wind {
                        speed: Self::convert_wind(1.0 + 5.0 * rng.f64(), units),
                        deg: 360.0 * rng.f64(),
                        gust: None,
                    }),
                    pop: Some(pop),
                    rain: None,
                    dt_txt: None,
                }
            })
            .collect::<Vec<_>>();

        Ok(Forecast3hResponse {
            cnt: list.len() as i32,
            list,
            city: None,
        })
    }

    async fn geocode_direct(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Stable pseudo-coordinates derived from the query text.
        let mut rng = fastrand::Rng::with_seed(
            query
                .to_lowercase()
                .bytes()
                .fold(17_u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64)),
        );

        Ok(vec![GeocodeResponse {
            name: query.to_string(),
            local_names: None,
            lat: crate::utils::round_to_decimals(rng.f64() * 120.0 - 60.0, 4),
            lon: crate::utils::round_to_decimals(rng.f64() * 360.0 - 180.0, 4),
            country: "XX".to_string(),
            state: None,
        }])
    }

    async fn geocode_reverse(
        &self,
        lat: f64,
        lon: f64,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, UpstreamError> {
        if !is_valid_coordinates(lat, lon) {
            return Err(UpstreamError::InvalidCoordinates);
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        Ok(vec![GeocodeResponse {
            name: format!("Demo location ({lat:.2}, {lon:.2})"),
            local_names: None,
            lat,
            lon,
            country: "XX".to_string(),
            state: None,
        }])
    }
}
