use super::openweather::round_temp;
use super::types::*;
use chrono::{DateTime, NaiveDate, TimeZone};

/// Number of 3-hour slots shown as the hourly trend (~24h).
pub const HOURLY_POINTS: usize = 8;
/// Maximum number of calendar days in the daily roll-up.
pub const MAX_DAYS: usize = 7;

/// Splits the provider's 3-hour list into the hourly slice and the daily
/// roll-up. Days are calendar dates of each entry in `tz`.
pub fn aggregate<Tz: TimeZone>(
    raw: &[Forecast3hItem],
    tz: &Tz,
) -> (Vec<ForecastPoint>, Vec<ForecastPoint>) {
    (hourly(raw), daily(raw, tz))
}

pub fn hourly(raw: &[Forecast3hItem]) -> Vec<ForecastPoint> {
    raw.iter().take(HOURLY_POINTS).map(ForecastPoint::from).collect()
}

/// The first entry seen for a date seeds that day's point; later entries
/// only widen its min/max. Days keep first-seen order.
pub fn daily<Tz: TimeZone>(raw: &[Forecast3hItem], tz: &Tz) -> Vec<ForecastPoint> {
    let mut days: Vec<(NaiveDate, ForecastPoint)> = Vec::new();

    for item in raw {
        let Some(date) = local_date(item.dt, tz) else {
            tracing::debug!("Skipping forecast entry with out-of-range timestamp {}", item.dt);
            continue;
        };

        let item_min = round_temp(item.main.temp_min);
        let item_max = round_temp(item.main.temp_max);

        match days.iter_mut().find(|(d, _)| *d == date) {
            Some((_, day)) => {
                day.min_temp = Some(day.min_temp.map_or(item_min, |m| m.min(item_min)));
                day.max_temp = Some(day.max_temp.map_or(item_max, |m| m.max(item_max)));
            }
            None => {
                let mut seed = ForecastPoint::from(item);
                seed.min_temp = Some(item_min);
                seed.max_temp = Some(item_max);
                days.push((date, seed));
            }
        }
    }

    days.into_iter()
        .take(MAX_DAYS)
        .map(|(_, point)| point)
        .collect()
}

fn local_date<Tz: TimeZone>(dt: i64, tz: &Tz) -> Option<NaiveDate> {
    DateTime::from_timestamp(dt, 0).map(|utc| utc.with_timezone(tz).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    const JAN_1_2024: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z
    const THREE_HOURS: i64 = 3 * 3600;

    fn item(dt: i64, temp: f64, temp_min: f64, temp_max: f64, pop: f64) -> Forecast3hItem {
        Forecast3hItem {
            dt,
            main: Forecast3hMain {
                temp,
                feels_like: temp,
                temp_min,
                temp_max,
                pressure: 1013.0,
                humidity: 60.0,
            },
            weather: vec![WeatherDescription {
                id: 800,
                main: "Clear".to_string(),
                description: format!("clear sky at {dt}"),
                icon: "01d".to_string(),
            }],
            wind: None,
            pop: Some(pop),
            rain: None,
            dt_txt: None,
        }
    }

    fn uniform_list(n: i64) -> Vec<Forecast3hItem> {
        (0..n)
            .map(|i| item(JAN_1_2024 + i * THREE_HOURS, 20.0, 18.0, 22.0, 0.3))
            .collect()
    }

    #[test]
    fn test_sixteen_entries_give_eight_hourly_and_two_days() {
        let raw = uniform_list(16);
        let (hourly, daily) = aggregate(&raw, &Utc);

        assert_eq!(hourly.len(), 8);
        for point in &hourly {
            assert_eq!(point.temp, 20);
            assert_eq!(point.rain_prob, 30);
            assert!(point.min_temp.is_none());
            assert!(point.max_temp.is_none());
        }

        assert_eq!(daily.len(), 2);
        let dates: Vec<NaiveDate> = daily
            .iter()
            .map(|d| DateTime::from_timestamp(d.dt, 0).unwrap().date_naive())
            .collect();
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        for day in &daily {
            assert_eq!(day.min_temp, Some(18));
            assert_eq!(day.max_temp, Some(22));
        }
    }

    #[test]
    fn test_point_counts_follow_list_length_and_dates() {
        for n in [0_i64, 1, 5, 8, 9, 40, 80] {
            let raw = uniform_list(n);
            let (hourly, daily) = aggregate(&raw, &Utc);

            // 8 slots per UTC day starting at midnight.
            let distinct_days = ((n + 7) / 8) as usize;
            assert_eq!(hourly.len(), (n as usize).min(8), "n = {n}");
            assert_eq!(daily.len(), distinct_days.min(7), "n = {n}");
        }
    }

    #[test]
    fn test_daily_min_max_accumulate_over_the_day() {
        let raw = vec![
            item(JAN_1_2024, 15.0, 14.2, 16.0, 0.1),
            item(JAN_1_2024 + THREE_HOURS, 21.0, 19.0, 23.6, 0.9),
            item(JAN_1_2024 + 2 * THREE_HOURS, 11.0, 9.7, 12.0, 0.0),
        ];

        let daily = daily(&raw, &Utc);
        assert_eq!(daily.len(), 1);
        let day = &daily[0];

        assert_eq!(day.min_temp, Some(10));
        assert_eq!(day.max_temp, Some(24));
        for entry in &raw {
            assert!(day.min_temp.unwrap() <= round_temp(entry.main.temp_min));
            assert!(day.max_temp.unwrap() >= round_temp(entry.main.temp_max));
        }
    }

    #[test]
    fn test_daily_seed_fields_are_not_overwritten() {
        let raw = vec![
            item(JAN_1_2024, 15.0, 14.0, 16.0, 0.1),
            item(JAN_1_2024 + THREE_HOURS, 25.0, 24.0, 26.0, 0.8),
        ];

        let day = &daily(&raw, &Utc)[0];
        assert_eq!(day.dt, JAN_1_2024);
        assert_eq!(day.temp, 15);
        assert_eq!(day.rain_prob, 10);
        assert_eq!(day.description, format!("clear sky at {JAN_1_2024}"));
    }

    #[test]
    fn test_daily_truncates_to_seven_days() {
        let raw: Vec<_> = (0..10)
            .map(|d| item(JAN_1_2024 + d * 24 * 3600, 20.0, 18.0, 22.0, 0.0))
            .collect();

        let daily = daily(&raw, &Utc);
        assert_eq!(daily.len(), 7);
        assert_eq!(daily[6].dt, JAN_1_2024 + 6 * 24 * 3600);
    }

    #[test]
    fn test_days_follow_local_timezone() {
        // 2024-01-01 20:00Z and 23:00Z are already Jan 2 in Kolkata (UTC+5:30).
        let raw = vec![
            item(JAN_1_2024 + 15 * 3600, 20.0, 18.0, 22.0, 0.0),
            item(JAN_1_2024 + 20 * 3600, 20.0, 17.0, 22.0, 0.0),
            item(JAN_1_2024 + 23 * 3600, 20.0, 18.0, 25.0, 0.0),
        ];

        assert_eq!(daily(&raw, &Utc).len(), 1);

        let kolkata = daily(&raw, &chrono_tz::Asia::Kolkata);
        assert_eq!(kolkata.len(), 2);
        assert_eq!(kolkata[0].min_temp, Some(18));
        assert_eq!(kolkata[1].min_temp, Some(17));
        assert_eq!(kolkata[1].max_temp, Some(25));
    }

    #[test]
    fn test_missing_pop_counts_as_dry() {
        let mut entry = item(JAN_1_2024, 20.0, 18.0, 22.0, 0.0);
        entry.pop = None;
        entry.weather.clear();

        let hourly = hourly(&[entry]);
        assert_eq!(hourly[0].rain_prob, 0);
        assert_eq!(hourly[0].description, "");
        assert_eq!(hourly[0].icon, "");
    }
}
