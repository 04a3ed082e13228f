//! Daily temperature anomaly from an Open-Meteo compatible API.

use super::Feed;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

/// Days averaged into the baseline.
pub const BASELINE_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAnomaly {
    pub date: NaiveDate,
    pub today_mean: f64,
    pub baseline_mean: f64,
    pub anomaly: f64,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_mean: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

/// Today's mean temperature against the mean of the preceding days.
fn compute_anomaly(daily: &DailySeries) -> Option<WeatherAnomaly> {
    let (date, today) = daily
        .time
        .iter()
        .zip(&daily.temperature_2m_mean)
        .last()
        .and_then(|(d, t)| t.map(|t| (*d, t)))?;

    let previous: Vec<f64> = daily
        .temperature_2m_mean
        .iter()
        .take(daily.temperature_2m_mean.len().saturating_sub(1))
        .flatten()
        .copied()
        .collect();
    if previous.is_empty() {
        return None;
    }
    let baseline = previous.iter().sum::<f64>() / previous.len() as f64;

    Some(WeatherAnomaly {
        date,
        today_mean: today,
        baseline_mean: baseline,
        anomaly: today - baseline,
    })
}

pub struct WeatherFeed {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    latitude: f64,
    longitude: f64,
}

impl WeatherFeed {
    pub fn new(http: reqwest::Client, url: String, api_key: Option<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            http,
            url,
            api_key,
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl Feed for WeatherFeed {
    type Value = WeatherAnomaly;

    fn name(&self) -> &'static str {
        "Weather"
    }

    async fn fetch(&self) -> anyhow::Result<WeatherAnomaly> {
        let mut request = self.http.get(&self.url).query(&[
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("daily", "temperature_2m_mean".to_string()),
            ("past_days", BASELINE_DAYS.to_string()),
            ("forecast_days", "1".to_string()),
            ("timezone", "UTC".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: ForecastResponse = request.send().await?.error_for_status()?.json().await?;
        compute_anomaly(&response.daily)
            .ok_or_else(|| anyhow::anyhow!("not enough temperature data for an anomaly"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::http_client;
    use crate::feeds::test_server::serve;

    fn series(values: &[Option<f64>]) -> DailySeries {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        DailySeries {
            time: (0..values.len() as i64)
                .map(|i| start + chrono::Duration::days(i))
                .collect(),
            temperature_2m_mean: values.to_vec(),
        }
    }

    #[test]
    fn test_compute_anomaly() {
        let anomaly = compute_anomaly(&series(&[Some(20.0), None, Some(22.0), Some(25.0)])).unwrap();
        assert_eq!(anomaly.date, NaiveDate::from_ymd_opt(2024, 7, 4).unwrap());
        assert_eq!(anomaly.baseline_mean, 21.0);
        assert_eq!(anomaly.anomaly, 4.0);

        // Today's value missing or no history
        assert!(compute_anomaly(&series(&[Some(20.0), None])).is_none());
        assert!(compute_anomaly(&series(&[Some(20.0)])).is_none());
        assert!(compute_anomaly(&series(&[])).is_none());
    }

    #[tokio::test]
    async fn test_fetch() {
        let body = r#"{"latitude":48.86,"longitude":2.35,"daily_units":{"time":"iso8601"},
            "daily":{"time":["2024-07-01","2024-07-02","2024-07-03"],"temperature_2m_mean":[18.5,19.5,21.0]}}"#;
        let url = serve(vec![(200, body.to_string()), (500, "{}".to_string())]).await;
        let feed = WeatherFeed::new(http_client(5), url, None, 48.86, 2.35);

        let anomaly = feed.fetch().await.unwrap();
        assert_eq!(anomaly.today_mean, 21.0);
        assert_eq!(anomaly.anomaly, 2.0);
        assert!(feed.fetch().await.is_err());
    }
}
