//! RTE Ecowatt: daily stress level of the French power grid.

use super::Feed;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;

pub const AUTH_URL: &str = "https://digital.iservices.rte-france.com/token/oauth/";
pub const SIGNALS_URL: &str = "https://digital.iservices.rte-france.com/open_api/ecowatt/v4/signals";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignalHour {
    #[serde(rename = "pas")]
    pub hour: u8,
    #[serde(rename = "hvalue")]
    pub value: u8,
}

/// Forecast for one day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Signal {
    #[serde(rename = "GenerationFichier")]
    pub generated_at: String,
    #[serde(rename = "jour")]
    pub day: String,
    #[serde(rename = "dvalue")]
    pub value: u8,
    pub message: String,
    #[serde(default)]
    pub values: Vec<SignalHour>,
}

impl Signal {
    /// `YYYY-MM-DD` part of the day stamp.
    pub fn date(&self) -> &str {
        self.day.get(..10).unwrap_or(&self.day)
    }
}

#[derive(Deserialize)]
struct SignalsResponse {
    signals: Vec<Signal>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub fn level_icon(value: u8) -> &'static str {
    match value {
        1 => "🟢",
        2 => "🟠",
        3 => "🔴",
        _ => "⚪",
    }
}

pub fn level_message(value: u8) -> &'static str {
    match value {
        1 => "No power cut expected.",
        2 => "Strained power grid. Saving energy is welcome.",
        3 => "Very strained power grid. Power cuts are unavoidable unless consumption drops.",
        _ => "Unknown grid status.",
    }
}

pub struct EcowattFeed {
    http: reqwest::Client,
    /// Base64 `client_id:client_secret`.
    token: Option<String>,
    auth_url: String,
    signals_url: String,
}

impl EcowattFeed {
    pub fn new(http: reqwest::Client, token: Option<String>) -> Self {
        Self::with_urls(http, token, AUTH_URL, SIGNALS_URL)
    }

    pub fn with_urls(http: reqwest::Client, token: Option<String>, auth_url: &str, signals_url: &str) -> Self {
        Self {
            http,
            token,
            auth_url: auth_url.to_string(),
            signals_url: signals_url.to_string(),
        }
    }
}

#[async_trait]
impl Feed for EcowattFeed {
    type Value = Vec<Signal>;

    fn name(&self) -> &'static str {
        "Ecowatt"
    }

    async fn fetch(&self) -> anyhow::Result<Vec<Signal>> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("ECOWATT_BASE64_TOKEN is not set"))?;

        let auth: TokenResponse = self
            .http
            .get(&self.auth_url)
            .header(AUTHORIZATION, format!("Basic {}", token))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let response = self
            .http
            .get(&self.signals_url)
            .bearer_auth(&auth.access_token)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let body: SignalsResponse = response.json().await?;
                if body.signals.is_empty() {
                    anyhow::bail!("no signal in response");
                }
                Ok(body.signals)
            }
            StatusCode::TOO_MANY_REQUESTS => anyhow::bail!("too many requests (429)"),
            status => anyhow::bail!("unexpected status {}", status.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::test_server::serve;
    use crate::feeds::{http_client, FeedCache};

    const SIGNALS: &str = r#"{"signals":[
        {"GenerationFichier":"2024-01-15T00:00:00+01:00","jour":"2024-01-15T00:00:00+01:00","dvalue":1,"message":"Situation normale.","values":[{"pas":0,"hvalue":1}]},
        {"GenerationFichier":"2024-01-15T00:00:00+01:00","jour":"2024-01-16T00:00:00+01:00","dvalue":2,"message":"Système tendu.","values":[]}
    ]}"#;

    #[tokio::test]
    async fn test_fetch_signals() {
        let auth = serve(vec![(200, r#"{"access_token":"abc","token_type":"Bearer"}"#.to_string())]).await;
        let signals = serve(vec![(200, SIGNALS.to_string())]).await;
        let feed = EcowattFeed::with_urls(http_client(5), Some("dG9rZW4=".to_string()), &auth, &signals);

        let fetched = feed.fetch().await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].value, 1);
        assert_eq!(fetched[0].values, vec![SignalHour { hour: 0, value: 1 }]);
        assert_eq!(fetched[1].date(), "2024-01-16");
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_cached_signals() {
        let auth = serve(vec![
            (200, r#"{"access_token":"abc"}"#.to_string()),
            (200, r#"{"access_token":"abc"}"#.to_string()),
        ])
        .await;
        let signals = serve(vec![(200, SIGNALS.to_string()), (429, "{}".to_string())]).await;
        let cache = FeedCache::new(EcowattFeed::with_urls(
            http_client(5),
            Some("dG9rZW4=".to_string()),
            &auth,
            &signals,
        ));

        cache.refresh().await.unwrap();
        let err = cache.refresh().await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert_eq!(cache.latest().await.unwrap().value.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let feed = EcowattFeed::new(http_client(5), None);
        assert!(feed.fetch().await.is_err());
    }

    #[test]
    fn test_levels() {
        assert_eq!(level_icon(1), "🟢");
        assert_eq!(level_icon(3), "🔴");
        assert_eq!(level_icon(9), "⚪");
        assert!(level_message(2).contains("Strained"));
    }
}
