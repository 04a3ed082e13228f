//! Periodically refreshed external data.
//!
//! Each feed keeps its last successful value in memory. A failed refresh is
//! logged and leaves the cached value alone until the next tick.

pub mod ecowatt;
pub mod weather;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

#[async_trait]
pub trait Feed: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn fetch(&self) -> anyhow::Result<Self::Value>;
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

pub struct FeedCache<F: Feed> {
    feed: F,
    latest: RwLock<Option<Cached<F::Value>>>,
}

impl<F: Feed> FeedCache<F> {
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            latest: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.feed.name()
    }

    pub async fn latest(&self) -> Option<Cached<F::Value>> {
        self.latest.read().await.clone()
    }

    /// Fetches a new value. On failure the previous one is kept.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        info!("Updating {}...", self.feed.name());
        let value = self.feed.fetch().await?;
        *self.latest.write().await = Some(Cached {
            value,
            fetched_at: Utc::now(),
        });
        info!("{} updated.", self.feed.name());
        Ok(())
    }

    /// Cached value, fetching it first if nothing was cached yet.
    pub async fn latest_or_refresh(&self) -> Option<Cached<F::Value>> {
        if let Some(cached) = self.latest().await {
            return Some(cached);
        }
        if let Err(e) = self.refresh().await {
            warn!("{} update has failed: {}", self.feed.name(), e);
        }
        self.latest().await
    }

    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh().await {
                warn!("{} update has failed: {}", self.feed.name(), e);
            }
        }
    }
}

/// HTTP client shared by the feeds.
pub fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(concat!("abeille/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to a default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves the canned `(status, body)` responses, one per connection, and
    /// returns the base URL.
    pub async fn serve(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }
}
