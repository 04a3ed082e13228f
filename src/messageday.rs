//! Keeps the per-day message totals used by trends up to date.

use crate::tracked::GuildRegistry;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

pub struct MessageDayRefresher {
    registry: Arc<GuildRegistry>,
    every: Duration,
}

impl MessageDayRefresher {
    pub fn new(registry: Arc<GuildRegistry>, every: Duration) -> Self {
        Self { registry, every }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            refresh_all(&self.registry, Utc::now().date_naive()).await;
        }
    }
}

/// Recomputes the totals of every guild for the days before `today`.
/// Returns how many guilds were refreshed.
pub async fn refresh_all(registry: &GuildRegistry, today: NaiveDate) -> usize {
    info!("Updating MessageDay...");
    let mut refreshed = 0;
    for guild in registry.guilds() {
        match guild
            .db
            .run_blocking(move |db| db.refresh_message_days(Some(today)))
            .await
        {
            Ok(days) => {
                refreshed += 1;
                info!("MessageDay of guild {}: {} days", guild.guild_id, days);
            }
            Err(e) => error!("MessageDay update of guild {} failed: {}", guild.guild_id, e),
        }
    }
    refreshed
}
