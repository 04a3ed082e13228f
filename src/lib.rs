pub mod backfill;
pub mod chart;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod feeds;
pub mod hasher;
pub mod ingest;
pub mod logging;
pub mod messageday;
pub mod models;
pub mod queries;
pub mod services;
pub mod snowflake;
pub mod source;
pub mod tracked;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub registry: Arc<tracked::GuildRegistry>,
    pub hasher: hasher::IdentityHasher,
    pub ingestor: ingest::Ingestor,
    pub source: Arc<dyn source::MessageSource>,
    pub backfiller: Arc<backfill::Backfiller>,
    pub chart: Arc<dyn chart::ChartRenderer>,
    pub ecowatt: Arc<feeds::FeedCache<feeds::ecowatt::EcowattFeed>>,
    pub weather: Arc<feeds::FeedCache<feeds::weather::WeatherFeed>>,
    pub log_control: logging::LogControl,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
