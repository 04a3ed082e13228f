//! Catch-up of channel history missed while the bot was offline, and pruning
//! of channels that no longer exist.
//!
//! Pages are fetched one after the other so the source's rate limits apply
//! naturally. Every write is an idempotent insert, so a run can be
//! interrupted at any point and simply started again.

use crate::error::{BackfillError, SourceError};
use crate::hasher::IdentityHasher;
use crate::models::SaveResult;
use crate::source::{HistoryQuery, MessageSource, SourceMessage, MAX_PAGE_SIZE};
use crate::tracked::{BackfillGuard, TrackedGuild};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PROGRESS_EVERY: u64 = 500;

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    /// Only fetch messages newer than this snowflake, in every channel.
    pub since: Option<u64>,
    /// Upper bound on messages fetched per channel and direction.
    pub limit_per_channel: Option<u64>,
    /// Probe stored channels afterwards and prune the ones that are gone.
    pub sweep: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel_id: u64,
    pub name: String,
    pub result: SaveResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Channels reported gone, with the number of rows removed.
    pub pruned: Vec<(u64, usize)>,
    /// Channels that could not be probed. Their rows are kept.
    pub kept: Vec<(u64, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildBackfillReport {
    pub guild_id: u64,
    pub total: SaveResult,
    pub channels: Vec<ChannelReport>,
    pub failed: Vec<(u64, String)>,
    pub sweep: Option<SweepReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

pub struct Backfiller {
    source: Arc<dyn MessageSource>,
    hasher: IdentityHasher,
}

impl Backfiller {
    pub fn new(source: Arc<dyn MessageSource>, hasher: IdentityHasher) -> Self {
        Self { source, hasher }
    }

    /// Backfills every archivable channel of the guild.
    ///
    /// The watermark only moves when every channel was caught up to the
    /// present, so a channel that failed is resumed from where it stopped.
    pub async fn backfill_guild(
        &self,
        guild: &TrackedGuild,
        options: &BackfillOptions,
    ) -> Result<GuildBackfillReport, BackfillError> {
        let guard = guild.lock_backfill().await;
        self.backfill_guild_locked(guild, options, guard).await
    }

    /// [`Self::backfill_guild`] under a lock the caller already took.
    pub async fn backfill_guild_locked(
        &self,
        guild: &TrackedGuild,
        options: &BackfillOptions,
        guard: BackfillGuard,
    ) -> Result<GuildBackfillReport, BackfillError> {
        debug_assert!(guild.is_locked_by(&guard));
        info!("Backfilling guild {}...", guild.guild_id);

        let mut report = GuildBackfillReport {
            guild_id: guild.guild_id,
            ..Default::default()
        };
        let channels = self.source.text_channels(guild.guild_id).await?;

        for channel in channels {
            if guild.is_ignored(channel.id) {
                debug!("Skipping ignored channel {}", channel.name);
                continue;
            }
            match self.save_channel(guild, channel.id, options).await {
                Ok(result) => {
                    if result.found > 0 {
                        info!("#{}: {}", channel.name, result);
                    }
                    report.total += result;
                    report.channels.push(ChannelReport {
                        channel_id: channel.id,
                        name: channel.name,
                        result,
                    });
                }
                Err(e) => {
                    warn!("Backfill of #{} failed: {}", channel.name, e);
                    report.failed.push((channel.id, e.to_string()));
                }
            }
        }

        if options.sweep {
            report.sweep = Some(self.sweep_locked(guild).await?);
        }
        if report.failed.is_empty() && options.limit_per_channel.is_none() {
            guild.refresh_watermark().await?;
        } else {
            info!(
                "Guild {}: watermark kept, {} channels failed",
                guild.guild_id,
                report.failed.len()
            );
        }
        drop(guard);

        info!("Guild {} backfilled: {}", guild.guild_id, report.total);
        Ok(report)
    }

    /// Backfills a single channel under a lock the caller already took. The
    /// guild watermark is left alone.
    pub async fn backfill_channel_locked(
        &self,
        guild: &TrackedGuild,
        channel_id: u64,
        options: &BackfillOptions,
        guard: BackfillGuard,
    ) -> Result<SaveResult, BackfillError> {
        debug_assert!(guild.is_locked_by(&guard));
        let result = self.save_channel(guild, channel_id, options).await;
        drop(guard);
        result
    }

    /// Removes the rows of stored channels the source reports as gone.
    pub async fn sweep(&self, guild: &TrackedGuild) -> Result<SweepReport, BackfillError> {
        let _lock = guild.lock_backfill().await;
        self.sweep_locked(guild).await
    }

    async fn sweep_locked(&self, guild: &TrackedGuild) -> Result<SweepReport, BackfillError> {
        let mut report = SweepReport::default();
        let channels = guild.db.run_blocking(|db| db.distinct_channels()).await?;

        for channel_id in channels {
            let channel = channel_id as u64;
            match self.source.probe(channel).await {
                Ok(()) => {}
                Err(SourceError::NotFound(_)) => {
                    let removed = guild
                        .db
                        .run_blocking(move |db| db.delete_channel_messages(channel_id))
                        .await?;
                    info!("Channel {} is gone, removed {} messages", channel, removed);
                    report.pruned.push((channel, removed));
                }
                Err(e) => {
                    warn!("Keeping channel {}: {}", channel, e);
                    report.kept.push((channel, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    async fn save_channel(
        &self,
        guild: &TrackedGuild,
        channel_id: u64,
        options: &BackfillOptions,
    ) -> Result<SaveResult, BackfillError> {
        let limit = options.limit_per_channel;

        if let Some(since) = options.since {
            return self
                .walk(guild, channel_id, Direction::Forward, Some(since), limit)
                .await;
        }

        let (oldest, newest) = guild
            .db
            .run_blocking(move |db| {
                Ok((
                    db.oldest_in_channel(channel_id as i64)?,
                    db.newest_in_channel(channel_id as i64)?,
                ))
            })
            .await?;

        match oldest {
            // Never seen: everything, newest to oldest
            None => self.walk(guild, channel_id, Direction::Backward, None, limit).await,
            Some(oldest) => {
                let mut result = self
                    .walk(
                        guild,
                        channel_id,
                        Direction::Backward,
                        Some(oldest.message_id as u64),
                        limit,
                    )
                    .await?;
                // Live messages may sit past a gap, so never resume after
                // the guild watermark. A channel behind it resumes from its own newest.
                let resume = match (guild.watermark(), newest) {
                    (Some(watermark), Some(newest)) => watermark.message_id.min(newest.message_id),
                    (Some(watermark), None) => watermark.message_id,
                    (None, Some(newest)) => newest.message_id,
                    (None, None) => oldest.message_id,
                };
                result += self
                    .walk(guild, channel_id, Direction::Forward, Some(resume as u64), limit)
                    .await?;
                Ok(result)
            }
        }
    }

    /// Pages through history from `cursor` until the source runs dry or
    /// `limit` messages were seen.
    async fn walk(
        &self,
        guild: &TrackedGuild,
        channel_id: u64,
        direction: Direction,
        mut cursor: Option<u64>,
        limit: Option<u64>,
    ) -> Result<SaveResult, BackfillError> {
        let mut result = SaveResult::default();

        loop {
            let remaining = limit.map(|l| l.saturating_sub(result.found));
            if remaining == Some(0) {
                break;
            }
            let page_size = remaining.map_or(MAX_PAGE_SIZE, |r| r.min(MAX_PAGE_SIZE as u64) as u8);
            let query = match (direction, cursor) {
                (_, None) => HistoryQuery::latest(page_size),
                (Direction::Backward, Some(id)) => HistoryQuery::before(id, page_size),
                (Direction::Forward, Some(id)) => HistoryQuery::after(id, page_size),
            };

            let page = self.source.history(channel_id, query).await?;
            if page.is_empty() {
                break;
            }
            let ids = page.iter().map(|m| m.id);
            cursor = match direction {
                Direction::Backward => ids.min(),
                Direction::Forward => ids.max(),
            };

            let before = result.found;
            let mut records: Vec<SourceMessage> = Vec::with_capacity(page.len());
            for msg in &page {
                result.found += 1;
                if msg.author_is_bot {
                    result.from_bot += 1;
                } else {
                    records.push(msg.clone());
                }
            }

            let hasher = self.hasher.clone();
            let outcomes = guild
                .db
                .run_blocking(move |db| {
                    records
                        .iter()
                        .map(|msg| db.insert_new(&msg.to_record(&hasher)))
                        .collect::<Result<Vec<_>, _>>()
                })
                .await?;
            for outcome in outcomes {
                result.record(outcome);
            }

            if result.found / PROGRESS_EVERY > before / PROGRESS_EVERY {
                info!("Channel {}: {} messages processed", channel_id, result.found);
            }
            if page.len() < page_size as usize {
                break;
            }
        }
        Ok(result)
    }
}
