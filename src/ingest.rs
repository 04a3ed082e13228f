//! Applies gateway message events to the archive.

use crate::error::{SourceError, StoreError};
use crate::hasher::IdentityHasher;
use crate::models::{InsertOutcome, UpsertOutcome};
use crate::source::{MessageSource, SourceMessage};
use crate::tracked::{GuildRegistry, TrackedGuild};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why an event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NotInGuild,
    UntrackedGuild,
    IgnoredChannel,
    Bot,
    /// The edited message could not be fetched.
    Unfetchable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested<T> {
    Applied(T),
    Skipped(Skip),
}

#[derive(Clone)]
pub struct Ingestor {
    registry: Arc<GuildRegistry>,
    hasher: IdentityHasher,
}

impl Ingestor {
    pub fn new(registry: Arc<GuildRegistry>, hasher: IdentityHasher) -> Self {
        Self { registry, hasher }
    }

    fn route(&self, guild_id: Option<u64>, channel_id: u64) -> Result<Arc<TrackedGuild>, Skip> {
        let guild_id = guild_id.ok_or(Skip::NotInGuild)?;
        let guild = self.registry.get(guild_id).ok_or(Skip::UntrackedGuild)?;
        if guild.is_ignored(channel_id) {
            return Err(Skip::IgnoredChannel);
        }
        Ok(guild)
    }

    fn accept(&self, msg: &SourceMessage) -> Result<Arc<TrackedGuild>, Skip> {
        let guild = self.route(msg.guild_id, msg.channel_id)?;
        if msg.author_is_bot {
            return Err(Skip::Bot);
        }
        Ok(guild)
    }

    pub async fn on_created(&self, msg: &SourceMessage) -> Result<Ingested<InsertOutcome>, StoreError> {
        let guild = match self.accept(msg) {
            Ok(guild) => guild,
            Err(skip) => return Ok(Ingested::Skipped(skip)),
        };
        let msg = msg.clone();
        let hasher = self.hasher.clone();
        let outcome = guild
            .db
            .run_blocking(move |db| db.insert_new(&msg.to_record(&hasher)))
            .await?;
        if outcome == InsertOutcome::AlreadyPresent {
            debug!("Message already archived, ignoring create");
        }
        Ok(Ingested::Applied(outcome))
    }

    /// Stores the edited state, creating the row if the create was missed.
    pub async fn on_edited(&self, msg: &SourceMessage) -> Result<Ingested<UpsertOutcome>, StoreError> {
        let guild = match self.accept(msg) {
            Ok(guild) => guild,
            Err(skip) => return Ok(Ingested::Skipped(skip)),
        };
        let msg = msg.clone();
        let hasher = self.hasher.clone();
        let outcome = guild
            .db
            .run_blocking(move |db| db.upsert(&msg.to_record(&hasher)))
            .await?;
        Ok(Ingested::Applied(outcome))
    }

    /// Handles an edit whose new state is not in the gateway payload by
    /// fetching the message first.
    pub async fn on_edited_partial(
        &self,
        source: &dyn MessageSource,
        guild_id: Option<u64>,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Ingested<UpsertOutcome>, StoreError> {
        if let Err(skip) = self.route(guild_id, channel_id) {
            return Ok(Ingested::Skipped(skip));
        }
        let mut msg = match source.fetch_message(channel_id, message_id).await {
            Ok(msg) => msg,
            Err(SourceError::NotFound(_)) => {
                debug!("Edited message {} is gone, nothing to update", message_id);
                return Ok(Ingested::Skipped(Skip::Unfetchable));
            }
            Err(e) => {
                warn!("Could not fetch edited message {}: {}", message_id, e);
                return Ok(Ingested::Skipped(Skip::Unfetchable));
            }
        };
        // REST payloads do not carry the guild
        msg.guild_id = guild_id;
        self.on_edited(&msg).await
    }

    pub async fn on_deleted(
        &self,
        guild_id: Option<u64>,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Ingested<bool>, StoreError> {
        let guild = match self.route(guild_id, channel_id) {
            Ok(guild) => guild,
            Err(skip) => return Ok(Ingested::Skipped(skip)),
        };
        let removed = guild
            .db
            .run_blocking(move |db| db.delete_message(message_id as i64))
            .await?;
        Ok(Ingested::Applied(removed))
    }

    /// A deleted channel or thread takes its archived messages with it.
    pub async fn on_channel_deleted(
        &self,
        guild_id: Option<u64>,
        channel_id: u64,
    ) -> Result<Ingested<usize>, StoreError> {
        let guild = match guild_id.and_then(|id| self.registry.get(id)) {
            Some(guild) => guild,
            None => return Ok(Ingested::Skipped(Skip::UntrackedGuild)),
        };
        let removed = guild
            .db
            .run_blocking(move |db| db.delete_channel_messages(channel_id as i64))
            .await?;
        if removed > 0 {
            debug!("Removed {} messages of deleted channel {}", removed, channel_id);
        }
        Ok(Ingested::Applied(removed))
    }
}
