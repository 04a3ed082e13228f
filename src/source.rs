//! Where message history comes from.
//!
//! The backfill engine and edit handling only see the [`MessageSource`]
//! trait; [`SerenitySource`] is the Discord REST implementation.

use crate::error::SourceError;
use crate::hasher::IdentityHasher;
use crate::models::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, ChannelType, GetMessages, GuildChannel, GuildId, MessageId};
use serenity::http::{Http, HttpError};
use std::sync::Arc;
use tracing::debug;

/// Largest page Discord serves.
pub const MAX_PAGE_SIZE: u8 = 100;

/// A message as seen upstream, before pseudonymization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub attachment_url: Option<String>,
}

impl SourceMessage {
    /// Archive row for this message. Hashing is expensive, call it off the runtime.
    pub fn to_record(&self, hasher: &IdentityHasher) -> Message {
        Message {
            message_id: self.id as i64,
            author_id: hasher.hash(self.author_id),
            channel_id: self.channel_id as i64,
            timestamp: self.timestamp,
            content: self.content.clone(),
            attachment_url: self.attachment_url.clone(),
        }
    }
}

impl From<&serenity::all::Message> for SourceMessage {
    fn from(msg: &serenity::all::Message) -> Self {
        Self {
            id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            guild_id: msg.guild_id.map(|g| g.get()),
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            timestamp: DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
                .unwrap_or_default(),
            content: msg.content.clone(),
            attachment_url: msg.attachments.first().map(|a| a.url.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    News,
    Thread,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
}

/// One history page request. Without a cursor the newest messages are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub before: Option<u64>,
    pub after: Option<u64>,
    pub limit: u8,
}

impl HistoryQuery {
    pub fn latest(limit: u8) -> Self {
        Self {
            before: None,
            after: None,
            limit,
        }
    }

    pub fn before(id: u64, limit: u8) -> Self {
        Self {
            before: Some(id),
            ..Self::latest(limit)
        }
    }

    pub fn after(id: u64, limit: u8) -> Self {
        Self {
            after: Some(id),
            ..Self::latest(limit)
        }
    }
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Archivable channels of a guild: text, news and their readable threads.
    async fn text_channels(&self, guild_id: u64) -> Result<Vec<ChannelRef>, SourceError>;

    /// One page of history, in no particular order.
    async fn history(&self, channel_id: u64, query: HistoryQuery) -> Result<Vec<SourceMessage>, SourceError>;

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<SourceMessage, SourceError>;

    /// Checks that a channel still exists and can be read.
    async fn probe(&self, channel_id: u64) -> Result<(), SourceError> {
        self.history(channel_id, HistoryQuery::latest(1)).await.map(|_| ())
    }
}

pub struct SerenitySource {
    http: Arc<Http>,
}

impl SerenitySource {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn archived_threads(&self, channel: ChannelId) -> Result<Vec<GuildChannel>, SourceError> {
        let mut threads = Vec::new();
        let mut before = None;
        loop {
            let page = channel
                .get_archived_public_threads(self.http.as_ref(), before, Some(100))
                .await
                .map_err(|e| classify(channel.get(), e))?;
            before = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.as_ref())
                .and_then(|m| m.archive_timestamp)
                .and_then(|t| u64::try_from(t.unix_timestamp()).ok());
            let has_more = page.has_more && before.is_some();
            threads.extend(page.threads);
            if !has_more {
                break;
            }
        }
        Ok(threads)
    }
}

#[async_trait]
impl MessageSource for SerenitySource {
    async fn text_channels(&self, guild_id: u64) -> Result<Vec<ChannelRef>, SourceError> {
        let guild = GuildId::new(guild_id);
        let channels = guild
            .channels(self.http.as_ref())
            .await
            .map_err(|e| classify(guild_id, e))?;

        let mut refs = Vec::new();
        for channel in channels.values() {
            let kind = match channel.kind {
                ChannelType::Text => ChannelKind::Text,
                ChannelType::News => ChannelKind::News,
                _ => continue,
            };
            refs.push(ChannelRef {
                id: channel.id.get(),
                name: channel.name.clone(),
                kind,
            });

            // Missing access to archived threads is not fatal for the parent channel
            match self.archived_threads(channel.id).await {
                Ok(threads) => refs.extend(threads.iter().filter_map(thread_ref)),
                Err(e) => debug!("No archived threads for {}: {}", channel.name, e),
            }
        }

        let active = guild
            .get_active_threads(self.http.as_ref())
            .await
            .map_err(|e| classify(guild_id, e))?;
        refs.extend(active.threads.iter().filter_map(thread_ref));

        refs.sort_by_key(|c| c.id);
        refs.dedup_by_key(|c| c.id);
        Ok(refs)
    }

    async fn history(&self, channel_id: u64, query: HistoryQuery) -> Result<Vec<SourceMessage>, SourceError> {
        let mut builder = GetMessages::new().limit(query.limit.min(MAX_PAGE_SIZE));
        if let Some(before) = query.before {
            builder = builder.before(MessageId::new(before.max(1)));
        } else if let Some(after) = query.after {
            builder = builder.after(MessageId::new(after.max(1)));
        }
        let page = ChannelId::new(channel_id)
            .messages(self.http.as_ref(), builder)
            .await
            .map_err(|e| classify(channel_id, e))?;
        Ok(page.iter().map(SourceMessage::from).collect())
    }

    async fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<SourceMessage, SourceError> {
        let msg = ChannelId::new(channel_id)
            .message(self.http.as_ref(), MessageId::new(message_id.max(1)))
            .await
            .map_err(|e| classify(channel_id, e))?;
        Ok(SourceMessage::from(&msg))
    }
}

fn thread_ref(thread: &GuildChannel) -> Option<ChannelRef> {
    match thread.kind {
        ChannelType::PublicThread | ChannelType::NewsThread => Some(ChannelRef {
            id: thread.id.get(),
            name: thread.name.clone(),
            kind: ChannelKind::Thread,
        }),
        _ => None,
    }
}

/// Maps REST failures onto the cases the sweep distinguishes.
fn classify(id: u64, err: serenity::Error) -> SourceError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &err {
        match resp.status_code.as_u16() {
            403 => return SourceError::Forbidden(id),
            404 => return SourceError::NotFound(id),
            _ => {}
        }
    }
    SourceError::Other(err.to_string())
}
