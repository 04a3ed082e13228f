use crate::hasher::IdentityHasher;
use crate::models::Message;
use crate::tracked::TrackedGuild;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub struct PrivacyService {
    guild: Arc<TrackedGuild>,
    hasher: IdentityHasher,
}

pub struct ForgetResult {
    pub messages_deleted: usize,
    pub identity_deleted: bool,
}

#[derive(Serialize)]
struct Export<'a> {
    guild_id: u64,
    author_id: &'a str,
    message_count: usize,
    messages: &'a [Message],
}

impl PrivacyService {
    pub fn new(guild: Arc<TrackedGuild>, hasher: IdentityHasher) -> Self {
        Self { guild, hasher }
    }

    async fn author_id(&self, user_id: u64) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        Ok(tokio::task::spawn_blocking(move || hasher.hash(user_id)).await?)
    }

    /// Lets leaderboards show the user instead of an anonymous author.
    /// Returns false when already registered.
    pub async fn register(&self, user_id: u64) -> anyhow::Result<bool> {
        let author_id = self.author_id(user_id).await?;
        Ok(self
            .guild
            .db
            .run_blocking(move |db| db.register_identity(&author_id, user_id))
            .await?)
    }

    pub async fn unregister(&self, user_id: u64) -> anyhow::Result<bool> {
        let author_id = self.author_id(user_id).await?;
        Ok(self
            .guild
            .db
            .run_blocking(move |db| db.unregister_identity(&author_id))
            .await?)
    }

    /// Every stored message of the user as a pretty-printed JSON document.
    pub async fn export(&self, user_id: u64) -> anyhow::Result<(usize, Vec<u8>)> {
        let author_id = self.author_id(user_id).await?;
        let query_id = author_id.clone();
        let messages = self
            .guild
            .db
            .run_blocking(move |db| db.messages_by_author(&query_id))
            .await?;

        let export = Export {
            guild_id: self.guild.guild_id,
            author_id: &author_id,
            message_count: messages.len(),
            messages: &messages,
        };
        Ok((messages.len(), serde_json::to_vec_pretty(&export)?))
    }

    /// Deletes one message, only if the user wrote it.
    pub async fn delete_message(&self, user_id: u64, message_id: i64) -> anyhow::Result<bool> {
        let author_id = self.author_id(user_id).await?;
        Ok(self
            .guild
            .db
            .run_blocking(move |db| db.delete_author_message(&author_id, message_id))
            .await?)
    }

    /// Removes all of the user's messages and their identity link.
    pub async fn forget(&self, user_id: u64) -> anyhow::Result<ForgetResult> {
        let author_id = self.author_id(user_id).await?;
        let (messages_deleted, identity_deleted) = self
            .guild
            .db
            .run_blocking(move |db| db.forget_author(&author_id))
            .await?;
        info!(
            "Forgot {} messages of a user in guild {}",
            messages_deleted, self.guild.guild_id
        );
        Ok(ForgetResult {
            messages_deleted,
            identity_deleted,
        })
    }
}
