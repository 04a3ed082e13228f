pub mod activity;
pub mod admin;
pub mod feeds;
pub mod misc;
pub mod privacy;
pub mod random;

use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::tracked::TrackedGuild;
use crate::{Context, Error};
use std::sync::Arc;

/// Archive of the guild the command was invoked in. Replies and returns
/// `None` when that guild is not archived.
pub(crate) async fn tracked_guild(ctx: Context<'_>) -> Result<Option<Arc<TrackedGuild>>, Error> {
    let guild = ctx
        .guild_id()
        .and_then(|id| ctx.data().registry.get(id.get()));
    if guild.is_none() {
        ctx.send(
            poise::CreateReply::default()
                .content("🐝 Messages of this server are not archived.")
                .ephemeral(true),
        )
        .await?;
    }
    Ok(guild)
}

/// Cuts `text` to fit in one Discord message.
pub(crate) fn fit_message(text: &str) -> String {
    if text.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DISCORD_MESSAGE_LIMIT - 1).collect();
    out.push('…');
    out
}

pub(crate) fn message_link(guild_id: u64, channel_id: i64, message_id: i64) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild_id, channel_id, message_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_message() {
        assert_eq!(fit_message("court"), "court");
        let long = "é".repeat(DISCORD_MESSAGE_LIMIT + 10);
        let fitted = fit_message(&long);
        assert_eq!(fitted.chars().count(), DISCORD_MESSAGE_LIMIT);
        assert!(fitted.ends_with('…'));
    }

    #[test]
    fn test_message_link() {
        assert_eq!(
            message_link(1, 2, 3),
            "https://discord.com/channels/1/2/3"
        );
    }
}
