use super::{fit_message, message_link, tracked_guild};
use crate::models::RandomFilter;
use crate::services::activity::ActivityService;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Whether a message of a channel may be shown in the one the command runs in.
fn nsfw_allowed(invoked_nsfw: bool, target_nsfw: bool) -> bool {
    invoked_nsfw || !target_nsfw
}

/// Dig up a random archived message
#[poise::command(slash_command, guild_only)]
pub async fn random(
    ctx: Context<'_>,
    #[description = "Channel to pick from (this one by default)"] channel: Option<serenity::GuildChannel>,
    #[description = "Only from this member"] member: Option<serenity::User>,
    #[description = "Minimum length in characters"]
    #[min = 1]
    min_length: Option<u32>,
    #[description = "Only messages with an attachment"] attachments: Option<bool>,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };

    let invoked_nsfw = ctx.guild_channel().await.is_some_and(|c| c.nsfw);
    let (target, target_nsfw) = match &channel {
        Some(channel) => (channel.id.get(), channel.nsfw),
        None => (ctx.channel_id().get(), invoked_nsfw),
    };
    if !nsfw_allowed(invoked_nsfw, target_nsfw) {
        ctx.send(
            poise::CreateReply::default()
                .content("🔞 Messages from an age-restricted channel can only be shown in one.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }
    if guild.is_ignored(target) {
        ctx.send(
            poise::CreateReply::default()
                .content("🐝 Messages of this channel are not archived.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }
    ctx.defer().await?;

    let guild_id = guild.guild_id;
    let service = ActivityService::new(guild, ctx.data().hasher.clone());

    let mut filter = RandomFilter::new(target as i64);
    if let Some(member) = &member {
        filter = filter.by_author(service.author_id(member.id.get()).await?);
    }
    if let Some(min) = min_length {
        filter = filter.with_min_length(min as usize);
    }
    if attachments.unwrap_or(false) {
        filter = filter.attachments_only();
    }

    let Some(pick) = service.random(filter).await? else {
        ctx.say("🐝 No message matches these filters.").await?;
        return Ok(());
    };
    let message = &pick.message;

    let mut text = format!(
        "🎲 <t:{}:D> in <#{}> (1 of {})\n",
        message.timestamp.timestamp(),
        message.channel_id,
        pick.out_of
    );
    if !message.content.is_empty() {
        // Leave room for the header and the links
        let excerpt: String = message.content.chars().take(1600).collect();
        text.push_str(&format!(">>> {}\n", excerpt));
    }
    if let Some(url) = &message.attachment_url {
        text.push_str(url);
        text.push('\n');
    }
    text.push_str(&message_link(guild_id, message.channel_id, message.message_id));

    ctx.send(
        poise::CreateReply::default()
            .content(fit_message(&text))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nsfw_allowed() {
        assert!(nsfw_allowed(false, false));
        assert!(nsfw_allowed(true, false));
        assert!(nsfw_allowed(true, true));
        assert!(!nsfw_allowed(false, true));
    }
}
