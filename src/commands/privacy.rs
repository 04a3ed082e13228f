use super::tracked_guild;
use crate::services::privacy::PrivacyService;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

async fn service(ctx: Context<'_>) -> Result<Option<PrivacyService>, Error> {
    Ok(tracked_guild(ctx)
        .await?
        .map(|guild| PrivacyService::new(guild, ctx.data().hasher.clone())))
}

async fn reply_private(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show your name instead of "anonymous" in leaderboards
#[poise::command(slash_command, guild_only)]
pub async fn register(ctx: Context<'_>) -> Result<(), Error> {
    let Some(service) = service(ctx).await? else {
        return Ok(());
    };
    if service.register(ctx.author().id.get()).await? {
        reply_private(ctx, "✅ You are registered: leaderboards will show your name.").await
    } else {
        reply_private(ctx, "🐝 You are already registered.").await
    }
}

/// Go back to being anonymous in leaderboards
#[poise::command(slash_command, guild_only)]
pub async fn unregister(ctx: Context<'_>) -> Result<(), Error> {
    let Some(service) = service(ctx).await? else {
        return Ok(());
    };
    if service.unregister(ctx.author().id.get()).await? {
        reply_private(ctx, "✅ You are anonymous again.").await
    } else {
        reply_private(ctx, "🐝 You were not registered.").await
    }
}

/// Download every message of yours archived on this server
#[poise::command(slash_command, guild_only)]
pub async fn export(ctx: Context<'_>) -> Result<(), Error> {
    let Some(service) = service(ctx).await? else {
        return Ok(());
    };
    ctx.defer_ephemeral().await?;

    let (count, document) = service.export(ctx.author().id.get()).await?;
    if count == 0 {
        return reply_private(ctx, "📭 No message of yours is archived here.").await;
    }
    ctx.send(
        poise::CreateReply::default()
            .content(format!("📦 {} archived messages.", count))
            .attachment(serenity::CreateAttachment::bytes(document, "messages.json"))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Remove one of your messages from the archive
#[poise::command(slash_command, guild_only)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "ID of the message to remove"] message_id: String,
) -> Result<(), Error> {
    let Ok(message_id) = message_id.trim().parse::<i64>() else {
        return reply_private(ctx, "🐝 That is not a message ID.").await;
    };
    let Some(service) = service(ctx).await? else {
        return Ok(());
    };
    if service.delete_message(ctx.author().id.get(), message_id).await? {
        reply_private(ctx, "🗑️ The message was removed from the archive.").await
    } else {
        reply_private(ctx, "🐝 No message of yours with this ID is archived.").await
    }
}

/// Remove all your messages from the archive
#[poise::command(slash_command, guild_only)]
pub async fn forget(ctx: Context<'_>) -> Result<(), Error> {
    let Some(service) = service(ctx).await? else {
        return Ok(());
    };
    info!("Data deletion requested by user {}", ctx.author().id.get());

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .content("⚠️ This will delete every message of yours archived on this server. This cannot be undone.")
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new("confirm_forget")
                        .label("Delete my messages")
                        .style(serenity::ButtonStyle::Danger),
                    serenity::CreateButton::new("cancel_forget")
                        .label("Cancel")
                        .style(serenity::ButtonStyle::Secondary),
                ])])
                .ephemeral(true),
        )
        .await?;

    let Some(interaction) = reply
        .message()
        .await?
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(std::time::Duration::from_secs(120))
        .await
    else {
        return Ok(());
    };

    let content = if interaction.data.custom_id == "confirm_forget" {
        let result = service.forget(ctx.author().id.get()).await?;
        format!(
            "🗑️ Deleted **{}** messages{}.",
            result.messages_deleted,
            if result.identity_deleted {
                " and your registration"
            } else {
                ""
            }
        )
    } else {
        "❌ Deletion cancelled.".to_string()
    };

    interaction
        .create_response(
            ctx.serenity_context(),
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(vec![]),
            ),
        )
        .await?;
    Ok(())
}
