use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::time::{Duration, Instant};

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Archive size and bot uptime
#[poise::command(slash_command)]
pub async fn info(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let uptime = (Utc::now() - data.started_at)
        .to_std()
        .unwrap_or_default();
    // Whole seconds only
    let uptime = humantime::format_duration(Duration::from_secs(uptime.as_secs()));

    let mut embed = serenity::CreateEmbed::new()
        .title("🐝 Abeille")
        .field("Archived servers", data.registry.len().to_string(), true)
        .field("Uptime", uptime.to_string(), true)
        .color(0xF5C518);

    let guild = ctx.guild_id().and_then(|id| data.registry.get(id.get()));
    if let Some(guild) = guild {
        let count = guild.db.run_blocking(|db| db.message_count()).await?;
        let size = guild
            .db
            .path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|| "in memory".to_string());
        embed = embed
            .field("Messages here", count.to_string(), true)
            .field("Database size", size, true);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Check that the bot answers
#[poise::command(slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let start = Instant::now();
    let reply = ctx.say("🏓 Pong!").await?;
    let elapsed = start.elapsed().as_millis();
    reply
        .edit(
            ctx,
            poise::CreateReply::default().content(format!("🏓 Pong! ({} ms)", elapsed)),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
