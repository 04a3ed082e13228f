use super::{fit_message, tracked_guild};
use crate::backfill::{BackfillOptions, GuildBackfillReport, SweepReport};
use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::messageday::refresh_all;
use crate::snowflake::snowflake_from_datetime;
use crate::{Context, Error};
use chrono::{Duration, Utc};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

const SQL_MAX_ROWS: usize = 20;

/// Owner tools
#[poise::command(
    slash_command,
    owners_only,
    hide_in_help,
    subcommands(
        "save",
        "savechannel",
        "sweep",
        "channels",
        "optimize",
        "rebuild",
        "messageday",
        "refresh_feeds",
        "sql",
        "set_logging",
        "shutdown"
    )
)]
pub async fn admin(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn format_sweep(sweep: &SweepReport) -> Vec<String> {
    let mut lines = Vec::new();
    for (channel, removed) in &sweep.pruned {
        lines.push(format!("🗑️ Channel {} is gone: {} messages removed", channel, removed));
    }
    for (channel, reason) in &sweep.kept {
        lines.push(format!("🔒 Channel {} kept: {}", channel, reason));
    }
    if lines.is_empty() {
        lines.push("✅ Every stored channel still exists.".to_string());
    }
    lines
}

fn format_report(report: &GuildBackfillReport) -> String {
    let mut lines = vec![format!("💾 **Backfill done**: {}", report.total)];
    for channel in report.channels.iter().filter(|c| c.result.found > 0) {
        lines.push(format!("<#{}>: {}", channel.channel_id, channel.result));
    }
    for (channel, reason) in &report.failed {
        lines.push(format!("⚠️ <#{}>: {}", channel, reason));
    }
    if let Some(sweep) = &report.sweep {
        lines.extend(format_sweep(sweep));
    }
    fit_message(&lines.join("\n"))
}

/// Fetch the history missed while the bot was offline
#[poise::command(slash_command, owners_only, guild_only)]
pub async fn save(
    ctx: Context<'_>,
    #[description = "Only fetch the last N days"]
    #[min = 1]
    since_days: Option<u32>,
    #[description = "Prune the channels that no longer exist afterwards"] prune: Option<bool>,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    let Some(guard) = guild.try_lock_backfill() else {
        ctx.say("⏳ A backfill of this server is already running.").await?;
        return Ok(());
    };

    let options = BackfillOptions {
        since: since_days
            .map(|days| snowflake_from_datetime(Utc::now() - Duration::days(i64::from(days)))),
        limit_per_channel: None,
        sweep: prune.unwrap_or(false),
    };
    info!(
        "Backfill of guild {} requested by {} (since {:?} days)",
        guild.guild_id,
        ctx.author().name,
        since_days
    );
    ctx.say("💾 Backfill started, I will post the report here.").await?;

    let backfiller = ctx.data().backfiller.clone();
    let http = ctx.serenity_context().http.clone();
    let channel = ctx.channel_id();
    tokio::spawn(async move {
        let text = match backfiller.backfill_guild_locked(&guild, &options, guard).await {
            Ok(report) => format_report(&report),
            Err(e) => {
                error!("Backfill of guild {} failed: {}", guild.guild_id, e);
                format!("❌ Backfill failed: {}", e)
            }
        };
        if let Err(e) = channel.say(&http, text).await {
            error!("Failed to post the backfill report: {}", e);
        }
    });
    Ok(())
}

/// Fetch the missing history of one channel
#[poise::command(slash_command, owners_only, guild_only)]
pub async fn savechannel(
    ctx: Context<'_>,
    #[description = "Channel to fetch (defaults to this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    if guild.is_ignored(channel_id.get()) {
        ctx.say("🙈 This channel is ignored.").await?;
        return Ok(());
    }
    let Some(guard) = guild.try_lock_backfill() else {
        ctx.say("⏳ A backfill of this server is already running.").await?;
        return Ok(());
    };
    ctx.say(format!("💾 Fetching <#{}>...", channel_id)).await?;

    let backfiller = ctx.data().backfiller.clone();
    let http = ctx.serenity_context().http.clone();
    let reply_to = ctx.channel_id();
    tokio::spawn(async move {
        let text = match backfiller
            .backfill_channel_locked(&guild, channel_id.get(), &BackfillOptions::default(), guard)
            .await
        {
            Ok(result) => format!("💾 <#{}>: {}", channel_id, result),
            Err(e) => {
                error!("Backfill of channel {} failed: {}", channel_id, e);
                format!("❌ Backfill of <#{}> failed: {}", channel_id, e)
            }
        };
        if let Err(e) = reply_to.say(&http, text).await {
            error!("Failed to post the backfill report: {}", e);
        }
    });
    Ok(())
}

/// Remove the messages of channels that no longer exist
#[poise::command(slash_command, owners_only, guild_only)]
pub async fn sweep(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;
    let report = ctx.data().backfiller.sweep(&guild).await?;
    ctx.say(fit_message(&format_sweep(&report).join("\n"))).await?;
    Ok(())
}

/// Archived messages per channel
#[poise::command(slash_command, owners_only, guild_only)]
pub async fn channels(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;
    let stats = guild.db.run_blocking(|db| db.channel_stats()).await?;
    if stats.is_empty() {
        ctx.say("📭 Nothing archived yet.").await?;
        return Ok(());
    }

    let lines: Vec<String> = stats
        .iter()
        .map(|s| {
            let span = match (s.first_message, s.last_message) {
                (Some(first), Some(last)) => format!(
                    " ({} → {})",
                    first.format("%Y-%m-%d"),
                    last.format("%Y-%m-%d")
                ),
                _ => String::new(),
            };
            format!("<#{}>: {}{}", s.channel_id, s.count, span)
        })
        .collect();
    ctx.say(fit_message(&lines.join("\n"))).await?;
    Ok(())
}

/// Optimize the search index and compact every database
#[poise::command(slash_command, owners_only)]
pub async fn optimize(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let mut failures = Vec::new();
    for guild in ctx.data().registry.guilds() {
        info!("Optimizing database of guild {}...", guild.guild_id);
        if let Err(e) = guild.db.run_blocking(|db| db.optimize_database()).await {
            error!("Optimization of guild {} failed: {}", guild.guild_id, e);
            failures.push(format!("⚠️ {}: {}", guild.guild_id, e));
        }
    }
    if failures.is_empty() {
        ctx.say("✅ Databases optimized.").await?;
    } else {
        ctx.say(fit_message(&failures.join("\n"))).await?;
    }
    Ok(())
}

/// Rebuild the search index of every database
#[poise::command(slash_command, owners_only)]
pub async fn rebuild(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let mut failures = Vec::new();
    for guild in ctx.data().registry.guilds() {
        info!("Rebuilding search index of guild {}...", guild.guild_id);
        if let Err(e) = guild.db.run_blocking(|db| db.rebuild_index()).await {
            error!("Index rebuild of guild {} failed: {}", guild.guild_id, e);
            failures.push(format!("⚠️ {}: {}", guild.guild_id, e));
        }
    }
    if failures.is_empty() {
        ctx.say("✅ Search indexes rebuilt.").await?;
    } else {
        ctx.say(fit_message(&failures.join("\n"))).await?;
    }
    Ok(())
}

/// Recompute the daily message totals now
#[poise::command(slash_command, owners_only)]
pub async fn messageday(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let data = ctx.data();
    let refreshed = refresh_all(&data.registry, Utc::now().date_naive()).await;
    ctx.say(format!(
        "📅 Daily totals refreshed for {} of {} servers.",
        refreshed,
        data.registry.len()
    ))
    .await?;
    Ok(())
}

/// Refresh the external data feeds now
#[poise::command(slash_command, owners_only, rename = "feeds")]
pub async fn refresh_feeds(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let data = ctx.data();
    let outcome = |name: &str, result: anyhow::Result<()>| match result {
        Ok(()) => format!("✅ {} updated", name),
        Err(e) => format!("❌ {}: {}", name, e),
    };
    let lines = [
        outcome(data.ecowatt.name(), data.ecowatt.refresh().await),
        outcome(data.weather.name(), data.weather.refresh().await),
    ];
    ctx.say(lines.join("\n")).await?;
    Ok(())
}

fn format_rows(rows: &crate::db::DiagnosticRows) -> String {
    let mut text = String::from("```\n");
    text.push_str(&rows.columns.join(" | "));
    text.push('\n');
    for row in &rows.rows {
        text.push_str(&row.join(" | "));
        text.push('\n');
    }
    if rows.truncated {
        text.push_str(&format!("... (first {} rows)\n", rows.rows.len()));
    }
    text.push_str("```");
    text
}

/// Run a read-only SQL statement on this server's database
#[poise::command(slash_command, owners_only, guild_only)]
pub async fn sql(
    ctx: Context<'_>,
    #[description = "SELECT statement"] query: String,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer_ephemeral().await?;
    info!("SQL from {}: {}", ctx.author().name, query);

    let text = match guild
        .db
        .run_blocking(move |db| db.diagnostic_query(&query, SQL_MAX_ROWS))
        .await
    {
        Ok(rows) => {
            // Keep the closing fence when the table is too long
            let table = format_rows(&rows);
            if table.chars().count() > DISCORD_MESSAGE_LIMIT {
                let cut: String = table.chars().take(DISCORD_MESSAGE_LIMIT - 5).collect();
                format!("{}…\n```", cut)
            } else {
                table
            }
        }
        Err(e) => format!("❌ {}", e),
    };
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

/// Change the log filter, e.g. `debug` or `abeille=trace,serenity=warn`
#[poise::command(slash_command, owners_only, rename = "logging")]
pub async fn set_logging(
    ctx: Context<'_>,
    #[description = "Filter directive"] filter: String,
) -> Result<(), Error> {
    let control = &ctx.data().log_control;
    let content = match control.set_filter(&filter) {
        Ok(()) => {
            info!("Log filter set to '{}' by {}", filter, ctx.author().name);
            format!("📝 Log filter is now `{}`", control.current_filter())
        }
        Err(e) => format!("❌ {}", e),
    };
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Shut down the bot
#[poise::command(slash_command, owners_only)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from owner: {}", ctx.author().name);
    ctx.say("👋 Shutting down...").await?;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
