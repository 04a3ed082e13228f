use super::tracked_guild;
use crate::chart::{caption, ChartMeta, Series};
use crate::error::validate_expression;
use crate::queries::DEFAULT_ROLLING_WINDOW;
use crate::services::activity::{ActivityService, Period};
use crate::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

const LEADERBOARD_SIZE: usize = 10;
const SEARCH_LINKS: usize = 5;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ChartPeriod {
    #[name = "Since the beginning"]
    All,
    #[name = "Last 6 months"]
    SixMonths,
    #[name = "Last year"]
    OneYear,
    #[name = "Last two years"]
    TwoYears,
    #[name = "Last three years"]
    ThreeYears,
}

impl From<ChartPeriod> for Period {
    fn from(p: ChartPeriod) -> Self {
        match p {
            ChartPeriod::All => Period::All,
            ChartPeriod::SixMonths => Period::Months(6),
            ChartPeriod::OneYear => Period::Months(12),
            ChartPeriod::TwoYears => Period::Months(24),
            ChartPeriod::ThreeYears => Period::Months(36),
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum Rolling {
    #[name = "14 days"]
    TwoWeeks,
    #[name = "7 days"]
    OneWeek,
    #[name = "None"]
    Daily,
}

impl Rolling {
    fn days(self) -> usize {
        match self {
            Rolling::TwoWeeks => DEFAULT_ROLLING_WINDOW,
            Rolling::OneWeek => 7,
            Rolling::Daily => 1,
        }
    }
}

/// Validates each expression, replying with the reason on the first bad one.
async fn checked_terms(ctx: Context<'_>, expressions: &[&str]) -> Result<Option<Vec<String>>, Error> {
    let mut terms = Vec::with_capacity(expressions.len());
    for expression in expressions {
        match validate_expression(expression) {
            Ok(term) => terms.push(term.to_string()),
            Err(e) => {
                ctx.send(
                    poise::CreateReply::default()
                        .content(e.user_message())
                        .ephemeral(true),
                )
                .await?;
                return Ok(None);
            }
        }
    }
    Ok(Some(terms))
}

async fn send_trend(
    ctx: Context<'_>,
    terms: Vec<String>,
    period: Option<ChartPeriod>,
    rolling: Option<Rolling>,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;

    let rolling = rolling.unwrap_or(Rolling::TwoWeeks);
    let service = ActivityService::new(guild, ctx.data().hasher.clone());
    let series: Option<Vec<Series>> = service
        .trend(
            &terms,
            period.map(Period::from).unwrap_or(Period::All),
            rolling.days(),
            Utc::now().date_naive(),
        )
        .await?;

    let Some(series) = series.filter(|s| s.iter().any(|s| !s.points.is_empty())) else {
        ctx.say("🐝 Not enough history yet to draw a trend.").await?;
        return Ok(());
    };

    let quoted: Vec<String> = terms.iter().map(|t| format!("\"{}\"", t)).collect();
    let meta = ChartMeta {
        title: format!("Trend of {}", quoted.join(" vs ")),
        y_label: format!("Share of messages ({}-day mean)", rolling.days()),
    };
    send_chart(ctx, "trend", &series, &meta).await
}

async fn send_chart(ctx: Context<'_>, name: &str, series: &[Series], meta: &ChartMeta) -> Result<(), Error> {
    let chart = ctx.data().chart.clone();
    let image = chart.render(series)?;
    let filename = format!("{}.{}", name, chart.extension());

    ctx.send(
        poise::CreateReply::default()
            .content(caption(series, meta))
            .attachment(serenity::CreateAttachment::bytes(image, filename))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

fn activity_title(channel: Option<&serenity::GuildChannel>) -> String {
    match channel {
        Some(channel) => format!("Messages per day in #{}", channel.name),
        None => "Messages per day".to_string(),
    }
}

/// Chart how many messages are sent per day
#[poise::command(slash_command, guild_only)]
pub async fn activity(
    ctx: Context<'_>,
    #[description = "Only this channel"] channel: Option<serenity::GuildChannel>,
    #[description = "Time span"] period: Option<ChartPeriod>,
    #[description = "Smoothing"] rolling: Option<Rolling>,
) -> Result<(), Error> {
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;

    let rolling = rolling.unwrap_or(Rolling::TwoWeeks);
    let service = ActivityService::new(guild, ctx.data().hasher.clone());
    let series = service
        .activity(
            channel.as_ref().map(|c| c.id.get() as i64),
            period.map(Period::from).unwrap_or(Period::All),
            rolling.days(),
            Utc::now().date_naive(),
        )
        .await?;

    let Some(series) = series.filter(|s| !s.points.is_empty()) else {
        ctx.say("🐝 Not enough history yet to draw the activity.").await?;
        return Ok(());
    };

    let meta = ChartMeta {
        title: activity_title(channel.as_ref()),
        y_label: format!("Messages ({}-day mean)", rolling.days()),
    };
    send_chart(ctx, "activity", &[series], &meta).await
}

/// Chart how often an expression is used over time
#[poise::command(slash_command, guild_only)]
pub async fn trend(
    ctx: Context<'_>,
    #[description = "Expression to look for"] expression: String,
    #[description = "Time span"] period: Option<ChartPeriod>,
    #[description = "Smoothing"] rolling: Option<Rolling>,
) -> Result<(), Error> {
    let Some(terms) = checked_terms(ctx, &[&expression]).await? else {
        return Ok(());
    };
    send_trend(ctx, terms, period, rolling).await
}

/// Compare how often two expressions are used over time
#[poise::command(slash_command, guild_only)]
pub async fn compare(
    ctx: Context<'_>,
    #[description = "First expression"] expression1: String,
    #[description = "Second expression"] expression2: String,
    #[description = "Time span"] period: Option<ChartPeriod>,
    #[description = "Smoothing"] rolling: Option<Rolling>,
) -> Result<(), Error> {
    let Some(terms) = checked_terms(ctx, &[&expression1, &expression2]).await? else {
        return Ok(());
    };
    send_trend(ctx, terms, period, rolling).await
}

/// Count the messages containing an expression and link the latest ones
#[poise::command(slash_command, guild_only)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Expression to look for"] expression: String,
) -> Result<(), Error> {
    let Some(terms) = checked_terms(ctx, &[&expression]).await? else {
        return Ok(());
    };
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;

    let guild_id = guild.guild_id;
    let service = ActivityService::new(guild, ctx.data().hasher.clone());
    let hits = service.search(&terms[0], SEARCH_LINKS).await?;
    if hits.total == 0 {
        ctx.say(format!("🐝 Nobody ever wrote \"{}\".", terms[0])).await?;
        return Ok(());
    }

    let mut lines = vec![format!(
        "🔎 **{}** messages contain \"{}\".",
        hits.total, terms[0]
    )];
    for message in &hits.latest {
        lines.push(format!(
            "<t:{}:D> {}",
            message.timestamp.timestamp(),
            super::message_link(guild_id, message.channel_id, message.message_id)
        ));
    }
    ctx.send(
        poise::CreateReply::default()
            .content(super::fit_message(&lines.join("\n")))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// See who uses an expression the most
#[poise::command(slash_command, guild_only)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "Expression to look for"] expression: String,
) -> Result<(), Error> {
    let Some(terms) = checked_terms(ctx, &[&expression]).await? else {
        return Ok(());
    };
    let Some(guild) = tracked_guild(ctx).await? else {
        return Ok(());
    };
    ctx.defer().await?;

    let service = ActivityService::new(guild, ctx.data().hasher.clone());
    let summary = service
        .rank(&terms[0], ctx.author().id.get(), LEADERBOARD_SIZE)
        .await?;

    if summary.leaderboard.is_empty() {
        ctx.say(format!("🐝 Nobody ever wrote \"{}\".", terms[0])).await?;
        return Ok(());
    }

    let mut lines = vec![format!("🏆 **\"{}\"**", terms[0])];
    let mut previous: Option<(i64, usize)> = None;
    for (i, row) in summary.leaderboard.iter().enumerate() {
        // Ties share the position of the first author with that count
        let position = match previous {
            Some((count, pos)) if count == row.count => pos,
            _ => i + 1,
        };
        previous = Some((row.count, position));
        let who = match row.real_author_id {
            Some(id) => format!("<@{}>", id),
            None => "*anonymous*".to_string(),
        };
        lines.push(format!("{}. {} ({})", position, who, row.count));
    }

    lines.push(match summary.own {
        Some(own) => format!(
            "\nYou are **#{}** out of {} with {} messages.",
            own.position, own.out_of, own.count
        ),
        None => "\nYou never wrote it.".to_string(),
    });

    ctx.send(
        poise::CreateReply::default()
            .content(super::fit_message(&lines.join("\n")))
            .allowed_mentions(serenity::CreateAllowedMentions::new().empty_users()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_periods() {
        assert_eq!(Period::from(ChartPeriod::All), Period::All);
        assert_eq!(Period::from(ChartPeriod::SixMonths), Period::Months(6));
        assert_eq!(Period::from(ChartPeriod::ThreeYears), Period::Months(36));
    }

    #[test]
    fn test_rolling_days() {
        assert_eq!(Rolling::TwoWeeks.days(), DEFAULT_ROLLING_WINDOW);
        assert_eq!(Rolling::Daily.days(), 1);
    }

    #[test]
    fn test_activity_title() {
        assert_eq!(activity_title(None), "Messages per day");
    }
}
