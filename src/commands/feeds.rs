use crate::feeds::ecowatt::{level_icon, level_message, Signal};
use crate::feeds::weather::{WeatherAnomaly, BASELINE_DAYS};
use crate::{Context, Error};

fn format_signals(signals: &[Signal]) -> String {
    let Some(today) = signals.first() else {
        return "⚪ No forecast was published.".to_string();
    };
    let mut lines = vec![
        format!("{} **{}**", level_icon(today.value), today.date()),
        level_message(today.value).to_string(),
    ];

    // Hours above the normal level
    let strained: Vec<String> = today
        .values
        .iter()
        .filter(|h| h.value > 1)
        .map(|h| format!("{}h {}", h.hour, level_icon(h.value)))
        .collect();
    if !strained.is_empty() {
        lines.push(format!("Hours to watch: {}", strained.join(", ")));
    }

    if signals.len() > 1 {
        lines.push(String::new());
        for signal in &signals[1..] {
            lines.push(format!("{} {}", level_icon(signal.value), signal.date()));
        }
    }
    lines.join("\n")
}

fn format_anomaly(anomaly: &WeatherAnomaly) -> String {
    let icon = match anomaly.anomaly {
        a if a >= 5.0 => "🥵",
        a if a >= 1.0 => "☀️",
        a if a <= -5.0 => "🥶",
        a if a <= -1.0 => "🌧️",
        _ => "🌤️",
    };
    format!(
        "{} **{}**: {:.1}°C on average, {:+.1}°C against the last {} days ({:.1}°C).",
        icon, anomaly.date, anomaly.today_mean, anomaly.anomaly, BASELINE_DAYS, anomaly.baseline_mean
    )
}

/// Power grid forecast from RTE Ecowatt
#[poise::command(slash_command)]
pub async fn ecowatt(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    match ctx.data().ecowatt.latest_or_refresh().await {
        Some(cached) => ctx.say(format_signals(&cached.value)).await?,
        None => ctx.say("⚪ The Ecowatt forecast is unavailable right now.").await?,
    };
    Ok(())
}

/// How today's temperature compares to the last weeks
#[poise::command(slash_command)]
pub async fn weather(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    match ctx.data().weather.latest_or_refresh().await {
        Some(cached) => ctx.say(format_anomaly(&cached.value)).await?,
        None => ctx.say("🌫️ Weather data is unavailable right now.").await?,
    };
    Ok(())
}
