use abeille::backfill::{BackfillOptions, Backfiller};
use abeille::chart::PngChart;
use abeille::commands::{activity, admin, feeds, misc, privacy, random};
use abeille::feeds::{ecowatt::EcowattFeed, http_client, weather::WeatherFeed, FeedCache};
use abeille::hasher::IdentityHasher;
use abeille::ingest::Ingestor;
use abeille::messageday::MessageDayRefresher;
use abeille::source::{MessageSource, SerenitySource, SourceMessage};
use abeille::tracked::GuildRegistry;
use abeille::{config::Config, logging, Data, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {}", ctx.command().qualified_name, error);
            if let Err(e) = ctx.say("🐝 Something went wrong, sorry!").await {
                warn!("Could not report the error to the user: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn event_handler(
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    let ingestor = &data.ingestor;
    match event {
        serenity::FullEvent::Message { new_message } => {
            ingestor.on_created(&SourceMessage::from(new_message)).await?;
        }
        serenity::FullEvent::MessageUpdate { new, event, .. } => match new {
            Some(new) => {
                ingestor.on_edited(&SourceMessage::from(new)).await?;
            }
            None => {
                ingestor
                    .on_edited_partial(
                        data.source.as_ref(),
                        event.guild_id.map(|g| g.get()),
                        event.channel_id.get(),
                        event.id.get(),
                    )
                    .await?;
            }
        },
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id,
        } => {
            ingestor
                .on_deleted(
                    guild_id.map(|g| g.get()),
                    channel_id.get(),
                    deleted_message_id.get(),
                )
                .await?;
        }
        serenity::FullEvent::MessageDeleteBulk {
            channel_id,
            multiple_deleted_messages_ids,
            guild_id,
        } => {
            for id in multiple_deleted_messages_ids {
                ingestor
                    .on_deleted(guild_id.map(|g| g.get()), channel_id.get(), id.get())
                    .await?;
            }
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            ingestor
                .on_channel_deleted(Some(channel.guild_id.get()), channel.id.get())
                .await?;
        }
        serenity::FullEvent::ThreadDelete { thread, .. } => {
            ingestor
                .on_channel_deleted(Some(thread.guild_id.get()), thread.id.get())
                .await?;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_control = logging::init();

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let registry = Arc::new(GuildRegistry::load(&config.dbs_folder, &config.tracked_guilds));
    if registry.is_empty() {
        warn!("No guild is tracked, only feed commands will be useful");
    }

    let mut owners = HashSet::new();
    if let Some(owner_id) = config.owner_id {
        owners.insert(serenity::UserId::new(owner_id));
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                activity::trend(),
                activity::compare(),
                activity::rank(),
                activity::activity(),
                activity::search(),
                random::random(),
                privacy::register(),
                privacy::unregister(),
                privacy::export(),
                privacy::delete(),
                privacy::forget(),
                feeds::ecowatt(),
                feeds::weather(),
                misc::info(),
                misc::ping(),
                admin::admin(),
            ],
            owners,
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    // A failed write must not take the gateway handler down
                    if let Err(e) = event_handler(event, data).await {
                        error!("Failed to archive event {}: {}", event.snake_case_name(), e);
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);

                if config.register_commands {
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                &framework.options().commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?;
                            info!("Commands registered in guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, &framework.options().commands)
                                .await?;
                            info!("Commands registered globally");
                        }
                    }
                }

                let hasher = IdentityHasher::new(config.hash.clone());
                let source: Arc<dyn MessageSource> = Arc::new(SerenitySource::new(ctx.http.clone()));
                let backfiller = Arc::new(Backfiller::new(source.clone(), hasher.clone()));

                let http = http_client(config.http_timeout_secs);
                let ecowatt = Arc::new(FeedCache::new(EcowattFeed::new(
                    http.clone(),
                    config.ecowatt_token.clone(),
                )));
                let weather = Arc::new(FeedCache::new(WeatherFeed::new(
                    http,
                    config.weather_url.clone(),
                    config.weather_api_key.clone(),
                    config.weather_latitude,
                    config.weather_longitude,
                )));

                tokio::spawn(ecowatt.clone().run(config.ecowatt_interval));
                tokio::spawn(weather.clone().run(config.weather_interval));
                tokio::spawn(
                    MessageDayRefresher::new(registry.clone(), config.message_day_interval).run(),
                );

                if config.backfill_on_startup {
                    let registry = registry.clone();
                    let backfiller = backfiller.clone();
                    tokio::spawn(async move {
                        let options = BackfillOptions {
                            sweep: true,
                            ..Default::default()
                        };
                        for guild in registry.guilds() {
                            if let Err(e) = backfiller.backfill_guild(guild, &options).await {
                                error!("Startup backfill of guild {} failed: {}", guild.guild_id, e);
                            }
                        }
                    });
                }

                Ok(Data {
                    ingestor: Ingestor::new(registry.clone(), hasher.clone()),
                    registry,
                    hasher,
                    source,
                    backfiller,
                    chart: Arc::new(PngChart),
                    ecowatt,
                    weather,
                    log_control,
                    started_at: chrono::Utc::now(),
                    config,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
