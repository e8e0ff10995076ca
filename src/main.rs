use bahamut::api::{self, ApiState};
use bahamut::commands;
use bahamut::config::Config;
use bahamut::db::Database;
use bahamut::responses::{error_embed, GENERIC_ERROR};
use bahamut::{events, Data, Error};
use poise::serenity_prelude as serenity;
use songbird::serenity::SerenityInit;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().qualified_name, error);
            let reply = poise::CreateReply::default()
                .embed(error_embed(GENERIC_ERROR))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                warn!("Failed to report command error: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Writes every invocation to the command log.
async fn log_command(ctx: poise::Context<'_, Data, Error>) {
    let command = ctx.command().qualified_name.clone();
    info!("{} ran `{}`", ctx.author().id, command);

    let guild_id = ctx.guild_id().map(|g| g.to_string());
    let user_id = ctx.author().id.to_string();
    let channel_id = ctx.channel_id().to_string();
    let args = ctx.invocation_string();
    let logged = ctx
        .data()
        .db
        .run_blocking(move |db| db.log_command(guild_id.as_deref(), &user_id, &channel_id, &command, &args))
        .await;
    if let Err(e) = logged {
        error!("Failed to write command log: {}", e);
    }
}

async fn guild_prefix(ctx: poise::PartialContext<'_, Data, Error>) -> Result<Option<String>, Error> {
    let settings = ctx.data.settings.get(ctx.guild_id, false).await?;
    Ok(Some(settings.prefix.clone()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();
    let shard_count = config.shard_count;
    let owners: HashSet<serenity::UserId> = config.owner_id.map(serenity::UserId::new).into_iter().collect();

    let db = Database::new(&config)?;
    db.execute_init()?;
    info!("Database ready at {}", config.database_url);
    let data = Data::new(config, db);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all_commands(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(data.config.default_prefix.clone()),
                dynamic_prefix: Some(|ctx| Box::pin(guild_prefix(ctx))),
                mention_as_prefix: true,
                edit_tracker: Some(std::sync::Arc::new(poise::EditTracker::for_timespan(
                    Duration::from_secs(600),
                ))),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            pre_command: |ctx| Box::pin(log_command(ctx)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::handle_event(ctx, event, framework, data))
            },
            owners,
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                let config = data.config.clone();
                let commands = &framework.options().commands;
                match config.dev_guild_id {
                    Some(guild) => {
                        poise::builtins::register_in_guild(ctx, commands, serenity::GuildId::new(guild)).await?;
                        info!("Registered {} commands in dev guild {}", commands.len(), guild);
                    }
                    None if config.register_commands => {
                        poise::builtins::register_globally(ctx, commands).await?;
                        info!("Registered {} commands globally", commands.len());
                    }
                    None => {}
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                if config.api_enabled {
                    let state = ApiState {
                        ctx: ctx.clone(),
                        shard_manager: framework.shard_manager().clone(),
                        data: data.clone(),
                    };
                    tokio::spawn(async move {
                        if let Err(e) = api::serve(state).await {
                            error!("API server stopped: {:#}", e);
                        }
                    });
                }
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .register_songbird()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let started = match shard_count {
        Some(count) => {
            info!("Starting {} shard(s)...", count);
            client.start_shards(count).await
        }
        None => {
            info!("Starting with recommended shard count...");
            client.start_autosharded().await
        }
    };
    if let Err(why) = started {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
