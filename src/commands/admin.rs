use crate::music::player;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

/// Leave every voice channel, then stop all shards (Owner only)
#[poise::command(slash_command, prefix_command, owners_only, hide_in_help, category = "Admin")]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Admin: shutdown requested by {} ({})", ctx.author().name, ctx.author().id);
    ctx.say("👋 Shutting down...").await?;

    let sessions = ctx.data().music.guilds();
    for guild in &sessions {
        if let Err(e) = player::leave(ctx.serenity_context(), ctx.data(), serenity::GuildId::new(*guild)).await {
            warn!("Admin: failed to leave voice in guild {}: {:#}", guild, e);
        }
    }
    info!("Admin: closed {} music session(s), stopping shards", sessions.len());
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

/// Register or unregister application commands (Owner only)
#[poise::command(prefix_command, owners_only, hide_in_help, category = "Admin")]
pub async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}
