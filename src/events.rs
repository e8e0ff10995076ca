use crate::automod::{self, ModMessage};
use crate::music::player;
use crate::{games, leveling, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

pub async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                "{} is connected on shard {:?}",
                data_about_bot.user.name,
                data_about_bot.shard.map(|s| s.id.0)
            );
        }
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = on_message(ctx, data, new_message).await {
                error!("Message handling failed for {}: {:#}", new_message.id, e);
            }
        }
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            if let Err(e) = on_voice_state(ctx, data, old.as_ref(), new).await {
                error!("Voice state handling failed: {:#}", e);
            }
        }
        serenity::FullEvent::GuildMemberUpdate { event, .. } => {
            on_member_update(data, event).await;
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // An outage also sends GuildDelete, with `unavailable` set
            if !incomplete.unavailable {
                info!("Removed from guild {}", incomplete.id);
                data.settings.invalidate(incomplete.id);
                data.music.remove(incomplete.id.get());
            }
        }
        _ => {}
    }
    Ok(())
}

/// Whether `content` is addressed to the bot as a prefix or mention command.
pub fn is_command(content: &str, prefix: &str, bot_id: u64) -> bool {
    let content = content.trim_start();
    (!prefix.is_empty() && content.starts_with(prefix))
        || content.starts_with(&format!("<@{}>", bot_id))
        || content.starts_with(&format!("<@!{}>", bot_id))
}

async fn on_message(ctx: &serenity::Context, data: &Data, message: &serenity::Message) -> anyhow::Result<()> {
    if message.author.bot {
        return Ok(());
    }
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };

    if games::handle_message(ctx, data, message).await? {
        return Ok(());
    }

    let settings = data.settings.get(Some(guild_id), false).await?;

    if settings.automod.any_enabled() {
        let roles: Vec<u64> = message
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default();
        let candidate = ModMessage {
            guild_id: guild_id.get(),
            channel_id: message.channel_id.get(),
            author_id: message.author.id.get(),
            author_roles: &roles,
            content: &message.content,
            timestamp: message.timestamp.unix_timestamp(),
        };
        if let Some(verdict) = data.automod.evaluate(&settings.automod, &candidate) {
            automod::enforce(ctx, data, message, &settings, verdict).await;
            return Ok(());
        }
    }

    let bot_id = ctx.cache.current_user().id.get();
    if is_command(&message.content, &settings.prefix, bot_id) {
        return Ok(());
    }
    leveling::handle_message(ctx, data, message, &settings).await
}

/// Starts or cancels the idle-leave timer when the bot's channel empties or refills.
async fn on_voice_state(
    ctx: &serenity::Context,
    data: &Data,
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
) -> anyhow::Result<()> {
    let Some(guild_id) = new.guild_id else {
        return Ok(());
    };
    let bot_id = ctx.cache.current_user().id;

    if new.user_id == bot_id {
        if new.channel_id.is_none() {
            debug!("Music: disconnected from voice in guild {}", guild_id);
            data.music.remove(guild_id.get());
        }
        return Ok(());
    }

    let Some(bot_channel) = player::bot_channel(ctx, guild_id) else {
        return Ok(());
    };
    let touched = new.channel_id == Some(bot_channel)
        || old.and_then(|o| o.channel_id) == Some(bot_channel);
    if !touched || !data.music.exists(guild_id.get()) {
        return Ok(());
    }

    if player::listeners(ctx, guild_id, bot_channel) == 0 {
        player::schedule_idle_leave(ctx, data, guild_id).await?;
    } else if data.music.cancel_leave(guild_id.get()) {
        info!("Music: listener returned in guild {}, staying", guild_id);
    }
    Ok(())
}

/// Role changes in the premium guild may shrink a user's slot count.
async fn on_member_update(data: &Data, event: &serenity::GuildMemberUpdateEvent) {
    if Some(event.guild_id.get()) != data.config.premium_guild_id {
        return;
    }
    let roles: Vec<u64> = event.roles.iter().map(|r| r.get()).collect();
    match data.premium.sweep(event.user.id.get(), &roles).await {
        Ok(disabled) if !disabled.is_empty() => {
            warn!(
                "Premium: {} lost entitlement, disabled {} guild(s)",
                event.user.id,
                disabled.len()
            );
        }
        Ok(_) => {}
        Err(e) => error!("Premium: sweep failed for {}: {}", event.user.id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_command() {
        assert!(is_command("!rank", "!", 5));
        assert!(is_command("  !rank", "!", 5));
        assert!(is_command("<@5> help", "!", 5));
        assert!(is_command("<@!5> help", "!", 5));
        assert!(!is_command("hello there", "!", 5));
        assert!(!is_command("<@6> hi", "!", 5));
        assert!(!is_command("anything", "", 5));
    }
}
