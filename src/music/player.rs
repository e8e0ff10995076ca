use super::{events, TrackInfo};
use crate::Data;
use anyhow::{anyhow, Context as _};
use poise::serenity_prelude as serenity;
use songbird::input::{Compose, YoutubeDl};
use songbird::Songbird;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn manager(ctx: &serenity::Context) -> anyhow::Result<Arc<Songbird>> {
    songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow!("Songbird Voice client not initialized"))
}

/// Voice channel the user is currently in, from the guild cache.
pub fn user_channel(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> Option<serenity::ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id)
}

pub fn bot_channel(ctx: &serenity::Context, guild_id: serenity::GuildId) -> Option<serenity::ChannelId> {
    user_channel(ctx, guild_id, ctx.cache.current_user().id)
}

/// Non-bot members connected to `channel_id`.
pub fn listeners(ctx: &serenity::Context, guild_id: serenity::GuildId, channel_id: serenity::ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };
    guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(channel_id))
        .filter(|vs| {
            vs.member
                .as_ref()
                .map(|m| !m.user.bot)
                .or_else(|| guild.members.get(&vs.user_id).map(|m| !m.user.bot))
                .unwrap_or(true)
        })
        .count()
}

/// Joins `channel_id`, attaching the track event handlers the first time.
pub async fn join(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    text_channel: serenity::ChannelId,
) -> anyhow::Result<()> {
    let manager = manager(ctx).await?;
    let call = manager
        .join(guild_id, channel_id)
        .await
        .with_context(|| format!("failed to join voice channel {}", channel_id))?;

    let first = data.music.with_session(guild_id.get(), |s| {
        s.text_channel = Some(text_channel);
        s.cancel_leave();
        !std::mem::replace(&mut s.attached, true)
    });
    if first {
        let mut handler = call.lock().await;
        events::attach(&mut handler, ctx, data, guild_id);
        info!("Music: joined channel {} in guild {}", channel_id, guild_id);
    }
    Ok(())
}

/// Looks up `query` (URL or search terms) without playing it.
pub async fn resolve(data: &Data, query: &str, requested_by: u64) -> anyhow::Result<(YoutubeDl<'static>, TrackInfo)> {
    let mut source = if query.starts_with("http://") || query.starts_with("https://") {
        YoutubeDl::new(data.http_client.clone(), query.to_string())
    } else {
        YoutubeDl::new_search(data.http_client.clone(), query.to_string())
    };
    let metadata = source
        .aux_metadata()
        .await
        .with_context(|| format!("no playable result for {}", query))?;
    let info = TrackInfo {
        title: metadata.title.unwrap_or_else(|| query.to_string()),
        url: metadata.source_url.unwrap_or_else(|| query.to_string()),
        duration: metadata.duration,
        requested_by,
    };
    Ok((source, info))
}

/// Resolves `query` and appends it to the guild queue.
/// Returns the track info and its queue position (1 = playing now).
pub async fn enqueue(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
    query: &str,
    requested_by: u64,
) -> anyhow::Result<(TrackInfo, usize)> {
    let manager = manager(ctx).await?;
    let call = manager
        .get(guild_id)
        .ok_or_else(|| anyhow!("not connected to voice in guild {}", guild_id))?;

    let (source, info) = resolve(data, query, requested_by).await?;

    let settings = data.settings.get(Some(guild_id), false).await?;
    let mut handler = call.lock().await;
    let handle = handler.enqueue_input(source.into()).await;
    if let Err(e) = handle.set_volume(f32::from(settings.music_volume) / 100.0) {
        warn!("Music: failed to set volume on new track: {}", e);
    }
    let position = handler.queue().len();
    drop(handler);

    data.music
        .with_session(guild_id.get(), |s| s.tracks.insert(handle.uuid(), info.clone()));
    Ok((info, position))
}

pub async fn leave(ctx: &serenity::Context, data: &Data, guild_id: serenity::GuildId) -> anyhow::Result<bool> {
    let manager = manager(ctx).await?;
    let Some(call) = manager.get(guild_id) else {
        data.music.remove(guild_id.get());
        return Ok(false);
    };
    // Ending tracks must not be re-enqueued by queue repeat
    data.music
        .existing(guild_id.get(), |s| s.repeat = super::RepeatMode::Off);
    call.lock().await.queue().stop();
    manager.remove(guild_id).await?;
    // Last, since dropping the session aborts a pending idle timer (possibly the caller)
    data.music.remove(guild_id.get());
    info!("Music: left voice in guild {}", guild_id);
    Ok(true)
}

/// Leaves once the bot's channel has no listeners: after the configured delay on
/// premium guilds, at once otherwise. Rejoining listeners cancel the timer.
pub async fn schedule_idle_leave(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
) -> anyhow::Result<()> {
    let settings = data.settings.get(Some(guild_id), false).await?;
    if !settings.is_premium() {
        info!("Music: channel empty in guild {}, leaving", guild_id);
        leave(ctx, data, guild_id).await?;
        return Ok(());
    }

    let delay = Duration::from_secs(data.config.premium_idle_leave_secs);
    info!(
        "Music: channel empty in guild {}, leaving in {}s unless someone returns",
        guild_id,
        delay.as_secs()
    );
    let ctx = ctx.clone();
    let data_task = data.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let still_empty = bot_channel(&ctx, guild_id)
            .map(|channel| listeners(&ctx, guild_id, channel) == 0)
            .unwrap_or(true);
        if still_empty {
            if let Err(e) = leave(&ctx, &data_task, guild_id).await {
                warn!("Music: idle leave failed in guild {}: {}", guild_id, e);
            }
        }
    });
    data.music.set_leave_timer(guild_id.get(), timer);
    Ok(())
}
