use crate::music::{format_duration, parse_position, player, RepeatMode, VoteOutcome};
use crate::responses::{self, truncate, COLOR_INFO, COLOR_SUCCESS};
use crate::settings::keys::{SettingKey, SettingValue};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::ChoiceParameter;
use rand::seq::SliceRandom;
use songbird::Call;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const NOT_CONNECTED: &str = "I'm not in a voice channel.";
const NOTHING_PLAYING: &str = "Nothing is playing right now.";

async fn current_call(ctx: Context<'_>) -> Result<Option<Arc<Mutex<Call>>>, Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let manager = player::manager(ctx.serenity_context()).await?;
    Ok(manager.get(guild_id))
}

/// Whether the author sits in the same voice channel as the bot.
fn with_bot(ctx: Context<'_>, guild_id: serenity::GuildId) -> bool {
    let sctx = ctx.serenity_context();
    match (
        player::user_channel(sctx, guild_id, ctx.author().id),
        player::bot_channel(sctx, guild_id),
    ) {
        (Some(user), Some(bot)) => user == bot,
        _ => false,
    }
}

/// Join your voice channel
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    category = "Music",
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn join(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(channel_id) = player::user_channel(ctx.serenity_context(), guild_id, ctx.author().id) else {
        return responses::send_error(&ctx, "You must be in a voice channel to use this command.").await;
    };

    player::join(ctx.serenity_context(), ctx.data(), guild_id, channel_id, ctx.channel_id()).await?;
    ctx.say(format!("🔊 Joined <#{}>", channel_id)).await?;
    Ok(())
}

/// Play a song from a URL or a search
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("p"),
    category = "Music",
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search terms"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let sctx = ctx.serenity_context();
    ctx.defer().await?;

    if player::bot_channel(sctx, guild_id).is_none() || current_call(ctx).await?.is_none() {
        let Some(channel_id) = player::user_channel(sctx, guild_id, ctx.author().id) else {
            return responses::send_error(&ctx, "You must be in a voice channel to use this command.").await;
        };
        player::join(sctx, ctx.data(), guild_id, channel_id, ctx.channel_id()).await?;
    }

    let (track, position) =
        match player::enqueue(sctx, ctx.data(), guild_id, &query, ctx.author().id.get()).await {
            Ok(queued) => queued,
            Err(e) => {
                warn!("Music: could not queue '{}' in guild {}: {:#}", query, guild_id, e);
                return responses::send_error(&ctx, format!("Couldn't play anything for `{}`.", truncate(&query, 100))).await;
            }
        };

    let title = if position <= 1 { "🎶 Now Playing" } else { "🎵 Added to Queue" };
    let mut embed = serenity::CreateEmbed::new()
        .title(title)
        .description(format!("[{}]({})", truncate(&track.title, 200), track.url))
        .color(COLOR_SUCCESS);
    if let Some(duration) = track.duration {
        embed = embed.field("Length", format_duration(duration), true);
    }
    if position > 1 {
        embed = embed.field("Position", position.to_string(), true);
    }
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Vote to skip the current song
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn skip(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let Some(current) = call.lock().await.queue().current() else {
        return responses::send_error(&ctx, NOTHING_PLAYING).await;
    };

    let settings = super::guild_settings(ctx).await?;
    if super::is_dj(ctx, &settings).await {
        call.lock().await.queue().skip()?;
        ctx.say("⏭️ Skipped.").await?;
        return Ok(());
    }
    if !with_bot(ctx, guild_id) {
        return responses::send_error(&ctx, "You must be listening to vote.").await;
    }

    let sctx = ctx.serenity_context();
    let listeners = player::bot_channel(sctx, guild_id)
        .map(|channel| player::listeners(sctx, guild_id, channel))
        .unwrap_or(0);
    let outcome = ctx.data().music.with_session(guild_id.get(), |s| {
        s.votes.vote(current.uuid(), ctx.author().id.get(), listeners)
    });

    match outcome {
        VoteOutcome::Passed { votes, needed } => {
            call.lock().await.queue().skip()?;
            info!("Music: vote skip passed in guild {} ({}/{})", guild_id, votes, needed);
            ctx.say(format!("⏭️ Vote passed ({}/{}), skipped.", votes, needed)).await?;
        }
        VoteOutcome::Recorded { votes, needed } => {
            ctx.say(format!("🗳️ Skip vote recorded: **{}/{}**", votes, needed)).await?;
        }
        VoteOutcome::AlreadyVoted { votes, needed } => {
            responses::send_error(&ctx, format!("You already voted ({}/{}).", votes, needed)).await?;
        }
    }
    Ok(())
}

/// Skip the current song without a vote
#[poise::command(slash_command, prefix_command, guild_only, aliases("fs"), category = "Music")]
pub async fn forceskip(ctx: Context<'_>) -> Result<(), Error> {
    let settings = super::guild_settings(ctx).await?;
    if !super::is_dj(ctx, &settings).await {
        return responses::send_error(&ctx, "Only DJs can force skip.").await;
    }
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let handler = call.lock().await;
    if handler.queue().is_empty() {
        drop(handler);
        return responses::send_error(&ctx, NOTHING_PLAYING).await;
    }
    handler.queue().skip()?;
    drop(handler);
    ctx.say("⏭️ Force skipped.").await?;
    Ok(())
}

/// Pause playback
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let paused = call.lock().await.queue().pause();
    match paused {
        Ok(()) => {
            ctx.say("⏸️ Paused.").await?;
            Ok(())
        }
        Err(e) => {
            warn!("Music: pause failed: {}", e);
            responses::send_error(&ctx, NOTHING_PLAYING).await
        }
    }
}

/// Resume playback
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let resumed = call.lock().await.queue().resume();
    match resumed {
        Ok(()) => {
            ctx.say("▶️ Resumed.").await?;
            Ok(())
        }
        Err(e) => {
            warn!("Music: resume failed: {}", e);
            responses::send_error(&ctx, NOTHING_PLAYING).await
        }
    }
}

/// Stop playback and clear the queue
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    ctx.data().music.existing(guild_id.get(), |s| {
        s.repeat = RepeatMode::Off;
        s.votes.reset();
    });
    call.lock().await.queue().stop();
    ctx.say("⏹️ Stopped and cleared the queue.").await?;
    Ok(())
}

/// Leave the voice channel
#[poise::command(slash_command, prefix_command, guild_only, aliases("disconnect"), category = "Music")]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if player::leave(ctx.serenity_context(), ctx.data(), guild_id).await? {
        ctx.say("👋 Left the voice channel.").await?;
        Ok(())
    } else {
        responses::send_error(&ctx, NOT_CONNECTED).await
    }
}

/// Show the queue
#[poise::command(slash_command, prefix_command, guild_only, aliases("q"), category = "Music")]
pub async fn queue(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let handles = call.lock().await.queue().current_queue();
    if handles.is_empty() {
        ctx.say("📭 The queue is empty.").await?;
        return Ok(());
    }

    let music = &ctx.data().music;
    let mut total = std::time::Duration::ZERO;
    let mut lines = Vec::new();
    for (i, handle) in handles.iter().enumerate() {
        let Some(track) = music.track(guild_id.get(), handle.uuid()) else {
            continue;
        };
        total += track.duration.unwrap_or_default();
        if i < 10 {
            let marker = if i == 0 { "▶️".to_string() } else { format!("`{}.`", i) };
            let length = track.duration.map(format_duration).unwrap_or_else(|| "?".into());
            lines.push(format!(
                "{} [{}]({}) `{}` · <@{}>",
                marker,
                truncate(&track.title, 60),
                track.url,
                length,
                track.requested_by
            ));
        }
    }
    if handles.len() > 10 {
        lines.push(format!("…and {} more", handles.len() - 10));
    }

    let repeat = music
        .existing(guild_id.get(), |s| s.repeat)
        .unwrap_or_default();
    let embed = serenity::CreateEmbed::new()
        .title("🎶 Queue")
        .description(lines.join("\n"))
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} track(s) · {} total · repeat: {}",
            handles.len(),
            format_duration(total),
            repeat.name()
        )))
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the current song
#[poise::command(slash_command, prefix_command, guild_only, aliases("np"), category = "Music")]
pub async fn nowplaying(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let current = call.lock().await.queue().current();
    let Some((handle, track)) = current.and_then(|h| {
        let track = ctx.data().music.track(guild_id.get(), h.uuid())?;
        Some((h, track))
    }) else {
        return responses::send_error(&ctx, NOTHING_PLAYING).await;
    };

    let position = handle.get_info().await.map(|state| state.position).unwrap_or_default();
    let progress = match track.duration {
        Some(length) => format!("`{} / {}`", format_duration(position), format_duration(length)),
        None => format!("`{}`", format_duration(position)),
    };
    let embed = serenity::CreateEmbed::new()
        .title("🎶 Now Playing")
        .description(format!("[{}]({})\n{}", track.title, track.url, progress))
        .field("Requested by", format!("<@{}>", track.requested_by), true)
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Repeat the current song or the whole queue
#[poise::command(slash_command, prefix_command, guild_only, aliases("loop"), category = "Music")]
pub async fn repeat(
    ctx: Context<'_>,
    #[description = "Repeat mode"] mode: RepeatMode,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    ctx.data().music.with_session(guild_id.get(), |s| s.repeat = mode);

    if let Some(current) = call.lock().await.queue().current() {
        let looped = if mode == RepeatMode::Track {
            current.enable_loop()
        } else {
            current.disable_loop()
        };
        if let Err(e) = looped {
            warn!("Music: failed to change loop state: {}", e);
        }
    }
    let emoji = match mode {
        RepeatMode::Off => "➡️",
        RepeatMode::Track => "🔂",
        RepeatMode::Queue => "🔁",
    };
    ctx.say(format!("{} Repeat: **{}**", emoji, mode.name())).await?;
    Ok(())
}

/// Jump to a position in the current song
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn seek(
    ctx: Context<'_>,
    #[description = "Position, e.g. 90, 1:30 or 1m30s"] position: String,
) -> Result<(), Error> {
    let Some(target) = parse_position(&position) else {
        return responses::send_error(&ctx, format!("`{}` is not a valid position.", position)).await;
    };
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let Some(current) = call.lock().await.queue().current() else {
        return responses::send_error(&ctx, NOTHING_PLAYING).await;
    };

    match current.seek(target).result_async().await {
        Ok(reached) => {
            ctx.say(format!("⏩ Jumped to `{}`", format_duration(reached))).await?;
            Ok(())
        }
        Err(e) => {
            warn!("Music: seek failed: {}", e);
            responses::send_error(&ctx, "This track can't be seeked.").await
        }
    }
}

/// Show or change the volume (0-200)
#[poise::command(slash_command, prefix_command, guild_only, aliases("vol"), category = "Music")]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "New volume"]
    #[min = 0]
    #[max = 200]
    level: Option<u8>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(level) = level else {
        let settings = super::guild_settings(ctx).await?;
        ctx.say(format!("🔊 Volume is **{}%**", settings.music_volume)).await?;
        return Ok(());
    };
    if level > 200 {
        return responses::send_error(&ctx, "Volume must be between 0 and 200.").await;
    }
    let settings = super::guild_settings(ctx).await?;
    if !super::is_dj(ctx, &settings).await {
        return responses::send_error(&ctx, "Only DJs can change the volume.").await;
    }

    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::MusicVolume, SettingValue::Number(i64::from(level)))
        .await?;
    if let Some(call) = current_call(ctx).await? {
        for handle in call.lock().await.queue().current_queue() {
            if let Err(e) = handle.set_volume(f32::from(level) / 100.0) {
                warn!("Music: failed to set volume: {}", e);
            }
        }
    }
    ctx.say(format!("🔊 Volume set to **{}%**", level)).await?;
    Ok(())
}

/// Shuffle the upcoming songs
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn shuffle(ctx: Context<'_>) -> Result<(), Error> {
    let Some(call) = current_call(ctx).await? else {
        return responses::send_error(&ctx, NOT_CONNECTED).await;
    };
    let shuffled = call.lock().await.queue().modify_queue(|queue| {
        let upcoming = queue.len().saturating_sub(1);
        if upcoming > 1 {
            // Index 0 is the playing track
            queue.make_contiguous()[1..].shuffle(&mut rand::thread_rng());
        }
        upcoming
    });
    if shuffled < 2 {
        return responses::send_error(&ctx, "Not enough songs in the queue to shuffle.").await;
    }
    ctx.say(format!("🔀 Shuffled {} songs.", shuffled)).await?;
    Ok(())
}
