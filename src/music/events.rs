use super::{player, RepeatMode};
use crate::games::GameKind;
use crate::Data;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use tracing::{debug, error, info, warn};

/// Registers the per-guild track handlers on a freshly joined call.
pub fn attach(call: &mut Call, ctx: &serenity::Context, data: &Data, guild_id: serenity::GuildId) {
    call.add_global_event(
        Event::Track(TrackEvent::Play),
        TrackStartHandler {
            guild_id,
            ctx: ctx.clone(),
            data: data.clone(),
        },
    );
    call.add_global_event(
        Event::Track(TrackEvent::End),
        TrackEndHandler {
            guild_id,
            ctx: ctx.clone(),
            data: data.clone(),
        },
    );
}

/// Counts the play, resets the skip vote, applies track repeat and announces the song.
pub struct TrackStartHandler {
    guild_id: serenity::GuildId,
    ctx: serenity::Context,
    data: Data,
}

#[async_trait]
impl VoiceEventHandler for TrackStartHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        for (_, handle) in tracks.iter() {
            let started = self.data.music.existing(self.guild_id.get(), |s| {
                s.votes.reset();
                (s.tracks.get(&handle.uuid()).cloned(), s.repeat, s.text_channel)
            });
            let Some((Some(info), repeat, text_channel)) = started else {
                continue;
            };
            debug!("Music: now playing '{}' in guild {}", info.title, self.guild_id);

            if repeat == RepeatMode::Track {
                if let Err(e) = handle.enable_loop() {
                    warn!("Music: failed to loop track: {}", e);
                }
            }

            let gid = self.guild_id.to_string();
            let uid = info.requested_by.to_string();
            let recorded = self
                .data
                .db
                .run_blocking(move |db| {
                    db.add_user_stat(&gid, &uid, "songs_played", 1)?;
                    db.add_guild_stat(&gid, "songs_played", 1)
                })
                .await;
            if let Err(e) = recorded {
                error!("Music: failed to count play: {}", e);
            }

            // A quiz round must not reveal its title
            let quiz = self
                .data
                .games
                .is_running(self.guild_id.get(), GameKind::MusicQuiz);
            let announce = match self.data.settings.get(Some(self.guild_id), false).await {
                Ok(settings) => settings.music_announce && !quiz,
                Err(e) => {
                    warn!("Music: settings unavailable for announce: {}", e);
                    false
                }
            };
            if let (true, Some(channel)) = (announce, text_channel) {
                let mut embed = serenity::CreateEmbed::new()
                    .title("🎶 Now Playing")
                    .description(format!("[{}]({})", info.title, info.url))
                    .field("Requested by", format!("<@{}>", info.requested_by), true)
                    .color(crate::responses::COLOR_INFO);
                if let Some(duration) = info.duration {
                    embed = embed.field("Length", super::format_duration(duration), true);
                }
                if let Err(e) = channel
                    .send_message(&self.ctx.http, serenity::CreateMessage::new().embed(embed))
                    .await
                {
                    warn!("Music: failed to announce track: {}", e);
                }
            }
        }
        None
    }
}

/// Forgets finished tracks, or puts them back at the end of the queue in queue-repeat mode.
pub struct TrackEndHandler {
    guild_id: serenity::GuildId,
    ctx: serenity::Context,
    data: Data,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        for (_, handle) in tracks.iter() {
            let finished = self.data.music.existing(self.guild_id.get(), |s| {
                (s.tracks.remove(&handle.uuid()), s.repeat)
            });
            let Some((Some(info), repeat)) = finished else {
                continue;
            };

            if repeat == RepeatMode::Queue {
                info!("Music: re-queueing '{}' in guild {}", info.title, self.guild_id);
                if let Err(e) =
                    player::enqueue(&self.ctx, &self.data, self.guild_id, &info.url, info.requested_by).await
                {
                    warn!("Music: failed to re-queue '{}': {}", info.title, e);
                }
            }
        }
        None
    }
}
