use crate::music::player;
use crate::responses::{self, truncate, COLOR_INFO};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

const MAX_SONGS: usize = 100;

fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

async fn autocomplete_playlist<'a>(ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    let playlists = match ctx.guild_id() {
        Some(guild_id) => {
            let gid = guild_id.to_string();
            ctx.data()
                .db
                .run_blocking(move |db| db.list_playlists(&gid))
                .await
                .unwrap_or_default()
        }
        None => Vec::new(),
    };
    playlists
        .into_iter()
        .map(|p| p.name)
        .filter(move |name| name.starts_with(&normalize_name(partial)))
        .take(25)
}

/// Server playlists
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("create", "add", "show", "play", "delete"),
    guild_only,
    category = "Music"
)]
pub async fn playlist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create an empty playlist
#[poise::command(slash_command, prefix_command)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Playlist name"] name: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let name = normalize_name(&name);
    if name.is_empty() || name.chars().count() > 50 {
        return responses::send_error(&ctx, "Playlist names must be 1-50 characters.").await;
    }

    let (gid, uid, pname) = (guild_id.to_string(), ctx.author().id.to_string(), name.clone());
    let created = ctx
        .data()
        .db
        .run_blocking(move |db| {
            if db.get_playlist(&gid, &pname)?.is_some() {
                return Ok(false);
            }
            db.create_playlist(&gid, &uid, &pname)?;
            Ok(true)
        })
        .await?;
    if !created {
        return responses::send_error(&ctx, format!("A playlist named `{}` already exists.", name)).await;
    }
    info!("Playlist: '{}' created in guild {}", name, guild_id);
    responses::send_success(&ctx, format!("📃 Created playlist **{}**", name)).await
}

/// Add a song to a playlist
#[poise::command(slash_command, prefix_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Playlist name"]
    #[autocomplete = "autocomplete_playlist"]
    name: String,
    #[description = "URL or search terms"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let name = normalize_name(&name);
    ctx.defer().await?;

    let (gid, pname) = (guild_id.to_string(), name.clone());
    let Some(record) = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_playlist(&gid, &pname))
        .await?
    else {
        return responses::send_error(&ctx, format!("No playlist named `{}`.", name)).await;
    };

    let track = match player::resolve(ctx.data(), &query, ctx.author().id.get()).await {
        Ok((_, track)) => track,
        Err(e) => {
            warn!("Playlist: lookup of '{}' failed: {:#}", query, e);
            return responses::send_error(&ctx, format!("Couldn't find anything for `{}`.", truncate(&query, 100))).await;
        }
    };

    let (title, url) = (track.title.clone(), track.url.clone());
    let playlist_id = record.id;
    let added = ctx
        .data()
        .db
        .run_blocking(move |db| {
            if db.list_songs(playlist_id)?.len() >= MAX_SONGS {
                return Ok(None);
            }
            db.add_song(playlist_id, &title, &url).map(Some)
        })
        .await?;
    match added {
        Some(position) => {
            responses::send_success(
                &ctx,
                format!("➕ Added **{}** to **{}** (#{})", track.title, name, position),
            )
            .await
        }
        None => responses::send_error(&ctx, format!("Playlists hold at most {} songs.", MAX_SONGS)).await,
    }
}

/// List playlists, or the songs in one
#[poise::command(slash_command, prefix_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Playlist name"]
    #[autocomplete = "autocomplete_playlist"]
    name: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let gid = guild_id.to_string();

    let Some(name) = name.map(|n| normalize_name(&n)) else {
        let playlists = ctx
            .data()
            .db
            .run_blocking(move |db| db.list_playlists(&gid))
            .await?;
        let description = if playlists.is_empty() {
            "No playlists yet. Create one with `/playlist create`.".to_string()
        } else {
            playlists
                .iter()
                .map(|p| format!("• **{}** by <@{}>", p.name, p.user_id))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let embed = serenity::CreateEmbed::new()
            .title("📃 Playlists")
            .description(description)
            .color(COLOR_INFO);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    };

    let pname = name.clone();
    let found = ctx
        .data()
        .db
        .run_blocking(move |db| match db.get_playlist(&gid, &pname)? {
            Some(record) => Ok(Some((db.list_songs(record.id)?, record))),
            None => Ok(None),
        })
        .await?;
    let Some((songs, record)) = found else {
        return responses::send_error(&ctx, format!("No playlist named `{}`.", name)).await;
    };

    let content = if songs.is_empty() {
        "This playlist is empty.".to_string()
    } else {
        songs
            .iter()
            .map(|s| format!("`{}.` [{}]({})", s.position, truncate(&s.title, 70), s.url))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let title = format!("📃 {} · by {}", record.name, record.user_id);
    responses::send_long(&ctx, &title, &content).await
}

/// Queue every song of a playlist
#[poise::command(
    slash_command,
    prefix_command,
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Playlist name"]
    #[autocomplete = "autocomplete_playlist"]
    name: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let name = normalize_name(&name);
    let sctx = ctx.serenity_context();
    ctx.defer().await?;

    let (gid, pname) = (guild_id.to_string(), name.clone());
    let songs = ctx
        .data()
        .db
        .run_blocking(move |db| match db.get_playlist(&gid, &pname)? {
            Some(record) => db.list_songs(record.id).map(Some),
            None => Ok(None),
        })
        .await?;
    let Some(songs) = songs.filter(|s| !s.is_empty()) else {
        return responses::send_error(&ctx, format!("`{}` doesn't exist or is empty.", name)).await;
    };

    if player::bot_channel(sctx, guild_id).is_none() {
        let Some(channel_id) = player::user_channel(sctx, guild_id, ctx.author().id) else {
            return responses::send_error(&ctx, "You must be in a voice channel to use this command.").await;
        };
        player::join(sctx, ctx.data(), guild_id, channel_id, ctx.channel_id()).await?;
    }

    let mut queued = 0;
    for song in &songs {
        match player::enqueue(sctx, ctx.data(), guild_id, &song.url, ctx.author().id.get()).await {
            Ok(_) => queued += 1,
            Err(e) => warn!("Playlist: skipping '{}': {:#}", song.title, e),
        }
    }
    info!("Playlist: queued {}/{} from '{}' in guild {}", queued, songs.len(), name, guild_id);
    responses::send_success(
        &ctx,
        format!("🎶 Queued **{}/{}** song(s) from **{}**", queued, songs.len(), name),
    )
    .await
}

/// Delete a playlist you created
#[poise::command(slash_command, prefix_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Playlist name"]
    #[autocomplete = "autocomplete_playlist"]
    name: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let name = normalize_name(&name);
    let (gid, pname) = (guild_id.to_string(), name.clone());
    let Some(record) = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_playlist(&gid, &pname))
        .await?
    else {
        return responses::send_error(&ctx, format!("No playlist named `{}`.", name)).await;
    };

    let settings = super::guild_settings(ctx).await?;
    let is_owner = record.user_id == ctx.author().id.to_string();
    if !is_owner && !super::is_dj(ctx, &settings).await {
        return responses::send_error(&ctx, "Only the creator or a DJ can delete this playlist.").await;
    }

    let (gid, pname) = (guild_id.to_string(), name.clone());
    ctx.data()
        .db
        .run_blocking(move |db| db.delete_playlist(&gid, &pname))
        .await?;
    info!("Playlist: '{}' deleted in guild {} by {}", name, guild_id, ctx.author().id);
    responses::send_success(&ctx, format!("🗑️ Deleted playlist **{}**", name)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Raid Night "), "raid night");
        assert_eq!(normalize_name(""), "");
    }
}
