use crate::db::LinkedCharacter;
use crate::ffxiv::{CharacterProfile, FfxivError};
use crate::responses::{self, COLOR_INFO, GENERIC_ERROR};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

async fn report(ctx: Context<'_>, error: FfxivError) -> Result<(), Error> {
    match error {
        FfxivError::NotFound(what) => responses::send_error(&ctx, format!("Nothing found for `{}`.", what)).await,
        other => {
            error!("FFXIV: lookup failed: {}", other);
            responses::send_error(&ctx, GENERIC_ERROR).await
        }
    }
}

fn profile_embed(ctx: Context<'_>, profile: &CharacterProfile) -> serenity::CreateEmbed {
    let xivapi = &ctx.data().xivapi;
    let server = match &profile.data_center {
        Some(dc) => format!("{} ({})", profile.server, dc),
        None => profile.server.clone(),
    };
    let mut embed = serenity::CreateEmbed::new()
        .title(&profile.name)
        .url(format!("https://na.finalfantasyxiv.com/lodestone/character/{}/", profile.id))
        .field("Server", server, true)
        .field("Jobs at 90+", profile.high_level_jobs().to_string(), true)
        .color(COLOR_INFO);
    if let Some((job, level)) = profile.active_job() {
        embed = embed.field("Active job", format!("{} · level {}", job, level), true);
    }
    if let Some(fc) = profile.free_company_name.as_deref().filter(|fc| !fc.is_empty()) {
        embed = embed.field("Free Company", fc, true);
    }
    if let Some(portrait) = &profile.portrait {
        embed = embed.image(xivapi.asset_url(portrait));
    }
    embed
}

/// Final Fantasy XIV lookups
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("character", "link", "unlink", "me", "item"),
    category = "FFXIV"
)]
pub async fn ffxiv(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Look up a character
#[poise::command(slash_command, prefix_command)]
pub async fn character(
    ctx: Context<'_>,
    #[description = "Home world"] server: String,
    #[description = "Character name"]
    #[rest]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let xivapi = &ctx.data().xivapi;
    let found = match xivapi.search_character(name.trim(), server.trim()).await {
        Ok(found) => found,
        Err(e) => return report(ctx, e).await,
    };
    match xivapi.character(found.id).await {
        Ok(profile) => {
            ctx.send(poise::CreateReply::default().embed(profile_embed(ctx, &profile)))
                .await?;
            Ok(())
        }
        Err(e) => report(ctx, e).await,
    }
}

/// Link your character on this server
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn link(
    ctx: Context<'_>,
    #[description = "Home world"] server: String,
    #[description = "Character name"]
    #[rest]
    name: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;
    let found = match ctx.data().xivapi.search_character(name.trim(), server.trim()).await {
        Ok(found) => found,
        Err(e) => return report(ctx, e).await,
    };

    let linked = LinkedCharacter {
        character_id: found.id,
        name: found.name.clone(),
        server: found.server.clone(),
    };
    let (gid, uid) = (guild_id.to_string(), ctx.author().id.to_string());
    ctx.data()
        .db
        .run_blocking(move |db| db.link_character(&gid, &uid, &linked))
        .await?;
    info!("FFXIV: {} linked {} ({}) in guild {}", ctx.author().id, found.name, found.id, guild_id);
    responses::send_success(&ctx, format!("🔗 Linked **{}** @ {}", found.name, found.server)).await
}

/// Remove your linked character
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn unlink(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let (gid, uid) = (guild_id.to_string(), ctx.author().id.to_string());
    let removed = ctx
        .data()
        .db
        .run_blocking(move |db| db.unlink_character(&gid, &uid))
        .await?;
    if removed == 0 {
        return responses::send_error(&ctx, "You have no linked character.").await;
    }
    responses::send_success(&ctx, "Character unlinked.").await
}

/// Show your (or someone's) linked character
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn me(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let (gid, uid) = (guild_id.to_string(), user.id.to_string());
    let Some(linked) = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_character(&gid, &uid))
        .await?
    else {
        return responses::send_error(&ctx, "No character linked. Use `/ffxiv link` first.").await;
    };

    ctx.defer().await?;
    match ctx.data().xivapi.character(linked.character_id).await {
        Ok(profile) => {
            ctx.send(poise::CreateReply::default().embed(profile_embed(ctx, &profile)))
                .await?;
            Ok(())
        }
        Err(e) => report(ctx, e).await,
    }
}

/// Search for an item
#[poise::command(slash_command, prefix_command)]
pub async fn item(
    ctx: Context<'_>,
    #[description = "Item name"]
    #[rest]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let xivapi = &ctx.data().xivapi;
    let items = match xivapi.search_item(name.trim()).await {
        Ok(items) => items,
        Err(e) => return report(ctx, e).await,
    };

    let Some(first) = items.first() else {
        return responses::send_error(&ctx, format!("Nothing found for `{}`.", name)).await;
    };
    let others: Vec<String> = items.iter().skip(1).map(|i| format!("• {}", i.name)).collect();
    let mut embed = serenity::CreateEmbed::new()
        .title(&first.name)
        .url(format!("https://garlandtools.org/db/#item/{}", first.id))
        .field("Item ID", first.id.to_string(), true)
        .color(COLOR_INFO);
    if let Some(icon) = &first.icon {
        embed = embed.thumbnail(xivapi.asset_url(icon));
    }
    if !others.is_empty() {
        embed = embed.field("Other matches", others.join("\n"), false);
    }
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
