use crate::responses::COLOR_INFO;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::Instant;

/// Check that the bot is responsive
#[poise::command(slash_command, prefix_command, category = "Utility")]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let started = Instant::now();
    let reply = ctx.say("🏓 Pong!").await?;
    let rest = started.elapsed();
    let gateway = ctx.ping().await;
    reply
        .edit(
            ctx,
            poise::CreateReply::default().content(format!(
                "🏓 Pong! Gateway `{}ms` · API `{}ms`",
                gateway.as_millis(),
                rest.as_millis()
            )),
        )
        .await?;
    Ok(())
}

/// Show someone's avatar
#[poise::command(slash_command, prefix_command, aliases("av"), category = "Utility")]
pub async fn avatar(
    ctx: Context<'_>,
    #[description = "Whose avatar"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let embed = serenity::CreateEmbed::new()
        .title(format!("{}'s avatar", user.name))
        .image(user.face())
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Information about this server
#[poise::command(slash_command, prefix_command, guild_only, category = "Utility")]
pub async fn serverinfo(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = super::guild_settings(ctx).await?;
    let gid = guild_id.to_string();
    let (songs, automod_hits) = ctx
        .data()
        .db
        .run_blocking(move |db| {
            Ok((
                db.get_guild_stat(&gid, "songs_played")?,
                db.get_guild_stat(&gid, "automod_hits")?,
            ))
        })
        .await?;

    let embed = {
        let guild = ctx.guild().ok_or("Guild not in cache")?;
        let mut embed = serenity::CreateEmbed::new()
            .title(&guild.name)
            .field("Owner", format!("<@{}>", guild.owner_id), true)
            .field("Members", guild.member_count.to_string(), true)
            .field("Channels", guild.channels.len().to_string(), true)
            .field("Roles", guild.roles.len().to_string(), true)
            .field("Created", format!("<t:{}:D>", guild_id.created_at().unix_timestamp()), true)
            .field("Premium", if settings.is_premium() { "⭐ Yes" } else { "No" }, true)
            .field("Songs played", songs.to_string(), true)
            .field("Automod hits", automod_hits.to_string(), true)
            .footer(serenity::CreateEmbedFooter::new(format!("ID: {}", guild_id)))
            .color(COLOR_INFO);
        if let Some(icon) = guild.icon_url() {
            embed = embed.thumbnail(icon);
        }
        embed
    };
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Information about the bot
#[poise::command(slash_command, prefix_command, aliases("about"), category = "Utility")]
pub async fn botinfo(ctx: Context<'_>) -> Result<(), Error> {
    let gid = ctx.guild_id().map(|g| g.to_string());
    let (total, here) = ctx
        .data()
        .db
        .run_blocking(move |db| {
            let total = db.count_commands(None)?;
            let here = match gid {
                Some(gid) => Some(db.count_commands(Some(&gid))?),
                None => None,
            };
            Ok((total, here))
        })
        .await?;

    let cache = ctx.cache();
    let shard = ctx.serenity_context().shard_id;
    let mut embed = serenity::CreateEmbed::new()
        .title("🐉 Bahamut")
        .field("Version", env!("CARGO_PKG_VERSION"), true)
        .field("Servers", cache.guild_count().to_string(), true)
        .field(
            "Shard",
            format!("{} / {}", shard.0 + 1, cache.shard_count()),
            true,
        )
        .field("Commands run", total.to_string(), true)
        .color(COLOR_INFO);
    if let Some(here) = here {
        embed = embed.field("Commands run here", here.to_string(), true);
    }
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show help for a command
#[poise::command(slash_command, prefix_command, track_edits, category = "Utility")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to show help for"]
    #[rest]
    command: Option<String>,
) -> Result<(), Error> {
    let config = poise::builtins::HelpConfiguration {
        extra_text_at_bottom: "Slash commands work everywhere; the prefix is set per server with `/settings set prefix`.",
        ephemeral: true,
        ..Default::default()
    };
    poise::builtins::help(ctx, command.as_deref(), config).await?;
    Ok(())
}
