use crate::responses::{self, COLOR_INFO};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::debug;

const COOKIES: &str = "cookies";

/// Give, eat and count cookies
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("give", "eat", "count", "top"),
    guild_only,
    category = "Fun"
)]
pub async fn cookie(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give someone a cookie
#[poise::command(slash_command, prefix_command, user_cooldown = 30)]
pub async fn give(
    ctx: Context<'_>,
    #[description = "Who gets the cookie"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if user.id == ctx.author().id {
        return responses::send_error(&ctx, "You can't give yourself a cookie.").await;
    }
    if user.bot {
        return responses::send_error(&ctx, "Bots don't eat cookies.").await;
    }

    let (gid, uid) = (guild_id.to_string(), user.id.to_string());
    let total = ctx
        .data()
        .db
        .run_blocking(move |db| db.add_user_stat(&gid, &uid, COOKIES, 1))
        .await?;
    debug!("Cookies: {} gave {} a cookie", ctx.author().id, user.id);
    ctx.say(format!(
        "🍪 <@{}> gave <@{}> a cookie! They now have **{}**.",
        ctx.author().id,
        user.id,
        total
    ))
    .await?;
    Ok(())
}

/// Eat one of your cookies
#[poise::command(slash_command, prefix_command)]
pub async fn eat(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let (gid, uid) = (guild_id.to_string(), ctx.author().id.to_string());
    let left = ctx
        .data()
        .db
        .run_blocking(move |db| {
            if db.get_user_stat(&gid, &uid, COOKIES)? == 0 {
                return Ok(None);
            }
            db.sub_user_stat(&gid, &uid, COOKIES, 1).map(Some)
        })
        .await?;

    match left {
        None => responses::send_error(&ctx, "You don't have any cookies.").await,
        Some(left) => {
            ctx.say(format!("😋 Nom nom. You have **{}** cookie(s) left.", left))
                .await?;
            Ok(())
        }
    }
}

/// Count someone's cookies
#[poise::command(slash_command, prefix_command)]
pub async fn count(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let (gid, uid) = (guild_id.to_string(), user.id.to_string());
    let total = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_user_stat(&gid, &uid, COOKIES))
        .await?;
    ctx.say(format!("🍪 <@{}> has **{}** cookie(s).", user.id, total))
        .await?;
    Ok(())
}

/// Most cookies on this server
#[poise::command(slash_command, prefix_command)]
pub async fn top(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let gid = guild_id.to_string();
    let top = ctx
        .data()
        .db
        .run_blocking(move |db| db.top_user_stat(&gid, COOKIES, 10))
        .await?;
    let description = if top.is_empty() {
        "No cookies yet.".to_string()
    } else {
        top.iter()
            .enumerate()
            .map(|(i, (user, val))| format!("`#{}` <@{}> · {} 🍪", i + 1, user, val))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let embed = serenity::CreateEmbed::new()
        .title("🍪 Cookie Jar")
        .description(description)
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
