use crate::responses::{self, COLOR_INFO};
use crate::services::premium::{management_roles, PremiumError};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

async fn author_roles(ctx: Context<'_>) -> Vec<u64> {
    management_roles(
        &ctx.serenity_context().http,
        ctx.data().config.premium_guild_id,
        ctx.author().id,
    )
    .await
}

/// Reply with the user-facing message for expected premium failures, propagate the rest.
async fn report(ctx: Context<'_>, error: PremiumError) -> Result<(), Error> {
    match error {
        PremiumError::Storage(e) => Err(e.into()),
        expected => responses::send_error(&ctx, expected.to_string()).await,
    }
}

/// Premium features for this server
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("enable", "disable", "status"),
    guild_only,
    category = "Premium"
)]
pub async fn premium(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Use one of your premium slots on this server
#[poise::command(slash_command, prefix_command)]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;
    let roles = author_roles(ctx).await;

    match ctx.data().premium.enable(ctx.author().id.get(), &roles, guild_id).await {
        Ok(usage) => {
            responses::send_success(
                &ctx,
                format!(
                    "⭐ Premium enabled! You are using **{}/{}** slot(s).",
                    usage.used(),
                    usage.max
                ),
            )
            .await
        }
        Err(e) => report(ctx, e).await,
    }
}

/// Free your premium slot on this server
#[poise::command(slash_command, prefix_command)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    match ctx
        .data()
        .premium
        .disable(ctx.author().id.get(), guild_id, false)
        .await
    {
        Ok(()) => responses::send_success(&ctx, "Premium disabled on this server.").await,
        Err(e) => report(ctx, e).await,
    }
}

/// Show premium status and your slot usage
#[poise::command(slash_command, prefix_command, ephemeral)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let settings = super::guild_settings(ctx).await?;
    let roles = author_roles(ctx).await;
    let usage = ctx.data().premium.usage(ctx.author().id.get(), &roles).await?;

    let server = match settings.premium_owner {
        Some(owner) => format!("⭐ Premium, enabled by <@{}>", owner),
        None => "Not premium".to_string(),
    };
    let guilds = if usage.guilds.is_empty() {
        "none".to_string()
    } else {
        usage
            .guilds
            .iter()
            .map(|g| format!("`{}`", g))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let embed = serenity::CreateEmbed::new()
        .title("⭐ Premium")
        .field("This server", server, false)
        .field("Your slots", format!("{}/{}", usage.used(), usage.max), true)
        .field("Your servers", guilds, true)
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
