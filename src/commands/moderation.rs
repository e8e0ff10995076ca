use crate::responses::{self, COLOR_WARN};
use crate::settings::GuildSettings;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

/// Discord refuses bulk deletion of messages older than this.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

async fn mod_log(ctx: Context<'_>, settings: &GuildSettings, action: &str, target: &serenity::User, reason: &str) {
    let Some(channel) = settings.mod_log_channel else {
        return;
    };
    let embed = serenity::CreateEmbed::new()
        .title(format!("🔨 {}", action))
        .field("User", format!("<@{}> ({})", target.id, target.name), true)
        .field("Moderator", format!("<@{}>", ctx.author().id), true)
        .field("Reason", reason, false)
        .color(COLOR_WARN);
    if let Err(e) = serenity::ChannelId::new(channel)
        .send_message(ctx.http(), serenity::CreateMessage::new().embed(embed))
        .await
    {
        warn!("Moderation: failed to post to mod log {}: {}", channel, e);
    }
}

/// Rejects targeting yourself or the bot.
fn invalid_target(ctx: Context<'_>, target: &serenity::User) -> Option<&'static str> {
    if target.id == ctx.author().id {
        Some("You can't do that to yourself.")
    } else if target.id == ctx.framework().bot_id {
        Some("I'm not doing that to myself.")
    } else {
        None
    }
}

/// Kick a member
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    required_bot_permissions = "KICK_MEMBERS",
    category = "Moderation"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] user: serenity::User,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if let Some(msg) = invalid_target(ctx, &user) {
        return responses::send_error(&ctx, msg).await;
    }
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());

    if let Err(e) = guild_id.kick_with_reason(ctx.http(), user.id, &reason).await {
        warn!("Moderation: kick of {} in guild {} failed: {}", user.id, guild_id, e);
        return responses::send_error(&ctx, format!("Couldn't kick {}. Check my role position.", user.name)).await;
    }
    info!("Moderation: {} kicked {} in guild {}", ctx.author().id, user.id, guild_id);
    let settings = super::guild_settings(ctx).await?;
    mod_log(ctx, &settings, "Kick", &user, &reason).await;
    responses::send_success(&ctx, format!("👢 Kicked **{}**: {}", user.name, reason)).await
}

/// Ban a member
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS",
    category = "Moderation"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: serenity::User,
    #[description = "Days of messages to delete (0-7)"]
    #[min = 0]
    #[max = 7]
    days: Option<u8>,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if let Some(msg) = invalid_target(ctx, &user) {
        return responses::send_error(&ctx, msg).await;
    }
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());
    let days = days.unwrap_or(0).min(7);

    if let Err(e) = guild_id.ban_with_reason(ctx.http(), user.id, days, &reason).await {
        warn!("Moderation: ban of {} in guild {} failed: {}", user.id, guild_id, e);
        return responses::send_error(&ctx, format!("Couldn't ban {}. Check my role position.", user.name)).await;
    }
    info!("Moderation: {} banned {} in guild {}", ctx.author().id, user.id, guild_id);
    let settings = super::guild_settings(ctx).await?;
    mod_log(ctx, &settings, "Ban", &user, &reason).await;
    responses::send_success(&ctx, format!("🔨 Banned **{}**: {}", user.name, reason)).await
}

/// Keeps the ids young enough for bulk deletion.
fn deletable(messages: &[serenity::Message], now: i64) -> Vec<serenity::MessageId> {
    messages
        .iter()
        .filter(|m| now - m.timestamp.unix_timestamp() < BULK_DELETE_MAX_AGE_SECS)
        .map(|m| m.id)
        .collect()
}

/// Delete recent messages in this channel
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("clear"),
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES",
    category = "Moderation"
)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many messages (1-100)"]
    #[min = 1]
    #[max = 100]
    amount: u8,
) -> Result<(), Error> {
    if !(1..=100).contains(&amount) {
        return responses::send_error(&ctx, "Amount must be between 1 and 100.").await;
    }
    ctx.defer_ephemeral().await?;

    let channel = ctx.channel_id();
    let before = match ctx {
        poise::Context::Prefix(prefix) => Some(prefix.msg.id),
        poise::Context::Application(_) => None,
    };
    let mut request = serenity::GetMessages::new().limit(amount);
    if let Some(before) = before {
        request = request.before(before);
    }
    let messages = channel.messages(ctx.http(), request).await?;
    let ids = deletable(&messages, serenity::Timestamp::now().unix_timestamp());
    if ids.is_empty() {
        return responses::send_error(&ctx, "No messages young enough to delete.").await;
    }

    channel.delete_messages(ctx.http(), &ids).await?;
    info!("Moderation: {} purged {} message(s) in {}", ctx.author().id, ids.len(), channel);
    ctx.send(
        poise::CreateReply::default()
            .embed(responses::success_embed(format!("🧹 Deleted {} message(s).", ids.len())))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Warn a member
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    category = "Moderation"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if let Some(msg) = invalid_target(ctx, &user) {
        return responses::send_error(&ctx, msg).await;
    }
    if user.bot {
        return responses::send_error(&ctx, "Bots can't be warned.").await;
    }
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());

    let (gid, uid) = (guild_id.to_string(), user.id.to_string());
    let total = ctx
        .data()
        .db
        .run_blocking(move |db| db.add_user_stat(&gid, &uid, "warnings", 1))
        .await?;

    let guild_name = ctx.guild().map(|g| g.name.clone()).unwrap_or_default();
    let dm = serenity::CreateMessage::new().content(format!(
        "⚠️ You were warned in **{}**: {}",
        guild_name, reason
    ));
    if let Err(e) = user.direct_message(ctx.http(), dm).await {
        info!("Moderation: could not DM warning to {}: {}", user.id, e);
    }

    let settings = super::guild_settings(ctx).await?;
    mod_log(ctx, &settings, "Warn", &user, &reason).await;
    responses::send_success(
        &ctx,
        format!("⚠️ Warned **{}** ({} warning(s) total): {}", user.name, total, reason),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, unix: i64) -> serenity::Message {
        let mut msg = serenity::Message::default();
        msg.id = serenity::MessageId::new(id);
        msg.timestamp = serenity::Timestamp::from_unix_timestamp(unix).unwrap();
        msg
    }

    #[test]
    fn test_deletable_skips_old_messages() {
        let now = 2_000_000_000;
        let messages = vec![
            message(1, now - 60),
            message(2, now - BULK_DELETE_MAX_AGE_SECS - 1),
            message(3, now - BULK_DELETE_MAX_AGE_SECS + 60),
        ];
        let ids: Vec<u64> = deletable(&messages, now).iter().map(|id| id.get()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
