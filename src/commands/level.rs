use crate::leveling::{xp_for_next, CURRENCY_STAT, MAX_LEVEL};
use crate::responses::{self, COLOR_INFO};
use crate::settings::keys::{level_roles_to_json, SettingKey, SettingValue};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Ten-segment progress bar.
fn progress_bar(xp: u64, needed: u64) -> String {
    let filled = if needed == 0 { 10 } else { ((xp * 10) / needed).min(10) as usize };
    format!("{}{}", "▰".repeat(filled), "▱".repeat(10 - filled))
}

/// Show your level and XP
#[poise::command(slash_command, prefix_command, guild_only, category = "Leveling")]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    let settings = super::guild_settings(ctx).await?;
    if !settings.level_system {
        return responses::send_error(&ctx, "The level system is disabled on this server.").await;
    }

    let progress = ctx.data().levels.progress(guild_id.get(), user.id.get()).await?;
    let (gid, uid) = (guild_id.to_string(), user.id.to_string());
    let (position, gil) = ctx
        .data()
        .db
        .run_blocking(move |db| {
            let position = db.level_rank(&gid, progress.level, progress.xp)?;
            let gil = db.get_user_stat(&gid, &uid, CURRENCY_STAT)?;
            Ok((position, gil))
        })
        .await?;

    let xp_line = if progress.level >= MAX_LEVEL {
        "Max level reached".to_string()
    } else {
        let needed = xp_for_next(progress.level);
        format!(
            "{} `{}/{}`",
            progress_bar(progress.xp, needed),
            progress.xp,
            needed
        )
    };
    let embed = serenity::CreateEmbed::new()
        .author(serenity::CreateEmbedAuthor::new(&user.name).icon_url(user.face()))
        .field("Level", progress.level.to_string(), true)
        .field("Rank", format!("#{}", position), true)
        .field("Gil", gil.to_string(), true)
        .field("XP", xp_line, false)
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the top members by level
#[poise::command(slash_command, prefix_command, guild_only, aliases("top"), category = "Leveling")]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let gid = guild_id.to_string();
    let top = ctx
        .data()
        .db
        .run_blocking(move |db| db.top_levels(&gid, 10))
        .await?;

    if top.is_empty() {
        ctx.say("📭 Nobody has earned XP yet.").await?;
        return Ok(());
    }

    let lines: Vec<String> = top
        .iter()
        .enumerate()
        .map(|(i, (user_id, level, xp))| {
            let medal = match i {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                n => format!("`#{}`", n + 1),
            };
            format!("{} <@{}> · level **{}** ({} xp)", medal, user_id, level, xp)
        })
        .collect();
    let embed = serenity::CreateEmbed::new()
        .title("🏆 Leaderboard")
        .description(lines.join("\n"))
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Manage roles granted on reaching a level
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("add", "remove", "list"),
    required_permissions = "MANAGE_ROLES",
    guild_only,
    category = "Leveling"
)]
pub async fn levelrole(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Grant a role at a level
#[poise::command(slash_command, prefix_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Level"]
    #[min = 1]
    #[max = 100]
    level: u32,
    #[description = "Role to grant"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if level == 0 || level > MAX_LEVEL {
        return responses::send_error(&ctx, format!("Level must be between 1 and {}.", MAX_LEVEL)).await;
    }
    let settings = super::guild_settings(ctx).await?;
    let mut roles = settings.level_roles.clone();
    roles.insert(level, role.id.get());
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::LevelRoles, SettingValue::Json(level_roles_to_json(&roles)))
        .await?;
    responses::send_success(&ctx, format!("Reaching level **{}** now grants <@&{}>", level, role.id)).await
}

/// Stop granting a role at a level
#[poise::command(slash_command, prefix_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Level"] level: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = super::guild_settings(ctx).await?;
    let mut roles = settings.level_roles.clone();
    if roles.remove(&level).is_none() {
        return responses::send_error(&ctx, format!("No role is set for level {}.", level)).await;
    }
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::LevelRoles, SettingValue::Json(level_roles_to_json(&roles)))
        .await?;
    responses::send_success(&ctx, format!("Level **{}** no longer grants a role", level)).await
}

/// List level roles
#[poise::command(slash_command, prefix_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let settings = super::guild_settings(ctx).await?;
    let resolved = match ctx.guild() {
        Some(guild) => settings.resolve_roles(&guild),
        None => Default::default(),
    };

    let description = if resolved.level_roles.is_empty() {
        "No level roles configured.".to_string()
    } else {
        resolved
            .level_roles
            .iter()
            .map(|(level, role)| format!("Level **{}** → {}", level, role.name))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let mode = if settings.level_roles_replace {
        "Replace mode: lower level roles are removed"
    } else {
        "Stack mode: level roles accumulate"
    };
    let embed = serenity::CreateEmbed::new()
        .title("🎖️ Level Roles")
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(mode))
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 100), "▱▱▱▱▱▱▱▱▱▱");
        assert_eq!(progress_bar(55, 100), "▰▰▰▰▰▱▱▱▱▱");
        assert_eq!(progress_bar(500, 100), "▰▰▰▰▰▰▰▰▰▰");
    }
}
