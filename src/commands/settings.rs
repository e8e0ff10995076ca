use crate::responses::{self, COLOR_INFO};
use crate::settings::keys::{SettingKey, SettingsError};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

async fn autocomplete_key<'a>(_ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    SettingKey::all()
        .into_iter()
        .filter(SettingKey::user_editable)
        .map(|key| key.name())
        .filter(move |name| name.contains(partial))
        .take(25)
}

/// Manage server settings
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("show", "set", "reset"),
    required_permissions = "MANAGE_GUILD",
    guild_only,
    category = "Moderation"
)]
pub async fn settings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show current settings, or a single key
#[poise::command(slash_command, prefix_command)]
pub async fn show(
    ctx: Context<'_>,
    #[description = "Setting key"]
    #[autocomplete = "autocomplete_key"]
    key: Option<String>,
) -> Result<(), Error> {
    let settings = super::guild_settings(ctx).await?;

    if let Some(name) = key {
        let key = match SettingKey::parse(&name) {
            Ok(key) => key,
            Err(e) => return responses::send_error(&ctx, e.to_string()).await,
        };
        let embed = serenity::CreateEmbed::new()
            .title(format!("⚙️ {}", key.name()))
            .description(settings.display_value(key))
            .footer(serenity::CreateEmbedFooter::new(format!("Type: {}", key.value_type())))
            .color(COLOR_INFO);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let general = [
        SettingKey::Prefix,
        SettingKey::Language,
        SettingKey::PremiumOwner,
        SettingKey::DjRole,
        SettingKey::ModLogChannel,
        SettingKey::MusicVolume,
        SettingKey::MusicAnnounce,
        SettingKey::LevelSystem,
        SettingKey::LevelUpMessage,
        SettingKey::LevelRoles,
        SettingKey::LevelRolesReplace,
    ];
    let mut embed = serenity::CreateEmbed::new()
        .title("⚙️ Server Settings")
        .description("Use `/automod status` for moderation rules.")
        .color(COLOR_INFO);
    for key in general {
        embed = embed.field(key.name(), settings.display_value(key), true);
    }
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Change a setting
#[poise::command(slash_command, prefix_command)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Setting key"]
    #[autocomplete = "autocomplete_key"]
    key: String,
    #[description = "New value"]
    #[rest]
    value: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    match ctx.data().settings.set(guild_id, &key, &value).await {
        Ok(updated) => {
            info!("Settings: {} set {} in guild {}", ctx.author().id, key, guild_id);
            let shown = SettingKey::parse(&key)
                .map(|k| updated.display_value(k))
                .unwrap_or(value);
            responses::send_success(&ctx, format!("✅ `{}` is now {}", key, shown)).await
        }
        Err(e) => match e.downcast_ref::<SettingsError>() {
            Some(settings_error) => responses::send_error(&ctx, settings_error.to_string()).await,
            None => Err(e.into()),
        },
    }
}

/// Reset a setting to its default
#[poise::command(slash_command, prefix_command)]
pub async fn reset(
    ctx: Context<'_>,
    #[description = "Setting key"]
    #[autocomplete = "autocomplete_key"]
    key: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    match ctx.data().settings.reset(guild_id, &key).await {
        Ok(updated) => {
            let shown = SettingKey::parse(&key)
                .map(|k| updated.display_value(k))
                .unwrap_or_default();
            responses::send_success(&ctx, format!("↩️ `{}` reset to {}", key, shown)).await
        }
        Err(e) => match e.downcast_ref::<SettingsError>() {
            Some(settings_error) => responses::send_error(&ctx, settings_error.to_string()).await,
            None => Err(e.into()),
        },
    }
}
