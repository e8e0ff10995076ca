use crate::responses::{self, COLOR_INFO};
use crate::settings::keys::{ids_to_json, AutomodRule, SettingKey, SettingValue};
use crate::settings::AutomodAction;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::str::FromStr;
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ActionChoice {
    #[name = "none"]
    None,
    #[name = "delete"]
    Delete,
    #[name = "warn"]
    Warn,
    #[name = "delete and warn"]
    DeleteAndWarn,
}

impl From<ActionChoice> for AutomodAction {
    fn from(choice: ActionChoice) -> Self {
        match choice {
            ActionChoice::None => AutomodAction::None,
            ActionChoice::Delete => AutomodAction::Delete,
            ActionChoice::Warn => AutomodAction::Warn,
            ActionChoice::DeleteAndWarn => AutomodAction::DeleteAndWarn,
        }
    }
}

fn action_label(action: AutomodAction) -> &'static str {
    match action {
        AutomodAction::None => "none",
        AutomodAction::Delete => "delete",
        AutomodAction::Warn => "warn",
        AutomodAction::DeleteAndWarn => "delete + warn",
    }
}

async fn autocomplete_rule<'a>(_ctx: Context<'_>, partial: &'a str) -> impl Iterator<Item = String> + 'a {
    AutomodRule::iter()
        .map(|rule| rule.to_string())
        .filter(move |name| name.starts_with(&partial.to_lowercase()))
}

fn parse_rule(raw: &str) -> Result<AutomodRule, String> {
    AutomodRule::from_str(raw.trim().to_lowercase().as_str()).map_err(|_| {
        let known: Vec<String> = AutomodRule::iter().map(|r| r.to_string()).collect();
        format!("Unknown rule `{}`. Rules: {}", raw, known.join(", "))
    })
}

/// Configure automoderation
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("status", "toggle", "action", "ignore_role", "ignore_channel", "badword"),
    required_permissions = "MANAGE_GUILD",
    guild_only,
    category = "Moderation"
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show every rule and its configuration
#[poise::command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let settings = super::guild_settings(ctx).await?;
    let automod = &settings.automod;

    let mut embed = serenity::CreateEmbed::new()
        .title("🛡️ Automod")
        .description("Rules are checked top to bottom; the first match decides.")
        .color(COLOR_INFO);
    for rule in AutomodRule::iter() {
        let config = automod.rule(rule);
        let mut value = format!(
            "{} · action: {}",
            if config.enabled { "✅ on" } else { "❌ off" },
            action_label(config.action)
        );
        if !config.ignored_roles.is_empty() || !config.ignored_channels.is_empty() {
            value.push_str(&format!(
                "\nignoring {} role(s), {} channel(s)",
                config.ignored_roles.len(),
                config.ignored_channels.len()
            ));
        }
        embed = embed.field(format!("{} (`{}`)", rule.label(), rule), value, true);
    }
    embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
        "Limits: {} emotes, {} spoilers, {} mentions · {} bad word(s)",
        automod.emote_limit,
        automod.spoiler_limit,
        automod.mention_limit,
        automod.bad_words.len()
    )));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Turn a rule on or off
#[poise::command(slash_command, prefix_command)]
pub async fn toggle(
    ctx: Context<'_>,
    #[description = "Rule"]
    #[autocomplete = "autocomplete_rule"]
    rule: String,
    #[description = "Enable the rule"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rule = match parse_rule(&rule) {
        Ok(rule) => rule,
        Err(msg) => return responses::send_error(&ctx, msg).await,
    };
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::RuleCheck(rule), SettingValue::Boolean(enabled))
        .await?;
    responses::send_success(
        &ctx,
        format!("{} **{}** is now {}", if enabled { "✅" } else { "❌" }, rule.label(), if enabled { "on" } else { "off" }),
    )
    .await
}

/// Choose what happens when a rule matches
#[poise::command(slash_command, prefix_command)]
pub async fn action(
    ctx: Context<'_>,
    #[description = "Rule"]
    #[autocomplete = "autocomplete_rule"]
    rule: String,
    #[description = "Action"] action: ActionChoice,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rule = match parse_rule(&rule) {
        Ok(rule) => rule,
        Err(msg) => return responses::send_error(&ctx, msg).await,
    };
    let action = AutomodAction::from(action);
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::RuleAction(rule), SettingValue::Number(action.code()))
        .await?;
    responses::send_success(
        &ctx,
        format!("**{}** will now {}", rule.label(), action_label(action)),
    )
    .await
}

/// Toggle `id` in `ids`, returning whether it is now present.
fn toggle_id(ids: &mut Vec<u64>, id: u64) -> bool {
    if let Some(pos) = ids.iter().position(|x| *x == id) {
        ids.remove(pos);
        false
    } else {
        ids.push(id);
        true
    }
}

/// Exempt a role from a rule (run again to remove)
#[poise::command(slash_command, prefix_command, rename = "ignore-role")]
pub async fn ignore_role(
    ctx: Context<'_>,
    #[description = "Rule"]
    #[autocomplete = "autocomplete_rule"]
    rule: String,
    #[description = "Role"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rule = match parse_rule(&rule) {
        Ok(rule) => rule,
        Err(msg) => return responses::send_error(&ctx, msg).await,
    };
    let settings = super::guild_settings(ctx).await?;
    let mut ids = settings.automod.rule(rule).ignored_roles.clone();
    let added = toggle_id(&mut ids, role.id.get());
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::RuleIgnoredRoles(rule), SettingValue::Json(ids_to_json(&ids)))
        .await?;
    let verb = if added { "now ignores" } else { "no longer ignores" };
    responses::send_success(&ctx, format!("**{}** {} <@&{}>", rule.label(), verb, role.id)).await
}

/// Exempt a channel from a rule (run again to remove)
#[poise::command(slash_command, prefix_command, rename = "ignore-channel")]
pub async fn ignore_channel(
    ctx: Context<'_>,
    #[description = "Rule"]
    #[autocomplete = "autocomplete_rule"]
    rule: String,
    #[description = "Channel"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let rule = match parse_rule(&rule) {
        Ok(rule) => rule,
        Err(msg) => return responses::send_error(&ctx, msg).await,
    };
    let settings = super::guild_settings(ctx).await?;
    let mut ids = settings.automod.rule(rule).ignored_channels.clone();
    let added = toggle_id(&mut ids, channel.id.get());
    ctx.data()
        .settings
        .set_value(
            guild_id,
            SettingKey::RuleIgnoredChannels(rule),
            SettingValue::Json(ids_to_json(&ids)),
        )
        .await?;
    let verb = if added { "now ignores" } else { "no longer ignores" };
    responses::send_success(&ctx, format!("**{}** {} <#{}>", rule.label(), verb, channel.id)).await
}

/// Add or remove a blocked word; without a word, list them
#[poise::command(slash_command, prefix_command, ephemeral)]
pub async fn badword(
    ctx: Context<'_>,
    #[description = "Word to add or remove"] word: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let settings = super::guild_settings(ctx).await?;
    let mut words = settings.automod.bad_words.clone();

    let Some(word) = word.map(|w| w.trim().to_lowercase()).filter(|w| !w.is_empty()) else {
        let listed = if words.is_empty() {
            "No blocked words.".to_string()
        } else {
            words.iter().map(|w| format!("||{}||", w)).collect::<Vec<_>>().join(", ")
        };
        ctx.say(listed).await?;
        return Ok(());
    };

    let added = if let Some(pos) = words.iter().position(|w| *w == word) {
        words.remove(pos);
        false
    } else {
        words.push(word.clone());
        true
    };
    ctx.data()
        .settings
        .set_value(guild_id, SettingKey::BadWordsList, SettingValue::Json(words.into()))
        .await?;
    let verb = if added { "Added" } else { "Removed" };
    ctx.say(format!("✅ {} ||{}||", verb, word)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        assert_eq!(parse_rule("Caps").unwrap(), AutomodRule::Caps);
        assert_eq!(parse_rule("badwords").unwrap(), AutomodRule::BadWords);
        assert!(parse_rule("everything").unwrap_err().contains("zalgo"));
    }

    #[test]
    fn test_toggle_id() {
        let mut ids = vec![1, 2];
        assert!(toggle_id(&mut ids, 3));
        assert!(!toggle_id(&mut ids, 1));
        assert_eq!(ids, vec![2, 3]);
    }
}
