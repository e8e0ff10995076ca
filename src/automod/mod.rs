//! Automoderation: a single pass of rule predicates over each guild message.
//!
//! Rules run in the fixed order of [`AutomodRule`]. A rule is skipped when it
//! is disabled or when the author/channel is on its ignore lists. The first
//! rule whose predicate matches decides the action and ends the pass.

pub mod history;
pub mod rules;

use crate::settings::keys::AutomodRule;
use crate::settings::{AutomodAction, AutomodSettings, GuildSettings, RuleConfig};
use crate::Data;
use history::MessageHistory;
use poise::serenity_prelude as serenity;
use strum::IntoEnumIterator;
use tracing::{error, info, warn};

/// More identical messages than this inside the window counts as spam.
pub const REPEAT_THRESHOLD: usize = 3;

/// The parts of a message the rules look at.
#[derive(Debug, Clone)]
pub struct ModMessage<'a> {
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_roles: &'a [u64],
    pub content: &'a str,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub rule: AutomodRule,
    pub action: AutomodAction,
}

#[derive(Clone)]
pub struct AutomodEngine {
    history: MessageHistory,
}

fn is_exempt(config: &RuleConfig, msg: &ModMessage<'_>) -> bool {
    config.ignored_channels.contains(&msg.channel_id)
        || msg
            .author_roles
            .iter()
            .any(|role| config.ignored_roles.contains(role))
}

impl AutomodEngine {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: MessageHistory::new(history_capacity),
        }
    }

    pub fn evaluate(&self, settings: &AutomodSettings, msg: &ModMessage<'_>) -> Option<Verdict> {
        self.evaluate_traced(settings, msg, |_| {})
    }

    /// Same as [`evaluate`](Self::evaluate), reporting every rule whose predicate runs.
    pub fn evaluate_traced(
        &self,
        settings: &AutomodSettings,
        msg: &ModMessage<'_>,
        mut on_check: impl FnMut(AutomodRule),
    ) -> Option<Verdict> {
        for rule in AutomodRule::iter() {
            let config = settings.rule(rule);
            if !config.enabled || is_exempt(config, msg) {
                continue;
            }
            on_check(rule);
            if self.matches(rule, settings, msg) {
                return Some(Verdict {
                    rule,
                    action: config.action,
                });
            }
        }
        None
    }

    fn matches(&self, rule: AutomodRule, settings: &AutomodSettings, msg: &ModMessage<'_>) -> bool {
        match rule {
            AutomodRule::BadWords => rules::contains_bad_word(msg.content, &settings.bad_words),
            AutomodRule::Repeated => {
                let seen =
                    self.history
                        .record(msg.guild_id, msg.author_id, msg.content, msg.timestamp);
                seen > REPEAT_THRESHOLD
            }
            AutomodRule::Invites => rules::contains_invite(msg.content),
            AutomodRule::Links => rules::contains_disallowed_link(
                msg.content,
                &settings.link_allowlist,
                settings.allow_discord_links,
            ),
            AutomodRule::Caps => rules::is_excessive_caps(msg.content),
            AutomodRule::Emotes => rules::count_emotes(msg.content) > settings.emote_limit,
            AutomodRule::Spoilers => rules::count_spoilers(msg.content) > settings.spoiler_limit,
            AutomodRule::Mentions => rules::count_mentions(msg.content) > settings.mention_limit,
            AutomodRule::Zalgo => rules::is_zalgo(msg.content),
        }
    }
}

/// Carries out a verdict. Every Discord call is best-effort and only logged on failure.
pub async fn enforce(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
    settings: &GuildSettings,
    verdict: Verdict,
) {
    let Some(guild_id) = message.guild_id else {
        return;
    };
    info!(
        "Automod: {} triggered by {} in guild {} (action {})",
        verdict.rule,
        message.author.id,
        guild_id,
        verdict.action.code()
    );

    if verdict.action.deletes() {
        if let Err(e) = message.delete(&ctx.http).await {
            warn!("Automod: failed to delete message {}: {}", message.id, e);
        }
    }

    if verdict.action.warns() {
        let notice = format!(
            "⚠️ <@{}>, your message was flagged by automod: **{}**.",
            message.author.id,
            verdict.rule.label()
        );
        let builder = serenity::CreateMessage::new()
            .content(notice)
            .allowed_mentions(serenity::CreateAllowedMentions::new().users(vec![message.author.id]));
        if let Err(e) = message.channel_id.send_message(&ctx.http, builder).await {
            warn!("Automod: failed to warn user {}: {}", message.author.id, e);
        }

        let gid = guild_id.to_string();
        let uid = message.author.id.to_string();
        if let Err(e) = data
            .db
            .run_blocking(move |db| db.add_user_stat(&gid, &uid, "warnings", 1))
            .await
        {
            error!("Automod: failed to record warning: {}", e);
        }
    }

    if verdict.action != AutomodAction::None {
        let gid = guild_id.to_string();
        if let Err(e) = data
            .db
            .run_blocking(move |db| db.add_guild_stat(&gid, "automod_hits", 1))
            .await
        {
            error!("Automod: failed to record hit: {}", e);
        }
    }

    if let Some(log_channel) = settings.mod_log_channel {
        let embed = serenity::CreateEmbed::new()
            .title("🛡️ Automod")
            .field("Rule", verdict.rule.label(), true)
            .field("User", format!("<@{}>", message.author.id), true)
            .field("Channel", format!("<#{}>", message.channel_id), true)
            .description(crate::responses::truncate(&message.content, 1000))
            .color(0xED4245);
        if let Err(e) = serenity::ChannelId::new(log_channel)
            .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
            .await
        {
            warn!("Automod: failed to post to mod log {}: {}", log_channel, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(settings: &mut AutomodSettings, rule: AutomodRule, action: AutomodAction) {
        let config = settings.rule_mut(rule);
        config.enabled = true;
        config.action = action;
    }

    fn message<'a>(content: &'a str, roles: &'a [u64]) -> ModMessage<'a> {
        ModMessage {
            guild_id: 1,
            channel_id: 10,
            author_id: 100,
            author_roles: roles,
            content,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_caps_message_is_deleted_and_stops_evaluation() {
        let engine = AutomodEngine::new(16);
        let mut settings = AutomodSettings::default();
        enabled(&mut settings, AutomodRule::Caps, AutomodAction::Delete);
        enabled(&mut settings, AutomodRule::Zalgo, AutomodAction::Warn);
        enabled(&mut settings, AutomodRule::Mentions, AutomodAction::Warn);

        // 6 of 10 letters uppercase, also zalgo
        let content = "HELLOWorld z\u{0336}";
        let mut checked = Vec::new();
        let verdict = engine.evaluate_traced(&settings, &message(content, &[]), |r| checked.push(r));

        assert_eq!(
            verdict,
            Some(Verdict {
                rule: AutomodRule::Caps,
                action: AutomodAction::Delete
            })
        );
        assert_eq!(checked, vec![AutomodRule::Caps]);
    }

    #[test]
    fn test_priority_order() {
        let engine = AutomodEngine::new(16);
        let mut settings = AutomodSettings::default();
        settings.bad_words = vec!["heck".to_string()];
        enabled(&mut settings, AutomodRule::BadWords, AutomodAction::Warn);
        enabled(&mut settings, AutomodRule::Links, AutomodAction::Delete);

        let verdict = engine
            .evaluate(&settings, &message("heck https://evil.example", &[]))
            .unwrap();
        assert_eq!(verdict.rule, AutomodRule::BadWords);
        assert_eq!(verdict.action, AutomodAction::Warn);
    }

    #[test]
    fn test_ignored_role_and_channel_skip_rule() {
        let engine = AutomodEngine::new(16);
        let mut settings = AutomodSettings::default();
        enabled(&mut settings, AutomodRule::Caps, AutomodAction::Delete);
        enabled(&mut settings, AutomodRule::Zalgo, AutomodAction::Warn);
        settings.rule_mut(AutomodRule::Caps).ignored_roles = vec![5];

        let roles = [5];
        let verdict = engine.evaluate(&settings, &message("LOUD NOISES z\u{0336}", &roles));
        assert_eq!(verdict.map(|v| v.rule), Some(AutomodRule::Zalgo));

        settings.rule_mut(AutomodRule::Zalgo).ignored_channels = vec![10];
        assert_eq!(engine.evaluate(&settings, &message("LOUD NOISES z\u{0336}", &roles)), None);
    }

    #[test]
    fn test_disabled_rules_never_run() {
        let engine = AutomodEngine::new(16);
        let settings = AutomodSettings::default();
        let mut checked = 0;
        let verdict = engine.evaluate_traced(&settings, &message("SHOUTING LOUDLY", &[]), |_| {
            checked += 1
        });
        assert!(verdict.is_none());
        assert_eq!(checked, 0);
    }

    #[test]
    fn test_repeated_messages() {
        let engine = AutomodEngine::new(16);
        let mut settings = AutomodSettings::default();
        enabled(&mut settings, AutomodRule::Repeated, AutomodAction::DeleteAndWarn);

        for _ in 0..REPEAT_THRESHOLD {
            assert!(engine.evaluate(&settings, &message("buy now", &[])).is_none());
        }
        let verdict = engine.evaluate(&settings, &message("buy now", &[])).unwrap();
        assert_eq!(verdict.rule, AutomodRule::Repeated);
        assert!(verdict.action.deletes() && verdict.action.warns());
    }

    #[test]
    fn test_action_none_still_ends_the_pass() {
        let engine = AutomodEngine::new(16);
        let mut settings = AutomodSettings::default();
        enabled(&mut settings, AutomodRule::Invites, AutomodAction::None);
        enabled(&mut settings, AutomodRule::Links, AutomodAction::Delete);

        let mut checked = Vec::new();
        let verdict = engine.evaluate_traced(
            &settings,
            &message("https://discord.gg/abc", &[]),
            |r| checked.push(r),
        );
        assert_eq!(verdict.map(|v| v.action), Some(AutomodAction::None));
        assert_eq!(checked, vec![AutomodRule::Invites]);
    }
}
