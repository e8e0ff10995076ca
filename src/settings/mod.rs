//! Per-guild configuration: defaults, persisted overrides and the resolver cache.
//!
//! Settings are stored as one `guild_settings` row per overridden key. A read
//! starts from the hard-coded defaults and applies every stored row on top,
//! so persisted values always win and unset keys keep their default.

pub mod keys;

use crate::cache::BoundedCache;
use crate::db::Database;
use keys::{
    json_to_ids, json_to_level_roles, json_to_strings, AutomodRule, SettingKey, SettingValue,
    SettingsError, ValueType,
};
use poise::serenity_prelude as serenity;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::EnumCount;
use tracing::{debug, warn};

/// What to do when an automod rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomodAction {
    None,
    Delete,
    Warn,
    DeleteAndWarn,
}

impl AutomodAction {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(AutomodAction::None),
            1 => Some(AutomodAction::Delete),
            2 => Some(AutomodAction::Warn),
            3 => Some(AutomodAction::DeleteAndWarn),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            AutomodAction::None => 0,
            AutomodAction::Delete => 1,
            AutomodAction::Warn => 2,
            AutomodAction::DeleteAndWarn => 3,
        }
    }

    pub fn deletes(self) -> bool {
        matches!(self, AutomodAction::Delete | AutomodAction::DeleteAndWarn)
    }

    pub fn warns(self) -> bool {
        matches!(self, AutomodAction::Warn | AutomodAction::DeleteAndWarn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    pub enabled: bool,
    pub action: AutomodAction,
    pub ignored_roles: Vec<u64>,
    pub ignored_channels: Vec<u64>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            action: AutomodAction::Delete,
            ignored_roles: Vec::new(),
            ignored_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomodSettings {
    rules: [RuleConfig; AutomodRule::COUNT],
    pub bad_words: Vec<String>,
    pub link_allowlist: Vec<String>,
    pub allow_discord_links: bool,
    pub emote_limit: usize,
    pub spoiler_limit: usize,
    pub mention_limit: usize,
}

impl Default for AutomodSettings {
    fn default() -> Self {
        Self {
            rules: std::array::from_fn(|_| RuleConfig::default()),
            bad_words: Vec::new(),
            link_allowlist: Vec::new(),
            allow_discord_links: true,
            emote_limit: 6,
            spoiler_limit: 4,
            mention_limit: 5,
        }
    }
}

impl AutomodSettings {
    pub fn rule(&self, rule: AutomodRule) -> &RuleConfig {
        &self.rules[rule as usize]
    }

    pub fn rule_mut(&mut self, rule: AutomodRule) -> &mut RuleConfig {
        &mut self.rules[rule as usize]
    }

    pub fn any_enabled(&self) -> bool {
        self.rules.iter().any(|r| r.enabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildSettings {
    pub prefix: String,
    pub language: String,
    pub premium_owner: Option<u64>,
    pub dj_role: Option<u64>,
    pub music_volume: u8,
    pub music_announce: bool,
    pub level_system: bool,
    pub level_up_message: bool,
    /// Level reached -> role granted.
    pub level_roles: BTreeMap<u32, u64>,
    pub level_roles_replace: bool,
    pub mod_log_channel: Option<u64>,
    pub automod: AutomodSettings,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self::with_prefix("!")
    }
}

/// Role-id fields resolved against the live guild.
#[derive(Debug, Default)]
pub struct ResolvedRoles {
    pub dj_role: Option<serenity::Role>,
    pub level_roles: Vec<(u32, serenity::Role)>,
}

impl GuildSettings {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            language: "en".to_string(),
            premium_owner: None,
            dj_role: None,
            music_volume: 50,
            music_announce: true,
            level_system: true,
            level_up_message: true,
            level_roles: BTreeMap::new(),
            level_roles_replace: false,
            mod_log_channel: None,
            automod: AutomodSettings::default(),
        }
    }

    pub fn is_premium(&self) -> bool {
        self.premium_owner.is_some()
    }

    /// Applies one typed value onto the record.
    pub fn apply(&mut self, key: SettingKey, value: SettingValue) -> Result<(), SettingsError> {
        if value.value_type() != key.value_type() {
            return Err(SettingsError::TypeMismatch {
                key: key.name(),
                expected: key.value_type(),
                found: value.value_type().to_string(),
            });
        }

        match (key, value) {
            (SettingKey::Prefix, SettingValue::String(s)) => self.prefix = s,
            (SettingKey::Language, SettingValue::String(s)) => self.language = s,
            (SettingKey::PremiumOwner, SettingValue::String(s)) => self.premium_owner = s.parse().ok(),
            (SettingKey::DjRole, SettingValue::String(s)) => self.dj_role = s.parse().ok(),
            (SettingKey::ModLogChannel, SettingValue::String(s)) => {
                self.mod_log_channel = s.parse().ok()
            }
            (SettingKey::MusicVolume, SettingValue::Number(n)) => {
                self.music_volume = n.clamp(0, 200) as u8
            }
            (SettingKey::MusicAnnounce, SettingValue::Boolean(b)) => self.music_announce = b,
            (SettingKey::LevelSystem, SettingValue::Boolean(b)) => self.level_system = b,
            (SettingKey::LevelUpMessage, SettingValue::Boolean(b)) => self.level_up_message = b,
            (SettingKey::LevelRolesReplace, SettingValue::Boolean(b)) => {
                self.level_roles_replace = b
            }
            (SettingKey::LevelRoles, SettingValue::Json(v)) => {
                self.level_roles = json_to_level_roles(&v)
            }
            (SettingKey::RuleCheck(rule), SettingValue::Boolean(b)) => {
                self.automod.rule_mut(rule).enabled = b
            }
            (SettingKey::RuleAction(rule), SettingValue::Number(n)) => {
                let action = AutomodAction::from_code(n).ok_or_else(|| SettingsError::InvalidValue {
                    key: key.name(),
                    reason: format!("unknown action code {}", n),
                })?;
                self.automod.rule_mut(rule).action = action;
            }
            (SettingKey::RuleIgnoredRoles(rule), SettingValue::Json(v)) => {
                self.automod.rule_mut(rule).ignored_roles = json_to_ids(&v)
            }
            (SettingKey::RuleIgnoredChannels(rule), SettingValue::Json(v)) => {
                self.automod.rule_mut(rule).ignored_channels = json_to_ids(&v)
            }
            (SettingKey::BadWordsList, SettingValue::Json(v)) => {
                self.automod.bad_words = json_to_strings(&v)
            }
            (SettingKey::LinksAllowlist, SettingValue::Json(v)) => {
                self.automod.link_allowlist = json_to_strings(&v)
            }
            (SettingKey::LinksAllowDiscord, SettingValue::Boolean(b)) => {
                self.automod.allow_discord_links = b
            }
            (SettingKey::EmotesLimit, SettingValue::Number(n)) => {
                self.automod.emote_limit = n.max(1) as usize
            }
            (SettingKey::SpoilersLimit, SettingValue::Number(n)) => {
                self.automod.spoiler_limit = n.max(1) as usize
            }
            (SettingKey::MentionsLimit, SettingValue::Number(n)) => {
                self.automod.mention_limit = n.max(1) as usize
            }
            (key, value) => {
                return Err(SettingsError::TypeMismatch {
                    key: key.name(),
                    expected: key.value_type(),
                    found: value.value_type().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Human readable value of a key, used by `/settings show`.
    pub fn display_value(&self, key: SettingKey) -> String {
        let ids = |ids: &[u64], prefix: &str| {
            if ids.is_empty() {
                "none".to_string()
            } else {
                ids.iter()
                    .map(|id| format!("<{}{}>", prefix, id))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        };
        match key {
            SettingKey::Prefix => format!("`{}`", self.prefix),
            SettingKey::Language => self.language.clone(),
            SettingKey::PremiumOwner => self
                .premium_owner
                .map(|id| format!("<@{}>", id))
                .unwrap_or_else(|| "none".to_string()),
            SettingKey::DjRole => self
                .dj_role
                .map(|id| format!("<@&{}>", id))
                .unwrap_or_else(|| "none".to_string()),
            SettingKey::ModLogChannel => self
                .mod_log_channel
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "none".to_string()),
            SettingKey::MusicVolume => format!("{}%", self.music_volume),
            SettingKey::MusicAnnounce => on_off(self.music_announce),
            SettingKey::LevelSystem => on_off(self.level_system),
            SettingKey::LevelUpMessage => on_off(self.level_up_message),
            SettingKey::LevelRolesReplace => on_off(self.level_roles_replace),
            SettingKey::LevelRoles => {
                if self.level_roles.is_empty() {
                    "none".to_string()
                } else {
                    self.level_roles
                        .iter()
                        .map(|(level, role)| format!("{} → <@&{}>", level, role))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            }
            SettingKey::RuleCheck(rule) => on_off(self.automod.rule(rule).enabled),
            SettingKey::RuleAction(rule) => self.automod.rule(rule).action.code().to_string(),
            SettingKey::RuleIgnoredRoles(rule) => ids(&self.automod.rule(rule).ignored_roles, "@&"),
            SettingKey::RuleIgnoredChannels(rule) => {
                ids(&self.automod.rule(rule).ignored_channels, "#")
            }
            SettingKey::BadWordsList => format!("{} word(s)", self.automod.bad_words.len()),
            SettingKey::LinksAllowlist => {
                if self.automod.link_allowlist.is_empty() {
                    "none".to_string()
                } else {
                    self.automod.link_allowlist.join(", ")
                }
            }
            SettingKey::LinksAllowDiscord => on_off(self.automod.allow_discord_links),
            SettingKey::EmotesLimit => self.automod.emote_limit.to_string(),
            SettingKey::SpoilersLimit => self.automod.spoiler_limit.to_string(),
            SettingKey::MentionsLimit => self.automod.mention_limit.to_string(),
        }
    }

    pub fn resolve_roles(&self, guild: &serenity::Guild) -> ResolvedRoles {
        let lookup = |id: u64| guild.roles.get(&serenity::RoleId::new(id)).cloned();
        ResolvedRoles {
            dj_role: self.dj_role.and_then(lookup),
            level_roles: self
                .level_roles
                .iter()
                .filter_map(|(level, role)| lookup(*role).map(|r| (*level, r)))
                .collect(),
        }
    }

    /// Merges persisted rows onto `defaults`. Rows that no longer parse are skipped.
    pub fn merge_rows(defaults: &GuildSettings, rows: &[crate::db::SettingRow]) -> GuildSettings {
        let mut settings = defaults.clone();
        for row in rows {
            let key = match SettingKey::parse(&row.setting) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Settings: ignoring stored row: {}", e);
                    continue;
                }
            };
            let applied = SettingValue::from_db(&row.setting, &row.val, &row.val_type)
                .and_then(|value| settings.apply(key, value));
            if let Err(e) = applied {
                warn!("Settings: ignoring stored row: {}", e);
            }
        }
        settings
    }
}

fn on_off(value: bool) -> String {
    let label = if value { "on" } else { "off" };
    label.to_string()
}

/// Resolves guild settings through a bounded LRU cache in front of the database.
#[derive(Clone)]
pub struct SettingsCache {
    db: Database,
    cache: BoundedCache<u64, Arc<GuildSettings>>,
    defaults: Arc<GuildSettings>,
}

impl SettingsCache {
    pub fn new(db: Database, capacity: usize, default_prefix: &str) -> Self {
        Self {
            db,
            cache: BoundedCache::new(capacity),
            defaults: Arc::new(GuildSettings::with_prefix(default_prefix)),
        }
    }

    pub fn defaults(&self) -> Arc<GuildSettings> {
        Arc::clone(&self.defaults)
    }

    /// Returns the guild's settings, loading them on a miss or when `force_refresh` is set.
    ///
    /// `None` (direct messages, unknown guild) resolves to the defaults.
    pub async fn get(
        &self,
        guild_id: Option<serenity::GuildId>,
        force_refresh: bool,
    ) -> anyhow::Result<Arc<GuildSettings>> {
        let Some(guild_id) = guild_id else {
            return Ok(self.defaults());
        };

        if !force_refresh {
            if let Some(settings) = self.cache.get(&guild_id.get()) {
                return Ok(settings);
            }
        }

        let gid = guild_id.to_string();
        let rows = self
            .db
            .run_blocking(move |db| db.get_guild_settings(&gid))
            .await?;
        let settings = Arc::new(GuildSettings::merge_rows(&self.defaults, &rows));
        debug!(
            "Settings: loaded {} override(s) for guild {}",
            rows.len(),
            guild_id
        );
        self.cache.insert(guild_id.get(), Arc::clone(&settings));
        Ok(settings)
    }

    /// Parses `raw` for `key`, persists it and refreshes the cached entry.
    pub async fn set(
        &self,
        guild_id: serenity::GuildId,
        key: &str,
        raw: &str,
    ) -> anyhow::Result<Arc<GuildSettings>> {
        let key = SettingKey::parse(key)?;
        if !key.user_editable() {
            return Err(SettingsError::Managed(key.name()).into());
        }
        let value = key.parse_input(raw)?;
        self.set_value(guild_id, key, value).await
    }

    pub async fn set_value(
        &self,
        guild_id: serenity::GuildId,
        key: SettingKey,
        value: SettingValue,
    ) -> anyhow::Result<Arc<GuildSettings>> {
        // Validate before touching storage so a bad value never lands in the table.
        let mut probe = GuildSettings::default();
        probe.apply(key, value.clone())?;

        let gid = guild_id.to_string();
        let name = key.name();
        let val = value.to_db_string();
        let val_type: ValueType = value.value_type();
        self.db
            .run_blocking(move |db| db.set_guild_setting(&gid, &name, &val, &val_type.to_string()))
            .await?;
        self.get(Some(guild_id), true).await
    }

    /// Removes an override so the key falls back to its default.
    pub async fn reset(&self, guild_id: serenity::GuildId, key: &str) -> anyhow::Result<Arc<GuildSettings>> {
        let key = SettingKey::parse(key)?;
        if !key.user_editable() {
            return Err(SettingsError::Managed(key.name()).into());
        }
        self.reset_key(guild_id, key).await
    }

    pub async fn reset_key(
        &self,
        guild_id: serenity::GuildId,
        key: SettingKey,
    ) -> anyhow::Result<Arc<GuildSettings>> {
        let gid = guild_id.to_string();
        let name = key.name();
        self.db
            .run_blocking(move |db| db.delete_guild_setting(&gid, &name))
            .await?;
        self.get(Some(guild_id), true).await
    }

    pub fn invalidate(&self, guild_id: serenity::GuildId) {
        self.cache.remove(&guild_id.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;
    use self::serenity::GuildId;

    #[tokio::test]
    async fn test_defaults_without_guild() {
        let settings = SettingsCache::new(test_database(), 8, "?");
        let resolved = settings.get(None, false).await.unwrap();
        assert_eq!(resolved.prefix, "?");
        assert!(!resolved.automod.any_enabled());
    }

    #[tokio::test]
    async fn test_write_then_uncached_read_merges_defaults() {
        let db = test_database();
        let settings = SettingsCache::new(db.clone(), 8, "!");
        let guild = GuildId::new(42);

        settings.set(guild, "spam_caps_check", "on").await.unwrap();
        settings.set(guild, "music_volume", "80").await.unwrap();

        // A fresh resolver over the same store sees the same values
        let fresh = SettingsCache::new(db, 8, "!");
        let resolved = fresh.get(Some(guild), false).await.unwrap();
        assert!(resolved.automod.rule(AutomodRule::Caps).enabled);
        assert_eq!(resolved.music_volume, 80);
        // Unset keys keep their defaults
        assert_eq!(resolved.prefix, "!");
        assert!(resolved.level_system);
        assert!(!resolved.automod.rule(AutomodRule::Links).enabled);
    }

    #[tokio::test]
    async fn test_cache_converges_after_write() {
        let settings = SettingsCache::new(test_database(), 8, "!");
        let guild = GuildId::new(7);

        let before = settings.get(Some(guild), false).await.unwrap();
        assert_eq!(before.prefix, "!");

        let after = settings.set(guild, "prefix", "$").await.unwrap();
        assert_eq!(after.prefix, "$");
        assert_eq!(settings.get(Some(guild), false).await.unwrap().prefix, "$");

        let reset = settings.reset(guild, "prefix").await.unwrap();
        assert_eq!(reset.prefix, "!");
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let db = test_database();
        let settings = SettingsCache::new(db.clone(), 8, "!");
        let guild = GuildId::new(9);

        let err = settings.set(guild, "spam_caps_action", "9").await.unwrap_err();
        assert!(err.downcast_ref::<SettingsError>().is_some());
        let err = settings.set(guild, "does_not_exist", "1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingsError>(),
            Some(SettingsError::UnknownKey(_))
        ));
        assert!(db.get_guild_settings("9").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_premium_owner_is_not_user_editable() {
        let db = test_database();
        let settings = SettingsCache::new(db.clone(), 8, "!");
        let guild = GuildId::new(11);

        let err = settings.set(guild, "premium_owner", "5").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingsError>(),
            Some(SettingsError::Managed(_))
        ));
        assert!(db.get_guild_settings("11").unwrap().is_empty());
        assert!(!settings.get(Some(guild), true).await.unwrap().is_premium());

        // The premium service's writer still owns the key
        settings
            .set_value(guild, SettingKey::PremiumOwner, SettingValue::String("5".to_string()))
            .await
            .unwrap();
        let err = settings.reset(guild, "premium_owner").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingsError>(),
            Some(SettingsError::Managed(_))
        ));
        assert_eq!(settings.get(Some(guild), false).await.unwrap().premium_owner, Some(5));
    }

    #[test]
    fn test_merge_skips_broken_rows() {
        let rows = vec![
            crate::db::SettingRow {
                setting: "music_volume".to_string(),
                val: "loud".to_string(),
                val_type: "number".to_string(),
            },
            crate::db::SettingRow {
                setting: "spam_links_action".to_string(),
                val: "3".to_string(),
                val_type: "number".to_string(),
            },
            crate::db::SettingRow {
                setting: "retired_key".to_string(),
                val: "x".to_string(),
                val_type: "string".to_string(),
            },
        ];
        let merged = GuildSettings::merge_rows(&GuildSettings::default(), &rows);
        assert_eq!(merged.music_volume, 50);
        assert_eq!(
            merged.automod.rule(AutomodRule::Links).action,
            AutomodAction::DeleteAndWarn
        );
    }

    #[test]
    fn test_apply_type_mismatch() {
        let mut settings = GuildSettings::default();
        let err = settings
            .apply(SettingKey::Prefix, SettingValue::Number(1))
            .unwrap_err();
        assert!(matches!(err, SettingsError::TypeMismatch { .. }));
    }
}
