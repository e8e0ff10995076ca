//! Setting keys, their storage types and user-input parsing.

use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting `{0}`")]
    UnknownKey(String),
    #[error("`{0}` is managed by /premium")]
    Managed(String),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("stored value for `{key}` has type `{found}`, expected `{expected}`")]
    TypeMismatch {
        key: String,
        expected: ValueType,
        found: String,
    },
}

/// Automoderation rules, declared in evaluation priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum AutomodRule {
    BadWords,
    Repeated,
    Invites,
    Links,
    Caps,
    Emotes,
    Spoilers,
    Mentions,
    Zalgo,
}

impl AutomodRule {
    pub fn label(self) -> &'static str {
        match self {
            AutomodRule::BadWords => "Bad words",
            AutomodRule::Repeated => "Repeated messages",
            AutomodRule::Invites => "Server invites",
            AutomodRule::Links => "Links",
            AutomodRule::Caps => "Excessive caps",
            AutomodRule::Emotes => "Emote spam",
            AutomodRule::Spoilers => "Spoiler spam",
            AutomodRule::Mentions => "Mass mentions",
            AutomodRule::Zalgo => "Zalgo text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    String(String),
    Number(i64),
    Boolean(bool),
    Json(Value),
}

impl SettingValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            SettingValue::String(_) => ValueType::String,
            SettingValue::Number(_) => ValueType::Number,
            SettingValue::Boolean(_) => ValueType::Boolean,
            SettingValue::Json(_) => ValueType::Json,
        }
    }

    /// Text stored in the `val` column.
    pub fn to_db_string(&self) -> String {
        match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Number(n) => n.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Json(v) => v.to_string(),
        }
    }

    pub fn from_db(key: &str, val: &str, val_type: &str) -> Result<Self, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidValue {
            key: key.to_string(),
            reason,
        };
        let value_type = ValueType::from_str(val_type)
            .map_err(|_| invalid(format!("unknown value type `{}`", val_type)))?;
        match value_type {
            ValueType::String => Ok(SettingValue::String(val.to_string())),
            ValueType::Number => val
                .parse()
                .map(SettingValue::Number)
                .map_err(|e| invalid(e.to_string())),
            ValueType::Boolean => val
                .parse()
                .map(SettingValue::Boolean)
                .map_err(|e| invalid(e.to_string())),
            ValueType::Json => serde_json::from_str(val)
                .map(SettingValue::Json)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Prefix,
    Language,
    PremiumOwner,
    DjRole,
    MusicVolume,
    MusicAnnounce,
    LevelSystem,
    LevelUpMessage,
    LevelRoles,
    LevelRolesReplace,
    ModLogChannel,
    RuleCheck(AutomodRule),
    RuleAction(AutomodRule),
    RuleIgnoredRoles(AutomodRule),
    RuleIgnoredChannels(AutomodRule),
    BadWordsList,
    LinksAllowlist,
    LinksAllowDiscord,
    EmotesLimit,
    SpoilersLimit,
    MentionsLimit,
}

const SUPPORTED_LANGUAGES: &[&str] = &["en", "de", "fr", "ja"];

impl SettingKey {
    pub fn parse(name: &str) -> Result<Self, SettingsError> {
        let unknown = || SettingsError::UnknownKey(name.to_string());
        let key = match name {
            "prefix" => SettingKey::Prefix,
            "language" => SettingKey::Language,
            "premium_owner" => SettingKey::PremiumOwner,
            "dj_role" => SettingKey::DjRole,
            "music_volume" => SettingKey::MusicVolume,
            "music_announce" => SettingKey::MusicAnnounce,
            "level_system" => SettingKey::LevelSystem,
            "level_up_message" => SettingKey::LevelUpMessage,
            "level_roles" => SettingKey::LevelRoles,
            "level_roles_replace" => SettingKey::LevelRolesReplace,
            "mod_log_channel" => SettingKey::ModLogChannel,
            "spam_badwords_list" => SettingKey::BadWordsList,
            "spam_links_allowlist" => SettingKey::LinksAllowlist,
            "spam_links_allow_discord" => SettingKey::LinksAllowDiscord,
            "spam_emotes_limit" => SettingKey::EmotesLimit,
            "spam_spoilers_limit" => SettingKey::SpoilersLimit,
            "spam_mentions_limit" => SettingKey::MentionsLimit,
            other => {
                let rest = other.strip_prefix("spam_").ok_or_else(unknown)?;
                let (rule, suffix) = rest.split_once('_').ok_or_else(unknown)?;
                let rule = AutomodRule::from_str(rule).map_err(|_| unknown())?;
                match suffix {
                    "check" => SettingKey::RuleCheck(rule),
                    "action" => SettingKey::RuleAction(rule),
                    "ignored_roles" => SettingKey::RuleIgnoredRoles(rule),
                    "ignored_channels" => SettingKey::RuleIgnoredChannels(rule),
                    _ => return Err(unknown()),
                }
            }
        };
        Ok(key)
    }

    pub fn name(&self) -> String {
        match self {
            SettingKey::Prefix => "prefix".to_string(),
            SettingKey::Language => "language".to_string(),
            SettingKey::PremiumOwner => "premium_owner".to_string(),
            SettingKey::DjRole => "dj_role".to_string(),
            SettingKey::MusicVolume => "music_volume".to_string(),
            SettingKey::MusicAnnounce => "music_announce".to_string(),
            SettingKey::LevelSystem => "level_system".to_string(),
            SettingKey::LevelUpMessage => "level_up_message".to_string(),
            SettingKey::LevelRoles => "level_roles".to_string(),
            SettingKey::LevelRolesReplace => "level_roles_replace".to_string(),
            SettingKey::ModLogChannel => "mod_log_channel".to_string(),
            SettingKey::RuleCheck(rule) => format!("spam_{}_check", rule),
            SettingKey::RuleAction(rule) => format!("spam_{}_action", rule),
            SettingKey::RuleIgnoredRoles(rule) => format!("spam_{}_ignored_roles", rule),
            SettingKey::RuleIgnoredChannels(rule) => format!("spam_{}_ignored_channels", rule),
            SettingKey::BadWordsList => "spam_badwords_list".to_string(),
            SettingKey::LinksAllowlist => "spam_links_allowlist".to_string(),
            SettingKey::LinksAllowDiscord => "spam_links_allow_discord".to_string(),
            SettingKey::EmotesLimit => "spam_emotes_limit".to_string(),
            SettingKey::SpoilersLimit => "spam_spoilers_limit".to_string(),
            SettingKey::MentionsLimit => "spam_mentions_limit".to_string(),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            SettingKey::Prefix
            | SettingKey::Language
            | SettingKey::PremiumOwner
            | SettingKey::DjRole
            | SettingKey::ModLogChannel => ValueType::String,
            SettingKey::MusicVolume
            | SettingKey::RuleAction(_)
            | SettingKey::EmotesLimit
            | SettingKey::SpoilersLimit
            | SettingKey::MentionsLimit => ValueType::Number,
            SettingKey::MusicAnnounce
            | SettingKey::LevelSystem
            | SettingKey::LevelUpMessage
            | SettingKey::LevelRolesReplace
            | SettingKey::RuleCheck(_)
            | SettingKey::LinksAllowDiscord => ValueType::Boolean,
            SettingKey::LevelRoles
            | SettingKey::RuleIgnoredRoles(_)
            | SettingKey::RuleIgnoredChannels(_)
            | SettingKey::BadWordsList
            | SettingKey::LinksAllowlist => ValueType::Json,
        }
    }

    /// Every known key, automod keys grouped per rule.
    /// Whether `/settings set` and `/settings reset` may write this key.
    pub fn user_editable(&self) -> bool {
        !matches!(self, SettingKey::PremiumOwner)
    }

    pub fn all() -> Vec<SettingKey> {
        let mut keys = vec![
            SettingKey::Prefix,
            SettingKey::Language,
            SettingKey::PremiumOwner,
            SettingKey::DjRole,
            SettingKey::MusicVolume,
            SettingKey::MusicAnnounce,
            SettingKey::LevelSystem,
            SettingKey::LevelUpMessage,
            SettingKey::LevelRoles,
            SettingKey::LevelRolesReplace,
            SettingKey::ModLogChannel,
        ];
        for rule in AutomodRule::iter() {
            keys.push(SettingKey::RuleCheck(rule));
            keys.push(SettingKey::RuleAction(rule));
            keys.push(SettingKey::RuleIgnoredRoles(rule));
            keys.push(SettingKey::RuleIgnoredChannels(rule));
        }
        keys.extend([
            SettingKey::BadWordsList,
            SettingKey::LinksAllowlist,
            SettingKey::LinksAllowDiscord,
            SettingKey::EmotesLimit,
            SettingKey::SpoilersLimit,
            SettingKey::MentionsLimit,
        ]);
        keys
    }

    /// Parses user-supplied text into a value of this key's type.
    pub fn parse_input(&self, raw: &str) -> Result<SettingValue, SettingsError> {
        let raw = raw.trim();
        let invalid = |reason: &str| SettingsError::InvalidValue {
            key: self.name(),
            reason: reason.to_string(),
        };

        match self {
            SettingKey::Prefix => {
                if raw.is_empty() || raw.chars().count() > 5 || raw.contains(char::is_whitespace) {
                    return Err(invalid("prefix must be 1-5 characters without spaces"));
                }
                Ok(SettingValue::String(raw.to_string()))
            }
            SettingKey::Language => {
                let lang = raw.to_lowercase();
                if !SUPPORTED_LANGUAGES.contains(&lang.as_str()) {
                    return Err(invalid("unsupported language"));
                }
                Ok(SettingValue::String(lang))
            }
            SettingKey::PremiumOwner | SettingKey::DjRole | SettingKey::ModLogChannel => {
                let id = parse_snowflake(raw).ok_or_else(|| invalid("expected an id or mention"))?;
                Ok(SettingValue::String(id.to_string()))
            }
            SettingKey::MusicVolume => parse_bounded(raw, 0, 200).ok_or_else(|| invalid("expected 0-200")),
            SettingKey::RuleAction(_) => parse_bounded(raw, 0, 3).ok_or_else(|| invalid("expected 0-3")),
            SettingKey::EmotesLimit | SettingKey::SpoilersLimit | SettingKey::MentionsLimit => {
                parse_bounded(raw, 1, 100).ok_or_else(|| invalid("expected 1-100"))
            }
            SettingKey::MusicAnnounce
            | SettingKey::LevelSystem
            | SettingKey::LevelUpMessage
            | SettingKey::LevelRolesReplace
            | SettingKey::RuleCheck(_)
            | SettingKey::LinksAllowDiscord => parse_bool(raw)
                .map(SettingValue::Boolean)
                .ok_or_else(|| invalid("expected on/off")),
            SettingKey::RuleIgnoredRoles(_) | SettingKey::RuleIgnoredChannels(_) => {
                let ids = parse_list(raw)
                    .iter()
                    .map(|item| parse_snowflake(item))
                    .collect::<Option<Vec<u64>>>()
                    .ok_or_else(|| invalid("expected a comma separated list of ids"))?;
                Ok(SettingValue::Json(ids_to_json(&ids)))
            }
            SettingKey::BadWordsList | SettingKey::LinksAllowlist => {
                let words: Vec<String> = parse_list(raw).iter().map(|w| w.to_lowercase()).collect();
                Ok(SettingValue::Json(Value::from(words)))
            }
            SettingKey::LevelRoles => {
                let mut map = BTreeMap::new();
                for pair in parse_list(raw) {
                    let (level, role) = pair
                        .split_once(':')
                        .ok_or_else(|| invalid("expected level:role pairs"))?;
                    let level: u32 = level.trim().parse().map_err(|_| invalid("bad level"))?;
                    let role = parse_snowflake(role).ok_or_else(|| invalid("bad role id"))?;
                    map.insert(level, role);
                }
                Ok(SettingValue::Json(level_roles_to_json(&map)))
            }
        }
    }
}

/// Extracts the id from a raw id or a user/role/channel mention.
pub fn parse_snowflake(raw: &str) -> Option<u64> {
    let trimmed = raw
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start_matches(['@', '#', '!', '&']);
    trimmed.parse().ok().filter(|id| *id > 0)
}

fn parse_bounded(raw: &str, min: i64, max: i64) -> Option<SettingValue> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
        .map(SettingValue::Number)
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "on" | "yes" | "enable" | "enabled" | "1" => Some(true),
        "false" | "off" | "no" | "disable" | "disabled" | "0" => Some(false),
        _ => None,
    }
}

/// Accepts either a JSON array or comma separated text.
fn parse_list(raw: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn ids_to_json(ids: &[u64]) -> Value {
    Value::from(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>())
}

pub fn json_to_ids(value: &Value) -> Vec<u64> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_u64(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn json_to_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_lowercase()))
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub fn level_roles_to_json(map: &BTreeMap<u32, u64>) -> Value {
    let obj: serde_json::Map<String, Value> = map
        .iter()
        .map(|(level, role)| (level.to_string(), Value::from(role.to_string())))
        .collect();
    Value::Object(obj)
}

pub fn json_to_level_roles(value: &Value) -> BTreeMap<u32, u64> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(level, role)| {
                    let level = level.parse().ok()?;
                    let role = match role {
                        Value::String(s) => s.parse().ok()?,
                        Value::Number(n) => n.as_u64()?,
                        _ => return None,
                    };
                    Some((level, role))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in SettingKey::all() {
            assert_eq!(SettingKey::parse(&key.name()).unwrap(), key);
        }
        assert_eq!(
            SettingKey::parse("spam_caps_check").unwrap(),
            SettingKey::RuleCheck(AutomodRule::Caps)
        );
        assert!(matches!(
            SettingKey::parse("spam_caps_volume"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(SettingKey::parse("nonsense").is_err());
    }

    #[test]
    fn test_only_premium_owner_is_locked() {
        let locked: Vec<_> = SettingKey::all().into_iter().filter(|k| !k.user_editable()).collect();
        assert_eq!(locked, vec![SettingKey::PremiumOwner]);
    }

    #[test]
    fn test_rule_order_matches_priority() {
        let rules: Vec<_> = AutomodRule::iter().collect();
        assert_eq!(rules.first(), Some(&AutomodRule::BadWords));
        assert_eq!(rules.last(), Some(&AutomodRule::Zalgo));
        assert_eq!(rules.len(), AutomodRule::COUNT);
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(
            SettingKey::Prefix.parse_input("?").unwrap(),
            SettingValue::String("?".to_string())
        );
        assert!(SettingKey::Prefix.parse_input("too long").is_err());
        assert_eq!(
            SettingKey::RuleCheck(AutomodRule::Caps).parse_input("on").unwrap(),
            SettingValue::Boolean(true)
        );
        assert!(SettingKey::RuleAction(AutomodRule::Caps).parse_input("4").is_err());
        assert_eq!(
            SettingKey::DjRole.parse_input("<@&1234>").unwrap(),
            SettingValue::String("1234".to_string())
        );

        let roles = SettingKey::RuleIgnoredRoles(AutomodRule::Links)
            .parse_input("<@&1>, 2")
            .unwrap();
        match roles {
            SettingValue::Json(v) => assert_eq!(json_to_ids(&v), vec![1, 2]),
            other => panic!("unexpected {:?}", other),
        }

        let level_roles = SettingKey::LevelRoles.parse_input("5:100, 10:<@&200>").unwrap();
        match level_roles {
            SettingValue::Json(v) => {
                let map = json_to_level_roles(&v);
                assert_eq!(map.get(&5), Some(&100));
                assert_eq!(map.get(&10), Some(&200));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_db_value_parsing() {
        assert_eq!(
            SettingValue::from_db("music_volume", "80", "number").unwrap(),
            SettingValue::Number(80)
        );
        assert!(SettingValue::from_db("music_volume", "loud", "number").is_err());
        assert!(SettingValue::from_db("x", "1", "float").is_err());

        let value = SettingValue::Json(Value::from(vec!["a", "b"]));
        let stored = value.to_db_string();
        assert_eq!(SettingValue::from_db("k", &stored, "json").unwrap(), value);
    }
}
