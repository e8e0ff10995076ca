use crate::services::premium::PremiumTier;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::IpAddr;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub database_url: String,
    pub default_prefix: String,
    pub status_message: String,
    /// `None` lets serenity pick the recommended shard count.
    pub shard_count: Option<u32>,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,

    // Cache sizing
    pub settings_cache_capacity: usize,
    pub level_cache_capacity: usize,
    pub message_history_capacity: usize,

    // Control plane
    pub api_enabled: bool,
    pub api_bind: String,
    pub api_token: Option<String>,
    pub api_allowed_ips: Vec<IpAddr>,

    // Premium
    pub premium_guild_id: Option<u64>,
    pub premium_tiers: Vec<PremiumTier>,
    pub premium_idle_leave_secs: u64,

    // FFXIV data
    pub xivapi_url: String,
    pub xivapi_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/bahamut.db".to_string()),
            default_prefix: env::var("DEFAULT_PREFIX").unwrap_or_else(|_| "!".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "/help | bahamut".to_string()),
            shard_count: env::var("SHARD_COUNT").ok().and_then(|n| n.parse().ok()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            settings_cache_capacity: env::var("SETTINGS_CACHE_CAPACITY")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10000),
            level_cache_capacity: env::var("LEVEL_CACHE_CAPACITY")
                .unwrap_or_else(|_| "50000".to_string())
                .parse()
                .unwrap_or(50000),
            message_history_capacity: env::var("MESSAGE_HISTORY_CAPACITY")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),

            api_enabled: env::var("API_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            api_bind: env::var("API_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            api_allowed_ips: env::var("API_ALLOWED_IPS")
                .map(|raw| parse_ip_list(&raw))
                .unwrap_or_else(|_| vec![IpAddr::from([127, 0, 0, 1])]),

            premium_guild_id: env::var("PREMIUM_GUILD_ID")
                .ok()
                .and_then(|id| id.parse().ok()),
            premium_tiers: Self::load_premium_tiers()?,
            premium_idle_leave_secs: env::var("PREMIUM_IDLE_LEAVE_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),

            xivapi_url: env::var("XIVAPI_URL")
                .unwrap_or_else(|_| "https://xivapi.com".to_string()),
            xivapi_key: env::var("XIVAPI_KEY").ok().filter(|k| !k.is_empty()),
        })
    }

    /// Reads `premium_tiers.toml`, falling back to the `PREMIUM_TIERS` JSON variable.
    pub fn load_premium_tiers() -> anyhow::Result<Vec<PremiumTier>> {
        if let Ok(content) = fs::read_to_string("premium_tiers.toml") {
            #[derive(Deserialize)]
            struct TierWrapper {
                tiers: Vec<PremiumTier>,
            }
            let wrapper = toml::from_str::<TierWrapper>(&content)
                .map_err(|e| anyhow::anyhow!("premium_tiers.toml is invalid: {}", e))?;
            return Ok(wrapper.tiers);
        }

        if let Ok(env_tiers) = env::var("PREMIUM_TIERS") {
            if let Ok(tiers) = serde_json::from_str(&env_tiers) {
                return Ok(tiers);
            }
        }

        Ok(Vec::new())
    }
}

fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("database_url", &self.database_url)
            .field("default_prefix", &self.default_prefix)
            .field("status_message", &self.status_message)
            .field("shard_count", &self.shard_count)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("settings_cache_capacity", &self.settings_cache_capacity)
            .field("level_cache_capacity", &self.level_cache_capacity)
            .field("message_history_capacity", &self.message_history_capacity)
            .field("api_enabled", &self.api_enabled)
            .field("api_bind", &self.api_bind)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_allowed_ips", &self.api_allowed_ips)
            .field("premium_guild_id", &self.premium_guild_id)
            .field("premium_tiers", &self.premium_tiers)
            .field("premium_idle_leave_secs", &self.premium_idle_leave_secs)
            .field("xivapi_url", &self.xivapi_url)
            .field("xivapi_key", &self.xivapi_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        owner_id: Some(1),
        database_url: ":memory:".to_string(),
        default_prefix: "!".to_string(),
        status_message: "test".to_string(),
        shard_count: None,
        dev_guild_id: None,
        register_commands: false,
        settings_cache_capacity: 16,
        level_cache_capacity: 16,
        message_history_capacity: 16,
        api_enabled: false,
        api_bind: "127.0.0.1:0".to_string(),
        api_token: Some("secret".to_string()),
        api_allowed_ips: vec![IpAddr::from([127, 0, 0, 1])],
        premium_guild_id: Some(999),
        premium_tiers: Vec::new(),
        premium_idle_leave_secs: 60,
        xivapi_url: "http://localhost".to_string(),
        xivapi_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(result.is_err(), "Should fail when the token is missing");

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.default_prefix, "!");
        assert_eq!(config.premium_idle_leave_secs, 60);

        // 3. Test debug redaction
        env::set_var("API_TOKEN", "secret_api_token");
        let config_redacted = Config::build().unwrap();
        let debug_output = format!("{:?}", config_redacted);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("secret_api_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("API_TOKEN");
    }

    #[test]
    fn test_parse_ip_list() {
        let ips = parse_ip_list("127.0.0.1, ::1,not-an-ip,,10.0.0.5");
        assert_eq!(ips.len(), 3);
        assert!(ips.contains(&IpAddr::from([10, 0, 0, 5])));
    }
}
