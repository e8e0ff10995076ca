pub mod api;
pub mod automod;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod events;
pub mod ffxiv;
pub mod games;
pub mod leveling;
pub mod music;
pub mod responses;
pub mod services;
pub mod settings;

use std::sync::Arc;

/// Custom data passed to all commands, event handlers and the control plane
#[derive(Clone)]
pub struct Data {
    pub config: Arc<config::Config>,
    pub http_client: reqwest::Client,
    pub db: db::Database,
    pub settings: settings::SettingsCache,
    pub levels: leveling::LevelStore,
    pub automod: automod::AutomodEngine,
    pub games: games::GameRegistry,
    pub music: music::SessionRegistry,
    pub premium: Arc<services::premium::PremiumService>,
    pub xivapi: ffxiv::XivApiClient,
}

impl Data {
    /// Wires every service over an already initialised database.
    pub fn new(config: config::Config, db: db::Database) -> Self {
        let http_client = reqwest::Client::new();
        let settings = settings::SettingsCache::new(
            db.clone(),
            config.settings_cache_capacity,
            &config.default_prefix,
        );
        let premium = services::premium::PremiumService::new(
            db.clone(),
            settings.clone(),
            config.premium_tiers.clone(),
        );
        let xivapi = ffxiv::XivApiClient::new(
            http_client.clone(),
            &config.xivapi_url,
            config.xivapi_key.clone(),
        );

        Self {
            levels: leveling::LevelStore::new(db.clone(), config.level_cache_capacity),
            automod: automod::AutomodEngine::new(config.message_history_capacity),
            games: games::GameRegistry::new(),
            music: music::SessionRegistry::new(),
            premium: Arc::new(premium),
            settings,
            xivapi,
            http_client,
            db,
            config: Arc::new(config),
        }
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[cfg(test)]
pub(crate) fn test_data() -> Data {
    Data::new(config::test_config(), db::test_database())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_shares_one_store() {
        let data = test_data();
        let defaults = data.settings.get(None, false).await.unwrap();
        assert_eq!(defaults.prefix, data.config.default_prefix);

        // Clones see the same registries
        let cloned = data.clone();
        data.music.with_session(7, |s| s.repeat = music::RepeatMode::Queue);
        assert!(cloned.music.exists(7));
        assert_eq!(cloned.music.guilds(), vec![7]);
        assert!(cloned.premium.enabled_guilds(1).await.unwrap().is_empty());
    }
}
