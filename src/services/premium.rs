use crate::db::Database;
use crate::settings::keys::{SettingKey, SettingValue};
use crate::settings::SettingsCache;
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// A role in the premium management guild and how many guilds its holders may upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumTier {
    pub role_id: u64,
    pub max_guilds: u32,
}

#[derive(Debug, Error)]
pub enum PremiumError {
    #[error("you do not have a premium tier")]
    NoTier,
    #[error("all {max} premium slot(s) are in use ({used} used)")]
    NoSlots { used: u32, max: u32 },
    #[error("this server is already premium (enabled by <@{owner}>)")]
    AlreadyPremium { owner: u64 },
    #[error("this server is not premium")]
    NotPremium,
    #[error("only <@{owner}> can disable premium on this server")]
    NotOwner { owner: u64 },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumUsage {
    pub guilds: Vec<u64>,
    pub max: u32,
}

impl PremiumUsage {
    pub fn used(&self) -> u32 {
        self.guilds.len() as u32
    }
}

pub struct PremiumService {
    db: Database,
    settings: SettingsCache,
    tiers: Vec<PremiumTier>,
}

impl PremiumService {
    pub fn new(db: Database, settings: SettingsCache, tiers: Vec<PremiumTier>) -> Self {
        Self { db, settings, tiers }
    }

    /// Highest slot count granted by any of the member's roles.
    pub fn max_slots(&self, roles: &[u64]) -> u32 {
        self.tiers
            .iter()
            .filter(|tier| roles.contains(&tier.role_id))
            .map(|tier| tier.max_guilds)
            .max()
            .unwrap_or(0)
    }

    /// Guilds on which `user_id` currently holds premium.
    pub async fn enabled_guilds(&self, user_id: u64) -> anyhow::Result<Vec<u64>> {
        let uid = user_id.to_string();
        let guilds = self
            .db
            .run_blocking(move |db| db.find_guilds_with_setting(&SettingKey::PremiumOwner.name(), &uid))
            .await?;
        Ok(guilds.iter().filter_map(|g| g.parse().ok()).collect())
    }

    pub async fn usage(&self, user_id: u64, roles: &[u64]) -> anyhow::Result<PremiumUsage> {
        Ok(PremiumUsage {
            guilds: self.enabled_guilds(user_id).await?,
            max: self.max_slots(roles),
        })
    }

    pub async fn enable(
        &self,
        user_id: u64,
        roles: &[u64],
        guild_id: serenity::GuildId,
    ) -> Result<PremiumUsage, PremiumError> {
        let settings = self.settings.get(Some(guild_id), false).await?;
        if let Some(owner) = settings.premium_owner {
            return Err(PremiumError::AlreadyPremium { owner });
        }

        let max = self.max_slots(roles);
        if max == 0 {
            return Err(PremiumError::NoTier);
        }
        let mut usage = self.usage(user_id, roles).await?;
        if usage.used() >= max {
            return Err(PremiumError::NoSlots {
                used: usage.used(),
                max,
            });
        }

        self.settings
            .set_value(
                guild_id,
                SettingKey::PremiumOwner,
                SettingValue::String(user_id.to_string()),
            )
            .await?;
        info!("Premium: enabled on guild {} by {}", guild_id, user_id);
        usage.guilds.push(guild_id.get());
        Ok(usage)
    }

    /// Clears premium on a guild. `force` skips the owner check (control plane, sweeps).
    pub async fn disable(
        &self,
        user_id: u64,
        guild_id: serenity::GuildId,
        force: bool,
    ) -> Result<(), PremiumError> {
        let settings = self.settings.get(Some(guild_id), true).await?;
        let owner = settings.premium_owner.ok_or(PremiumError::NotPremium)?;
        if owner != user_id && !force {
            return Err(PremiumError::NotOwner { owner });
        }
        self.settings
            .reset_key(guild_id, SettingKey::PremiumOwner)
            .await?;
        info!("Premium: disabled on guild {} (owner {})", guild_id, owner);
        Ok(())
    }

    /// Disables every guild of a user whose roles no longer cover their usage.
    /// Returns the guilds that were disabled.
    pub async fn sweep(&self, user_id: u64, roles: &[u64]) -> Result<Vec<u64>, PremiumError> {
        let usage = self.usage(user_id, roles).await?;
        if usage.used() <= usage.max {
            return Ok(Vec::new());
        }

        info!(
            "Premium: {} uses {} slot(s) but only has {}, disabling all",
            user_id,
            usage.used(),
            usage.max
        );
        for guild in &usage.guilds {
            self.disable(user_id, serenity::GuildId::new(*guild), true).await?;
        }
        Ok(usage.guilds)
    }
}

/// Role ids a user holds in the premium management guild; empty when they are not a member.
pub async fn management_roles(
    http: &serenity::Http,
    premium_guild_id: Option<u64>,
    user_id: serenity::UserId,
) -> Vec<u64> {
    let Some(guild) = premium_guild_id else {
        return Vec::new();
    };
    match http.get_member(serenity::GuildId::new(guild), user_id).await {
        Ok(member) => member.roles.iter().map(|r| r.get()).collect(),
        Err(e) => {
            tracing::debug!("Premium: no management membership for {}: {}", user_id, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    fn service() -> (PremiumService, SettingsCache) {
        let db = test_database();
        let settings = SettingsCache::new(db.clone(), 8, "!");
        let tiers = vec![
            PremiumTier { role_id: 10, max_guilds: 1 },
            PremiumTier { role_id: 20, max_guilds: 3 },
        ];
        (PremiumService::new(db, settings.clone(), tiers), settings)
    }

    #[test]
    fn test_max_slots() {
        let (premium, _) = service();
        assert_eq!(premium.max_slots(&[]), 0);
        assert_eq!(premium.max_slots(&[10]), 1);
        assert_eq!(premium.max_slots(&[10, 20, 99]), 3);
    }

    #[tokio::test]
    async fn test_enable_respects_slots() {
        let (premium, settings) = service();
        let user = 5;

        premium.enable(user, &[10], serenity::GuildId::new(1)).await.unwrap();
        assert_eq!(
            settings.get(Some(serenity::GuildId::new(1)), false).await.unwrap().premium_owner,
            Some(user)
        );

        let err = premium
            .enable(user, &[10], serenity::GuildId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PremiumError::NoSlots { used: 1, max: 1 }));

        let err = premium
            .enable(6, &[20], serenity::GuildId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PremiumError::AlreadyPremium { owner: 5 }));

        let err = premium.enable(7, &[], serenity::GuildId::new(3)).await.unwrap_err();
        assert!(matches!(err, PremiumError::NoTier));
    }

    #[tokio::test]
    async fn test_disable_requires_owner() {
        let (premium, settings) = service();
        let guild = serenity::GuildId::new(1);
        premium.enable(5, &[20], guild).await.unwrap();

        assert!(matches!(
            premium.disable(6, guild, false).await.unwrap_err(),
            PremiumError::NotOwner { owner: 5 }
        ));
        premium.disable(5, guild, false).await.unwrap();
        assert!(!settings.get(Some(guild), false).await.unwrap().is_premium());
        assert!(matches!(
            premium.disable(5, guild, false).await.unwrap_err(),
            PremiumError::NotPremium
        ));
    }

    #[tokio::test]
    async fn test_sweep_after_demotion() {
        let (premium, _) = service();
        for g in 1..=3 {
            premium.enable(5, &[20], serenity::GuildId::new(g)).await.unwrap();
        }

        // Still entitled: nothing happens
        assert!(premium.sweep(5, &[20]).await.unwrap().is_empty());

        // Demoted to the single-slot tier
        let disabled = premium.sweep(5, &[10]).await.unwrap();
        assert_eq!(disabled, vec![1, 2, 3]);
        assert!(premium.enabled_guilds(5).await.unwrap().is_empty());
    }
}
