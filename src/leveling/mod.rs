//! Message XP, level thresholds and level-up rewards.

use crate::cache::BoundedCache;
use crate::db::Database;
use crate::settings::GuildSettings;
use crate::Data;
use poise::serenity_prelude as serenity;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// No XP is awarded past this level.
pub const MAX_LEVEL: u32 = 100;
/// Message length beyond this earns nothing extra.
const MAX_COUNTED_CHARS: usize = 400;
/// User stat that receives the level-up currency grant.
pub const CURRENCY_STAT: &str = "gil";

struct Band {
    base: u64,
    per_char: f64,
    currency: i64,
}

static BANDS: [(u32, Band); 5] = [
    (0, Band { base: 15, per_char: 0.10, currency: 50 }),
    (10, Band { base: 12, per_char: 0.08, currency: 100 }),
    (25, Band { base: 10, per_char: 0.06, currency: 200 }),
    (50, Band { base: 8, per_char: 0.04, currency: 350 }),
    (75, Band { base: 6, per_char: 0.02, currency: 500 }),
];

fn band(level: u32) -> &'static Band {
    BANDS
        .iter()
        .rev()
        .find(|(floor, _)| level >= *floor)
        .map(|(_, band)| band)
        .unwrap_or(&BANDS[0].1)
}

/// XP needed to advance from `level` to `level + 1`.
pub const fn xp_for_next(level: u32) -> u64 {
    let l = level as u64;
    5 * l * l + 50 * l + 100
}

/// XP awarded for one message of `message_len` characters at `level`.
pub fn xp_gain(level: u32, message_len: usize) -> u64 {
    let band = band(level);
    let counted = message_len.min(MAX_COUNTED_CHARS) as f64;
    band.base + (counted * band.per_char).floor() as u64
}

pub fn currency_for(level: u32) -> i64 {
    band(level).currency
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub level: u32,
    pub xp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpOutcome {
    /// Already at the maximum level.
    Capped,
    Gained(Progress),
    LeveledUp { progress: Progress, currency: i64 },
}

impl Progress {
    pub fn apply(self, gain: u64) -> XpOutcome {
        if self.level >= MAX_LEVEL {
            return XpOutcome::Capped;
        }
        let xp = self.xp + gain;
        let threshold = xp_for_next(self.level);
        if xp < threshold {
            return XpOutcome::Gained(Progress { level: self.level, xp });
        }

        let level = self.level + 1;
        let overflow = xp.saturating_sub(threshold);
        let xp = if level >= MAX_LEVEL { 0 } else { overflow };
        XpOutcome::LeveledUp {
            progress: Progress { level, xp },
            currency: currency_for(level),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub grant: Option<u64>,
    pub revoke: Vec<u64>,
}

/// Role to grant on reaching `level`, plus the other level roles to strip in replace mode.
pub fn role_changes(level_roles: &BTreeMap<u32, u64>, level: u32, replace: bool) -> RoleChanges {
    let Some(&grant) = level_roles.get(&level) else {
        return RoleChanges::default();
    };
    let revoke = if replace {
        level_roles
            .values()
            .copied()
            .filter(|role| *role != grant)
            .collect()
    } else {
        Vec::new()
    };
    RoleChanges {
        grant: Some(grant),
        revoke,
    }
}

/// Level data cached per (guild, user) and written through to the database.
#[derive(Clone)]
pub struct LevelStore {
    db: Database,
    cache: BoundedCache<(u64, u64), Progress>,
}

impl LevelStore {
    pub fn new(db: Database, capacity: usize) -> Self {
        Self {
            db,
            cache: BoundedCache::new(capacity),
        }
    }

    pub async fn progress(&self, guild_id: u64, user_id: u64) -> anyhow::Result<Progress> {
        if let Some(progress) = self.cache.get(&(guild_id, user_id)) {
            return Ok(progress);
        }
        let (gid, uid) = (guild_id.to_string(), user_id.to_string());
        let stored = self
            .db
            .run_blocking(move |db| db.get_level(&gid, &uid))
            .await?;
        let progress = stored
            .map(|(level, xp)| Progress { level, xp })
            .unwrap_or_default();
        self.cache.insert((guild_id, user_id), progress);
        Ok(progress)
    }

    /// Awards XP for one message and persists the result.
    pub async fn award(&self, guild_id: u64, user_id: u64, message_len: usize) -> anyhow::Result<XpOutcome> {
        let current = self.progress(guild_id, user_id).await?;
        let outcome = current.apply(xp_gain(current.level, message_len));
        let updated = match outcome {
            XpOutcome::Capped => return Ok(outcome),
            XpOutcome::Gained(progress) => progress,
            XpOutcome::LeveledUp { progress, .. } => progress,
        };

        self.cache.insert((guild_id, user_id), updated);
        let (gid, uid) = (guild_id.to_string(), user_id.to_string());
        self.db
            .run_blocking(move |db| db.save_level(&gid, &uid, updated.level, updated.xp))
            .await?;
        Ok(outcome)
    }
}

/// Awards XP for a qualifying message and applies level-up rewards.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
    settings: &GuildSettings,
) -> anyhow::Result<()> {
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    if !settings.level_system {
        return Ok(());
    }

    let outcome = data
        .levels
        .award(guild_id.get(), message.author.id.get(), message.content.chars().count())
        .await?;

    let XpOutcome::LeveledUp { progress, currency } = outcome else {
        return Ok(());
    };
    info!(
        "Leveling: {} reached level {} in guild {}",
        message.author.id, progress.level, guild_id
    );

    let (gid, uid) = (guild_id.to_string(), message.author.id.to_string());
    if let Err(e) = data
        .db
        .run_blocking(move |db| db.add_user_stat(&gid, &uid, CURRENCY_STAT, currency))
        .await
    {
        error!("Leveling: failed to grant currency: {}", e);
    }

    let changes = role_changes(&settings.level_roles, progress.level, settings.level_roles_replace);
    if let Some(role) = changes.grant {
        let member_roles: Vec<u64> = message
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default();
        if let Err(e) = ctx
            .http
            .add_member_role(
                guild_id,
                message.author.id,
                serenity::RoleId::new(role),
                Some("Level reward"),
            )
            .await
        {
            warn!("Leveling: failed to grant role {}: {}", role, e);
        }
        for old in changes.revoke.iter().filter(|r| member_roles.contains(r)) {
            debug!("Leveling: removing replaced level role {}", old);
            if let Err(e) = ctx
                .http
                .remove_member_role(
                    guild_id,
                    message.author.id,
                    serenity::RoleId::new(*old),
                    Some("Level reward replaced"),
                )
                .await
            {
                warn!("Leveling: failed to remove role {}: {}", old, e);
            }
        }
    }

    if settings.level_up_message {
        let text = format!(
            "🎉 <@{}> reached **level {}** and earned **{}** gil!",
            message.author.id, progress.level, currency
        );
        let builder = serenity::CreateMessage::new()
            .content(text)
            .allowed_mentions(serenity::CreateAllowedMentions::new().users(vec![message.author.id]));
        if let Err(e) = message.channel_id.send_message(&ctx.http, builder).await {
            warn!("Leveling: failed to announce level-up: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database;

    #[test]
    fn test_threshold_table() {
        assert_eq!(xp_for_next(0), 100);
        assert_eq!(xp_for_next(1), 155);
        assert_eq!(xp_for_next(10), 1100);
        assert!(xp_for_next(50) > xp_for_next(49));
    }

    #[test]
    fn test_gain_is_banded_and_length_weighted() {
        assert_eq!(xp_gain(0, 0), 15);
        assert_eq!(xp_gain(0, 100), 25);
        assert_eq!(xp_gain(0, 10_000), 55, "length is capped");
        assert_eq!(xp_gain(10, 100), 20);
        assert_eq!(xp_gain(80, 100), 8);
        assert!(xp_gain(0, 50) > xp_gain(60, 50));
    }

    #[test]
    fn test_level_up_carries_overflow() {
        let progress = Progress { level: 0, xp: 90 };
        match progress.apply(25) {
            XpOutcome::LeveledUp { progress, currency } => {
                assert_eq!(progress, Progress { level: 1, xp: 15 });
                assert_eq!(currency, 50);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Landing exactly on the threshold leaves zero
        let exact = Progress { level: 0, xp: 85 }.apply(15);
        assert_eq!(
            exact,
            XpOutcome::LeveledUp {
                progress: Progress { level: 1, xp: 0 },
                currency: 50
            }
        );

        assert_eq!(
            Progress { level: 0, xp: 10 }.apply(15),
            XpOutcome::Gained(Progress { level: 0, xp: 25 })
        );
    }

    #[test]
    fn test_max_level_stops_accrual() {
        let last = Progress { level: MAX_LEVEL - 1, xp: xp_for_next(MAX_LEVEL - 1) - 1 };
        match last.apply(10) {
            XpOutcome::LeveledUp { progress, .. } => {
                assert_eq!(progress, Progress { level: MAX_LEVEL, xp: 0 })
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Progress { level: MAX_LEVEL, xp: 0 }.apply(50), XpOutcome::Capped);
    }

    #[test]
    fn test_role_changes() {
        let mut roles = BTreeMap::new();
        roles.insert(5, 500);
        roles.insert(10, 1000);

        assert_eq!(role_changes(&roles, 7, true), RoleChanges::default());
        assert_eq!(
            role_changes(&roles, 10, false),
            RoleChanges { grant: Some(1000), revoke: vec![] }
        );
        assert_eq!(
            role_changes(&roles, 10, true),
            RoleChanges { grant: Some(1000), revoke: vec![500] }
        );
    }

    #[tokio::test]
    async fn test_store_writes_through() {
        let db = test_database();
        let store = LevelStore::new(db.clone(), 8);

        assert_eq!(store.progress(1, 2).await.unwrap(), Progress::default());
        let outcome = store.award(1, 2, 100).await.unwrap();
        assert_eq!(outcome, XpOutcome::Gained(Progress { level: 0, xp: 25 }));
        assert_eq!(db.get_level("1", "2").unwrap(), Some((0, 25)));

        // Levels never go down across many messages
        let mut last_level = 0;
        for _ in 0..50 {
            if let XpOutcome::LeveledUp { progress, .. } = store.award(1, 2, 400).await.unwrap() {
                assert!(progress.level > last_level);
                last_level = progress.level;
            }
        }
        assert!(last_level >= 1);

        let fresh = LevelStore::new(db, 8);
        assert_eq!(fresh.progress(1, 2).await.unwrap().level, last_level);
    }
}
