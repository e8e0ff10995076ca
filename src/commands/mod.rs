pub mod admin;
pub mod automod;
pub mod ffxiv;
pub mod fun;
pub mod games;
pub mod level;
pub mod moderation;
pub mod music;
pub mod playlist;
pub mod premium;
pub mod settings;
pub mod stats;
pub mod utility;

use crate::settings::GuildSettings;
use crate::{Context, Data, Error};
use std::sync::Arc;

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        admin::shutdown(),
        admin::register(),
        settings::settings(),
        automod::automod(),
        level::rank(),
        level::leaderboard(),
        level::levelrole(),
        stats::cookie(),
        premium::premium(),
        music::join(),
        music::play(),
        music::skip(),
        music::forceskip(),
        music::pause(),
        music::resume(),
        music::stop(),
        music::leave(),
        music::queue(),
        music::nowplaying(),
        music::repeat(),
        music::seek(),
        music::volume(),
        music::shuffle(),
        playlist::playlist(),
        games::hangman(),
        games::musicquiz(),
        ffxiv::ffxiv(),
        moderation::kick(),
        moderation::ban(),
        moderation::purge(),
        moderation::warn(),
        fun::eightball(),
        fun::coinflip(),
        fun::roll(),
        utility::ping(),
        utility::avatar(),
        utility::serverinfo(),
        utility::botinfo(),
        utility::help(),
    ]
}

/// Settings for the guild the command runs in (defaults in DMs).
pub async fn guild_settings(ctx: Context<'_>) -> Result<Arc<GuildSettings>, Error> {
    Ok(ctx.data().settings.get(ctx.guild_id(), false).await?)
}

/// DJ role holders and members with Manage Server may bypass music votes.
pub async fn is_dj(ctx: Context<'_>, settings: &GuildSettings) -> bool {
    let Some(member) = ctx.author_member().await else {
        return false;
    };
    if let Some(dj) = settings.dj_role {
        if member.roles.iter().any(|r| r.get() == dj) {
            return true;
        }
    }
    ctx.guild()
        .map(|guild| guild.member_permissions(&member).manage_guild())
        .unwrap_or(false)
}
