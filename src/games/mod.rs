//! Chat games. At most one game of each kind runs per guild.

pub mod hangman;
pub mod quiz;

use crate::Data;
use hangman::Hangman;
use poise::serenity_prelude as serenity;
use quiz::QuizRound;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use strum::Display;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum GameKind {
    #[strum(serialize = "hangman")]
    Hangman,
    #[strum(serialize = "music quiz")]
    MusicQuiz,
}

#[derive(Debug, Clone)]
pub enum GameState {
    Hangman(Hangman),
    MusicQuiz(QuizRound),
}

impl GameState {
    pub fn kind(&self) -> GameKind {
        match self {
            GameState::Hangman(_) => GameKind::Hangman,
            GameState::MusicQuiz(_) => GameKind::MusicQuiz,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunningGame {
    pub initiator: u64,
    pub channel_id: u64,
    pub state: GameState,
}

impl RunningGame {
    pub fn kind(&self) -> GameKind {
        self.state.kind()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("a {0} game is already running on this server")]
    AlreadyRunning(GameKind),
    #[error("no {0} game is running on this server")]
    NotRunning(GameKind),
}

#[derive(Clone, Default)]
pub struct GameRegistry {
    games: Arc<Mutex<HashMap<(u64, GameKind), RunningGame>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(u64, GameKind), RunningGame>> {
        self.games.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn start(&self, guild_id: u64, game: RunningGame) -> Result<(), GameError> {
        let mut games = self.lock();
        let key = (guild_id, game.kind());
        if games.contains_key(&key) {
            return Err(GameError::AlreadyRunning(key.1));
        }
        games.insert(key, game);
        Ok(())
    }

    pub fn stop(&self, guild_id: u64, kind: GameKind) -> Result<RunningGame, GameError> {
        self.lock()
            .remove(&(guild_id, kind))
            .ok_or(GameError::NotRunning(kind))
    }

    pub fn is_running(&self, guild_id: u64, kind: GameKind) -> bool {
        self.lock().contains_key(&(guild_id, kind))
    }

    /// Mutable access to a running game. Returning `true` from `f` removes it.
    pub fn with_game<R>(
        &self,
        guild_id: u64,
        kind: GameKind,
        f: impl FnOnce(&mut RunningGame) -> (R, bool),
    ) -> Result<R, GameError> {
        let mut games = self.lock();
        let key = (guild_id, kind);
        let game = games.get_mut(&key).ok_or(GameError::NotRunning(kind))?;
        let (result, finished) = f(game);
        if finished {
            games.remove(&key);
        }
        Ok(result)
    }

    /// Ends the quiz only if `round` is still the one running.
    pub fn finish_quiz_round(&self, guild_id: u64, round: uuid::Uuid) -> Option<RunningGame> {
        let mut games = self.lock();
        let key = (guild_id, GameKind::MusicQuiz);
        match games.get(&key).map(|g| &g.state) {
            Some(GameState::MusicQuiz(current)) if current.id == round => games.remove(&key),
            _ => None,
        }
    }
}

/// Checks a chat message against a running music quiz. Returns true when it won the round.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
) -> anyhow::Result<bool> {
    let Some(guild_id) = message.guild_id else {
        return Ok(false);
    };
    let channel_id = message.channel_id.get();
    let won = data
        .games
        .with_game(guild_id.get(), GameKind::MusicQuiz, |game| {
            let hit = match &game.state {
                GameState::MusicQuiz(round) if game.channel_id == channel_id => {
                    round.is_correct(&message.content).then(|| round.clone())
                }
                _ => None,
            };
            let finished = hit.is_some();
            (hit, finished)
        })
        .ok()
        .flatten();
    let Some(round) = won else {
        return Ok(false);
    };

    info!(
        "Games: {} won the music quiz in guild {} ('{}')",
        message.author.id, guild_id, round.title
    );
    let (gid, uid) = (guild_id.to_string(), message.author.id.to_string());
    let wins = match data
        .db
        .run_blocking(move |db| db.add_user_stat(&gid, &uid, "quiz_wins", 1))
        .await
    {
        Ok(wins) => wins,
        Err(e) => {
            error!("Games: failed to record quiz win: {}", e);
            0
        }
    };

    if let Ok(manager) = crate::music::player::manager(ctx).await {
        if let Some(call) = manager.get(guild_id) {
            if let Err(e) = call.lock().await.queue().skip() {
                warn!("Games: failed to skip quiz track: {}", e);
            }
        }
    }

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Correct!")
        .description(format!(
            "<@{}> guessed it: **[{}]({})**\nTotal quiz wins: **{}**",
            message.author.id, round.title, round.url, wins
        ))
        .color(crate::responses::COLOR_SUCCESS);
    message
        .channel_id
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hangman(initiator: u64) -> RunningGame {
        RunningGame {
            initiator,
            channel_id: 10,
            state: GameState::Hangman(Hangman::new("odin")),
        }
    }

    #[test]
    fn test_one_game_per_kind() {
        let games = GameRegistry::new();
        games.start(1, hangman(5)).unwrap();
        assert_eq!(
            games.start(1, hangman(6)).unwrap_err(),
            GameError::AlreadyRunning(GameKind::Hangman)
        );
        // Other guilds and other kinds are independent
        games.start(2, hangman(6)).unwrap();
        games
            .start(
                1,
                RunningGame {
                    initiator: 5,
                    channel_id: 10,
                    state: GameState::MusicQuiz(QuizRound::new("Answers", "u")),
                },
            )
            .unwrap();

        assert_eq!(games.stop(1, GameKind::Hangman).unwrap().initiator, 5);
        assert!(!games.is_running(1, GameKind::Hangman));
        assert_eq!(
            games.stop(1, GameKind::Hangman).unwrap_err(),
            GameError::NotRunning(GameKind::Hangman)
        );
    }

    #[test]
    fn test_with_game_removes_finished() {
        let games = GameRegistry::new();
        games.start(1, hangman(5)).unwrap();

        let masked = games
            .with_game(1, GameKind::Hangman, |game| match &mut game.state {
                GameState::Hangman(h) => {
                    h.guess("o");
                    (h.masked(), false)
                }
                _ => unreachable!(),
            })
            .unwrap();
        assert_eq!(masked, "o _ _ _");
        assert!(games.is_running(1, GameKind::Hangman));

        games.with_game(1, GameKind::Hangman, |_| ((), true)).unwrap();
        assert!(!games.is_running(1, GameKind::Hangman));
    }

    #[test]
    fn test_stale_quiz_round_does_not_finish_new_one() {
        let games = GameRegistry::new();
        let old = QuizRound::new("Old", "u");
        let old_id = old.id;
        games
            .start(1, RunningGame { initiator: 5, channel_id: 10, state: GameState::MusicQuiz(old) })
            .unwrap();
        games.stop(1, GameKind::MusicQuiz).unwrap();

        let fresh = QuizRound::new("New", "u");
        let fresh_id = fresh.id;
        games
            .start(1, RunningGame { initiator: 5, channel_id: 10, state: GameState::MusicQuiz(fresh) })
            .unwrap();

        assert!(games.finish_quiz_round(1, old_id).is_none());
        assert!(games.finish_quiz_round(1, fresh_id).is_some());
        assert!(!games.is_running(1, GameKind::MusicQuiz));
    }
}
