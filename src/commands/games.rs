use crate::games::hangman::{GuessOutcome, Hangman};
use crate::games::quiz::{QuizRound, ROUND_SECS};
use crate::games::{GameError, GameKind, GameState, RunningGame};
use crate::music::player;
use crate::responses::{self, COLOR_INFO, COLOR_SUCCESS, COLOR_WARN};
use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{info, warn};

/// The initiator, or anyone allowed to manage messages, may end a game early.
async fn can_stop(ctx: Context<'_>, initiator: u64) -> bool {
    if ctx.author().id.get() == initiator {
        return true;
    }
    let Some(member) = ctx.author_member().await else {
        return false;
    };
    ctx.guild()
        .map(|guild| guild.member_permissions(&member).manage_messages())
        .unwrap_or(false)
}

fn hangman_embed(title: &str, game: &Hangman, color: u32) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .description(game.render())
        .color(color)
}

/// Play hangman
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("hangman_start", "hangman_guess", "hangman_stop"),
    guild_only,
    category = "Fun"
)]
pub async fn hangman(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Start a round of hangman
#[poise::command(slash_command, prefix_command, rename = "start")]
pub async fn hangman_start(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let game = Hangman::random();
    let embed = hangman_embed("🪢 Hangman", &game, COLOR_INFO)
        .footer(serenity::CreateEmbedFooter::new("Guess with /hangman guess <letter or word>"));

    let running = RunningGame {
        initiator: ctx.author().id.get(),
        channel_id: ctx.channel_id().get(),
        state: GameState::Hangman(game),
    };
    if let Err(e) = ctx.data().games.start(guild_id.get(), running) {
        return responses::send_error(&ctx, e.to_string()).await;
    }
    info!("Games: hangman started in guild {} by {}", guild_id, ctx.author().id);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Guess a letter or the whole word
#[poise::command(slash_command, prefix_command, rename = "guess")]
pub async fn hangman_guess(
    ctx: Context<'_>,
    #[description = "A letter or the whole word"] guess: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let result = ctx
        .data()
        .games
        .with_game(guild_id.get(), GameKind::Hangman, |running| match &mut running.state {
            GameState::Hangman(game) => {
                let outcome = game.guess(&guess);
                (Some((outcome, game.clone())), outcome.is_over())
            }
            _ => (None, false),
        });

    let (outcome, game) = match result {
        Ok(Some(played)) => played,
        Ok(None) | Err(GameError::NotRunning(_)) => {
            return responses::send_error(&ctx, "No hangman game is running. Start one with `/hangman start`.").await;
        }
        Err(e) => return responses::send_error(&ctx, e.to_string()).await,
    };

    let embed = match outcome {
        GuessOutcome::Invalid => {
            return responses::send_error(&ctx, "Guess a single letter or the whole word.").await;
        }
        GuessOutcome::AlreadyGuessed => {
            return responses::send_error(&ctx, "That letter was already guessed.").await;
        }
        GuessOutcome::Hit => hangman_embed("✅ Good guess!", &game, COLOR_INFO),
        GuessOutcome::Miss => hangman_embed("❌ Nope!", &game, COLOR_WARN),
        GuessOutcome::Won => {
            info!("Games: {} won hangman in guild {}", ctx.author().id, guild_id);
            hangman_embed(&format!("🏆 {} solved it!", ctx.author().name), &game, COLOR_SUCCESS)
        }
        GuessOutcome::Lost => hangman_embed(
            &format!("💀 Game over! The word was **{}**", game.word()),
            &game,
            responses::COLOR_ERROR,
        ),
    };
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Give up the current hangman game
#[poise::command(slash_command, prefix_command, rename = "stop")]
pub async fn hangman_stop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let initiator = ctx
        .data()
        .games
        .with_game(guild_id.get(), GameKind::Hangman, |g| (g.initiator, false));
    let initiator = match initiator {
        Ok(initiator) => initiator,
        Err(e) => return responses::send_error(&ctx, e.to_string()).await,
    };
    if !can_stop(ctx, initiator).await {
        return responses::send_error(&ctx, "Only the player who started the game can stop it.").await;
    }

    match ctx.data().games.stop(guild_id.get(), GameKind::Hangman) {
        Ok(RunningGame {
            state: GameState::Hangman(game),
            ..
        }) => {
            ctx.say(format!("🛑 Hangman stopped. The word was **{}**.", game.word()))
                .await?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => responses::send_error(&ctx, e.to_string()).await,
    }
}

/// Guess the song playing in voice
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("quiz_start", "quiz_stop"),
    guild_only,
    category = "Fun"
)]
pub async fn musicquiz(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Reveals the answer once the round runs out, unless someone already won it.
fn spawn_round_timeout(
    ctx: serenity::Context,
    data: Data,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    round: uuid::Uuid,
) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(ROUND_SECS)).await;
        let Some(RunningGame {
            state: GameState::MusicQuiz(expired),
            ..
        }) = data.games.finish_quiz_round(guild_id.get(), round)
        else {
            return;
        };

        info!("Games: music quiz round timed out in guild {}", guild_id);
        if let Ok(manager) = player::manager(&ctx).await {
            if let Some(call) = manager.get(guild_id) {
                if let Err(e) = call.lock().await.queue().skip() {
                    warn!("Games: failed to skip quiz track: {}", e);
                }
            }
        }
        let embed = serenity::CreateEmbed::new()
            .title("⏰ Time's up!")
            .description(format!("Nobody got it. It was **[{}]({})**", expired.title, expired.url))
            .color(COLOR_WARN);
        if let Err(e) = channel_id
            .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
            .await
        {
            warn!("Games: failed to reveal quiz answer: {}", e);
        }
    });
}

/// Play a random song from this server's playlists
#[poise::command(
    slash_command,
    prefix_command,
    rename = "start",
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn quiz_start(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let sctx = ctx.serenity_context();
    if ctx.data().games.is_running(guild_id.get(), GameKind::MusicQuiz) {
        return responses::send_error(&ctx, GameError::AlreadyRunning(GameKind::MusicQuiz).to_string()).await;
    }
    let Some(voice) = player::user_channel(sctx, guild_id, ctx.author().id) else {
        return responses::send_error(&ctx, "You must be in a voice channel to use this command.").await;
    };
    if let Some(call) = player::manager(sctx).await?.get(guild_id) {
        if !call.lock().await.queue().is_empty() {
            return responses::send_error(&ctx, "Music is already playing. Stop it first.").await;
        }
    }
    ctx.defer().await?;

    let gid = guild_id.to_string();
    let Some(song) = ctx
        .data()
        .db
        .run_blocking(move |db| db.random_guild_song(&gid))
        .await?
    else {
        return responses::send_error(&ctx, "This server has no playlist songs to quiz on.").await;
    };

    let round = QuizRound::new(&song.title, &song.url);
    let round_id = round.id;
    let running = RunningGame {
        initiator: ctx.author().id.get(),
        channel_id: ctx.channel_id().get(),
        state: GameState::MusicQuiz(round),
    };
    if let Err(e) = ctx.data().games.start(guild_id.get(), running) {
        return responses::send_error(&ctx, e.to_string()).await;
    }

    let queued = async {
        player::join(sctx, ctx.data(), guild_id, voice, ctx.channel_id()).await?;
        player::enqueue(sctx, ctx.data(), guild_id, &song.url, ctx.author().id.get()).await
    }
    .await;
    if let Err(e) = queued {
        warn!("Games: quiz song '{}' failed to play: {:#}", song.title, e);
        let _ = ctx.data().games.stop(guild_id.get(), GameKind::MusicQuiz);
        return responses::send_error(&ctx, "Couldn't play the quiz song, try again.").await;
    }

    spawn_round_timeout(sctx.clone(), ctx.data().clone(), guild_id, ctx.channel_id(), round_id);
    info!("Games: music quiz started in guild {}", guild_id);
    let embed = serenity::CreateEmbed::new()
        .title("🎧 Music Quiz")
        .description(format!(
            "Listen closely! First to type the song title in this channel wins.\nYou have **{}** seconds.",
            ROUND_SECS
        ))
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// End the running music quiz
#[poise::command(slash_command, prefix_command, rename = "stop")]
pub async fn quiz_stop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let initiator = ctx
        .data()
        .games
        .with_game(guild_id.get(), GameKind::MusicQuiz, |g| (g.initiator, false));
    let initiator = match initiator {
        Ok(initiator) => initiator,
        Err(e) => return responses::send_error(&ctx, e.to_string()).await,
    };
    if !can_stop(ctx, initiator).await {
        return responses::send_error(&ctx, "Only the player who started the quiz can stop it.").await;
    }

    if let Ok(RunningGame {
        state: GameState::MusicQuiz(round),
        ..
    }) = ctx.data().games.stop(guild_id.get(), GameKind::MusicQuiz)
    {
        if let Some(call) = player::manager(ctx.serenity_context()).await?.get(guild_id) {
            call.lock().await.queue().skip()?;
        }
        ctx.say(format!("🛑 Quiz stopped. It was **{}**.", round.title)).await?;
    }
    Ok(())
}
