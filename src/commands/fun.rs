use crate::responses::{self, COLOR_INFO};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use rand::seq::SliceRandom;
use rand::Rng;

const ANSWERS: &[&str] = &[
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes, definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

const MAX_DICE: u32 = 50;
const MAX_SIDES: u32 = 1000;

/// Parses `NdM`, `dM` or a bare `M` into (count, sides).
fn parse_dice(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim().to_lowercase();
    let (count, sides) = match raw.split_once('d') {
        Some(("", sides)) => (1, sides.parse().ok()?),
        Some((count, sides)) => (count.parse().ok()?, sides.parse().ok()?),
        None => (1, raw.parse().ok()?),
    };
    if (1..=MAX_DICE).contains(&count) && (2..=MAX_SIDES).contains(&sides) {
        Some((count, sides))
    } else {
        None
    }
}

/// Ask the magic 8-ball
#[poise::command(slash_command, prefix_command, rename = "8ball", category = "Fun")]
pub async fn eightball(
    ctx: Context<'_>,
    #[description = "Your question"]
    #[rest]
    question: String,
) -> Result<(), Error> {
    let answer = ANSWERS.choose(&mut rand::thread_rng()).copied().unwrap_or("Ask again later.");
    let embed = serenity::CreateEmbed::new()
        .title("🎱 Magic 8-ball")
        .field("Question", responses::truncate(&question, 1000), false)
        .field("Answer", answer, false)
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Flip a coin
#[poise::command(slash_command, prefix_command, aliases("flip"), category = "Fun")]
pub async fn coinflip(ctx: Context<'_>) -> Result<(), Error> {
    let heads = rand::thread_rng().gen_bool(0.5);
    ctx.say(if heads { "🪙 Heads!" } else { "🪙 Tails!" }).await?;
    Ok(())
}

/// Roll dice, e.g. 2d6 or 20
#[poise::command(slash_command, prefix_command, aliases("dice"), category = "Fun")]
pub async fn roll(
    ctx: Context<'_>,
    #[description = "Dice such as 2d6, d20 or 100"] dice: Option<String>,
) -> Result<(), Error> {
    let dice = dice.unwrap_or_else(|| "d6".to_string());
    let Some((count, sides)) = parse_dice(&dice) else {
        return responses::send_error(
            &ctx,
            format!("Use `NdM` with up to {} dice of 2-{} sides.", MAX_DICE, MAX_SIDES),
        )
        .await;
    };

    let rolls: Vec<u32> = {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| rng.gen_range(1..=sides)).collect()
    };
    let total: u32 = rolls.iter().sum();
    let message = if rolls.len() == 1 {
        format!("🎲 You rolled **{}** (d{})", total, sides)
    } else {
        let shown = rolls.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
        format!("🎲 {}d{}: {} = **{}**", count, sides, shown, total)
    };
    ctx.say(message).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dice() {
        assert_eq!(parse_dice("2d6"), Some((2, 6)));
        assert_eq!(parse_dice("D20"), Some((1, 20)));
        assert_eq!(parse_dice("100"), Some((1, 100)));
        assert_eq!(parse_dice("0d6"), None);
        assert_eq!(parse_dice("51d6"), None);
        assert_eq!(parse_dice("d1"), None);
        assert_eq!(parse_dice("dice"), None);
    }
}
