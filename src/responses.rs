use crate::config::{DISCORD_EMBED_LIMIT, DISCORD_MESSAGE_LIMIT};
use crate::{Context, Error};
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter};

pub const COLOR_INFO: u32 = 0x5865F2;
pub const COLOR_SUCCESS: u32 = 0x57F287;
pub const COLOR_WARN: u32 = 0xFEE75C;
pub const COLOR_ERROR: u32 = 0xED4245;

pub const GENERIC_ERROR: &str = "An error occurred while running this command, please try again later.";

/// Cuts `s` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Splits on char boundaries into pieces of at most `max_bytes` bytes.
pub fn chunk(content: &str, max_bytes: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = content;
    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        // Prefer breaking on a newline in the back half of the chunk
        if let Some(nl) = rest[..cut].rfind('\n').filter(|nl| *nl >= cut / 2) {
            cut = nl + 1;
        }
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

pub fn error_embed(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Error")
        .description(message)
        .color(COLOR_ERROR)
}

pub fn success_embed(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new().description(message).color(COLOR_SUCCESS)
}

pub async fn send_error(ctx: &Context<'_>, message: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .embed(error_embed(message))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

pub async fn send_success(ctx: &Context<'_>, message: impl Into<String>) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(success_embed(message)))
        .await?;
    Ok(())
}

/// Sends `content` as plain text, one embed, or a numbered run of embeds depending on length.
pub async fn send_long(ctx: &Context<'_>, title: &str, content: &str) -> Result<(), Error> {
    if content.len() <= DISCORD_MESSAGE_LIMIT {
        ctx.say(content).await?;
    } else if content.len() <= DISCORD_EMBED_LIMIT {
        let embed = CreateEmbed::new()
            .title(title)
            .description(content)
            .color(COLOR_INFO)
            .footer(CreateEmbedFooter::new("Bahamut"));
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
    } else {
        let chunks = chunk(content, DISCORD_EMBED_LIMIT - 100);
        for (i, part) in chunks.iter().enumerate() {
            let embed = CreateEmbed::new()
                .title(format!("{} (Part {}/{})", title, i + 1, chunks.len()))
                .description(*part)
                .color(COLOR_INFO);
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_chunk_respects_boundaries() {
        let text = "é".repeat(10);
        let parts = chunk(&text, 5);
        assert!(parts.iter().all(|p| p.len() <= 5));
        assert_eq!(parts.concat(), text);

        let lines = "aaaa\nbbbb\ncccc";
        assert_eq!(chunk(lines, 8), vec!["aaaa\n", "bbbb\n", "cccc"]);
        assert!(chunk("", 5).is_empty());
    }
}
