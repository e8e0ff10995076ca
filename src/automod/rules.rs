//! Message predicates, one per automod rule.

const INVITE_MARKERS: &[&str] = &["discord.gg/", "discord.com/invite/", "discordapp.com/invite/"];

const DISCORD_DOMAINS: &[&str] = &[
    "discord.com",
    "discord.gg",
    "discordapp.com",
    "discordapp.net",
    "discord.media",
];

pub fn contains_bad_word(content: &str, bad_words: &[String]) -> bool {
    if bad_words.is_empty() {
        return false;
    }
    let lowered = content.to_lowercase();
    bad_words
        .iter()
        .filter(|w| !w.is_empty())
        .any(|w| lowered.contains(w.as_str()))
}

pub fn contains_invite(content: &str) -> bool {
    let lowered = content.to_lowercase();
    INVITE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Hosts of every URL-looking token, lowercased and without a leading `www.`.
pub fn link_hosts(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter_map(|token| {
            let token = token.trim_matches(|c: char| matches!(c, '<' | '>' | '(' | ')' | '"' | '\''));
            let lowered = token.to_lowercase();
            let rest = if let Some(idx) = lowered.find("://") {
                let scheme = &lowered[..idx];
                if scheme != "http" && scheme != "https" {
                    return None;
                }
                lowered[idx + 3..].to_string()
            } else if lowered.starts_with("www.") {
                lowered
            } else {
                return None;
            };
            let host = rest
                .split(['/', '?', '#'])
                .next()
                .unwrap_or_default()
                .rsplit('@')
                .next()
                .unwrap_or_default()
                .split(':')
                .next()
                .unwrap_or_default();
            let host = host.strip_prefix("www.").unwrap_or(host);
            if host.is_empty() {
                None
            } else {
                Some(host.to_string())
            }
        })
        .collect()
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.");
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}

/// True when the message carries a link that is neither allow-listed nor an exempt Discord domain.
pub fn contains_disallowed_link(content: &str, allowlist: &[String], allow_discord: bool) -> bool {
    link_hosts(content).iter().any(|host| {
        let exempt = allow_discord && DISCORD_DOMAINS.iter().any(|d| host_matches(host, d));
        let allowed = allowlist.iter().any(|d| host_matches(host, d));
        !exempt && !allowed
    })
}

/// Capital letters make up at least half of the letters.
pub fn is_excessive_caps(content: &str) -> bool {
    let letters = content.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return false;
    }
    let upper = content.chars().filter(|c| c.is_uppercase()).count();
    upper * 2 >= letters
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1F5FF
        | 0x1F600..=0x1F64F
        | 0x1F680..=0x1F6FF
        | 0x1F900..=0x1F9FF
        | 0x1FA70..=0x1FAFF
        | 0x2600..=0x27BF)
}

/// Custom `<:name:id>` / `<a:name:id>` emotes plus unicode emoji.
pub fn count_emotes(content: &str) -> usize {
    let mut custom = 0;
    let mut rest = content;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else { break };
        let inner = &after[..end];
        let body = inner.strip_prefix('a').unwrap_or(inner);
        if let Some(body) = body.strip_prefix(':') {
            if let Some((name, id)) = body.split_once(':') {
                if !name.is_empty() && !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                    custom += 1;
                }
            }
        }
        rest = &after[end + 1..];
    }
    custom + content.chars().filter(|c| is_emoji(*c)).count()
}

pub fn count_spoilers(content: &str) -> usize {
    content.matches("||").count() / 2
}

/// User and role mentions plus `@everyone` / `@here`.
pub fn count_mentions(content: &str) -> usize {
    let mut count = 0;
    let mut rest = content;
    while let Some(start) = rest.find("<@") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('>') else { break };
        let id = after[..end].trim_start_matches(['!', '&']);
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            count += 1;
        }
        rest = &after[end + 1..];
    }
    count + content.matches("@everyone").count() + content.matches("@here").count()
}

/// Combining marks stacked onto base characters.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F
        | 0x0483..=0x0489
        | 0x1AB0..=0x1AFF
        | 0x1DC0..=0x1DFF
        | 0x20D0..=0x20FF
        | 0xFE20..=0xFE2F)
}

pub fn is_zalgo(content: &str) -> bool {
    content.chars().any(is_combining_mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_words() {
        let words = vec!["darn".to_string()];
        assert!(contains_bad_word("Well DARN it", &words));
        assert!(!contains_bad_word("well done", &words));
        assert!(!contains_bad_word("anything", &[]));
    }

    #[test]
    fn test_invites() {
        assert!(contains_invite("join https://discord.gg/abc"));
        assert!(contains_invite("discord.com/invite/xyz"));
        assert!(!contains_invite("discord is fun"));
    }

    #[test]
    fn test_link_hosts() {
        let hosts = link_hosts("see https://www.Example.com/page?x=1 and www.rust-lang.org plus ftp://x.y");
        assert_eq!(hosts, vec!["example.com".to_string(), "rust-lang.org".to_string()]);
        assert!(link_hosts("no links here.").is_empty());
    }

    #[test]
    fn test_disallowed_links() {
        let allow = vec!["youtube.com".to_string()];
        assert!(!contains_disallowed_link("https://m.youtube.com/watch", &allow, false));
        assert!(contains_disallowed_link("https://evil.example", &allow, true));
        assert!(!contains_disallowed_link("https://discord.com/channels/1", &[], true));
        assert!(contains_disallowed_link("https://discord.com/channels/1", &[], false));
        assert!(!contains_disallowed_link("plain text", &[], false));
    }

    #[test]
    fn test_caps() {
        // 6 of 10 letters uppercase
        assert!(is_excessive_caps("HELLOWorld"));
        assert!(!is_excessive_caps("Hello world, how are you"));
        // 3 of 5 letters
        assert!(is_excessive_caps("HELlo"));
        assert!(is_excessive_caps("OK"));
        assert!(!is_excessive_caps("Okay?"));
        assert!(!is_excessive_caps("123 !!! :)"));
        assert!(is_excessive_caps("STOP DOING THAT"));
    }

    #[test]
    fn test_emotes() {
        assert_eq!(count_emotes("<:pog:123> <a:dance:456> 😀🔥"), 4);
        assert_eq!(count_emotes("<not an emote> <:bad:abc>"), 0);
    }

    #[test]
    fn test_spoilers() {
        assert_eq!(count_spoilers("||a|| ||b|| ||c"), 2);
        assert_eq!(count_spoilers("nothing"), 0);
    }

    #[test]
    fn test_mentions() {
        assert_eq!(count_mentions("<@1> <@!2> <@&3> @everyone"), 4);
        assert_eq!(count_mentions("<@abc> hello"), 0);
    }

    #[test]
    fn test_zalgo() {
        assert!(is_zalgo("h\u{0336}e\u{0337}l\u{0338}"));
        assert!(!is_zalgo("héllo wörld"));
    }
}
