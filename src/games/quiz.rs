use uuid::Uuid;

/// Seconds a round stays open before the answer is revealed.
pub const ROUND_SECS: u64 = 30;

/// Lowercased alphanumeric words, with bracketed parts such as `(Official Video)` dropped.
pub fn normalize_title(title: &str) -> String {
    let mut depth = 0usize;
    let mut kept = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => kept.push(c),
            _ => {}
        }
    }
    kept.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct QuizRound {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    answer: String,
}

impl QuizRound {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            url: url.to_string(),
            answer: normalize_title(title),
        }
    }

    /// A message wins when its words contain the song title.
    pub fn is_correct(&self, message: &str) -> bool {
        if self.answer.is_empty() {
            return false;
        }
        let guess = format!(" {} ", normalize_title(message));
        guess.contains(&format!(" {} ", self.answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Answers (Official Video)"), "answers");
        assert_eq!(normalize_title("Dragonsong [HD] - Remastered!"), "dragonsong remastered");
        assert_eq!(normalize_title("  "), "");
    }

    #[test]
    fn test_answer_matching() {
        let round = QuizRound::new("Answers (Official Video)", "https://example.com/a");
        assert!(round.is_correct("it's ANSWERS!"));
        assert!(round.is_correct("answers"));
        assert!(!round.is_correct("answersss"));
        assert!(!round.is_correct("no idea"));

        let empty = QuizRound::new("(untitled)", "https://example.com/b");
        assert!(!empty.is_correct("anything"));
    }
}
