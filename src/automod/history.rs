use crate::cache::BoundedCache;
use std::collections::VecDeque;

/// How far back identical messages are counted.
pub const REPEAT_WINDOW_SECS: i64 = 30;
/// Kept per author; anything older than the window is dropped on insert anyway.
const MAX_PER_AUTHOR: usize = 16;

#[derive(Debug, Clone)]
struct SeenMessage {
    content: String,
    timestamp: i64,
}

/// Recent messages per (guild, author), used by the repeated-message rule.
#[derive(Clone)]
pub struct MessageHistory {
    cache: BoundedCache<(u64, u64), VecDeque<SeenMessage>>,
}

fn normalize(content: &str) -> String {
    content.trim().to_lowercase()
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new(capacity),
        }
    }

    /// Records a message and returns how many identical messages (itself included)
    /// the author sent in the window ending at `timestamp`.
    pub fn record(&self, guild_id: u64, user_id: u64, content: &str, timestamp: i64) -> usize {
        let content = normalize(content);
        let window_start = timestamp - REPEAT_WINDOW_SECS;
        self.cache.update((guild_id, user_id), VecDeque::new, |seen| {
            while seen.front().is_some_and(|m| m.timestamp < window_start) {
                seen.pop_front();
            }
            seen.push_back(SeenMessage {
                content: content.clone(),
                timestamp,
            });
            while seen.len() > MAX_PER_AUTHOR {
                seen.pop_front();
            }
            seen.iter()
                .filter(|m| m.timestamp >= window_start && m.content == content)
                .count()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_duplicates_in_window() {
        let history = MessageHistory::new(8);
        assert_eq!(history.record(1, 1, "spam", 100), 1);
        assert_eq!(history.record(1, 1, "SPAM ", 105), 2);
        assert_eq!(history.record(1, 1, "other", 106), 1);
        assert_eq!(history.record(1, 1, "spam", 110), 3);
        // A different author does not share the tally
        assert_eq!(history.record(1, 2, "spam", 110), 1);
    }

    #[test]
    fn test_window_is_anchored_on_current_message() {
        let history = MessageHistory::new(8);
        history.record(1, 1, "spam", 0);
        history.record(1, 1, "spam", 10);
        // The window ending at 45 starts at 15, so both earlier messages have expired
        assert_eq!(history.record(1, 1, "spam", 45), 1);
        assert_eq!(history.record(1, 1, "spam", 50), 2);
    }
}
