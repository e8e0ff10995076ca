//! Per-guild music sessions layered over the songbird queue.
//!
//! Songbird owns playback and the queue itself. A [`MusicSession`] keeps what
//! songbird does not: who requested each track, the repeat mode, the
//! vote-skip tally for the current track and the pending idle-leave timer.

pub mod events;
pub mod player;

use poise::serenity_prelude as serenity;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, poise::ChoiceParameter)]
pub enum RepeatMode {
    #[default]
    #[name = "off"]
    Off,
    #[name = "track"]
    Track,
    #[name = "queue"]
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub requested_by: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Passed { votes: usize, needed: usize },
    Recorded { votes: usize, needed: usize },
    AlreadyVoted { votes: usize, needed: usize },
}

/// Votes needed to skip with `listeners` non-bot members in the channel.
pub fn votes_needed(listeners: usize) -> usize {
    listeners.saturating_sub(1).div_ceil(2)
}

/// Unique voters for one track. Moving on to another track clears the tally.
#[derive(Debug, Default)]
pub struct VoteSkip {
    track: Option<Uuid>,
    voters: HashSet<u64>,
}

impl VoteSkip {
    pub fn vote(&mut self, track: Uuid, user_id: u64, listeners: usize) -> VoteOutcome {
        if self.track != Some(track) {
            self.track = Some(track);
            self.voters.clear();
        }
        let needed = votes_needed(listeners);
        let fresh = self.voters.insert(user_id);
        let votes = self.voters.len();
        if !fresh {
            VoteOutcome::AlreadyVoted { votes, needed }
        } else if votes >= needed {
            VoteOutcome::Passed { votes, needed }
        } else {
            VoteOutcome::Recorded { votes, needed }
        }
    }

    pub fn reset(&mut self) {
        self.track = None;
        self.voters.clear();
    }
}

#[derive(Debug, Default)]
pub struct MusicSession {
    pub tracks: HashMap<Uuid, TrackInfo>,
    pub repeat: RepeatMode,
    pub votes: VoteSkip,
    /// Channel that receives now-playing announcements.
    pub text_channel: Option<serenity::ChannelId>,
    /// Track event handlers are registered on the call.
    pub(crate) attached: bool,
    leave_timer: Option<JoinHandle<()>>,
}

impl MusicSession {
    pub fn cancel_leave(&mut self) -> bool {
        match self.leave_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for MusicSession {
    fn drop(&mut self) {
        self.cancel_leave();
    }
}

/// All music sessions, keyed by guild.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<u64, MusicSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the guild's session, creating it if needed.
    pub fn with_session<R>(&self, guild_id: u64, f: impl FnOnce(&mut MusicSession) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        f(sessions.entry(guild_id).or_default())
    }

    /// Like [`with_session`](Self::with_session) but never creates a session.
    pub fn existing<R>(&self, guild_id: u64, f: impl FnOnce(&mut MusicSession) -> R) -> Option<R> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get_mut(&guild_id).map(f)
    }

    pub fn guilds(&self) -> Vec<u64> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn exists(&self, guild_id: u64) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&guild_id)
    }

    /// Drops the session; any pending leave timer is aborted.
    pub fn remove(&self, guild_id: u64) {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&guild_id);
        if removed.is_some() {
            debug!("Music: session for guild {} closed", guild_id);
        }
    }

    pub fn track(&self, guild_id: u64, uuid: Uuid) -> Option<TrackInfo> {
        self.existing(guild_id, |s| s.tracks.get(&uuid).cloned())
            .flatten()
    }

    pub fn set_leave_timer(&self, guild_id: u64, timer: JoinHandle<()>) {
        self.with_session(guild_id, |s| {
            s.cancel_leave();
            s.leave_timer = Some(timer);
        });
    }

    pub fn cancel_leave(&self, guild_id: u64) -> bool {
        self.existing(guild_id, |s| s.cancel_leave())
            .unwrap_or(false)
    }
}

/// Parses `90`, `1:30`, `1:02:03` or a humantime span such as `1m30s`.
pub fn parse_position(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.chars().all(|c| c.is_ascii_digit() || c == ':') {
        let mut secs = 0u64;
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        for part in parts {
            secs = secs.checked_mul(60)?.checked_add(part.parse::<u64>().ok()?)?;
        }
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).ok()
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_votes_needed() {
        assert_eq!(votes_needed(1), 0);
        assert_eq!(votes_needed(2), 1);
        assert_eq!(votes_needed(3), 1);
        assert_eq!(votes_needed(4), 2);
        assert_eq!(votes_needed(5), 2);
        assert_eq!(votes_needed(6), 3);
    }

    #[test]
    fn test_vote_skip_needs_unique_voters() {
        let mut votes = VoteSkip::default();
        let track = Uuid::new_v4();

        // Five listeners: two votes needed
        assert_eq!(
            votes.vote(track, 1, 5),
            VoteOutcome::Recorded { votes: 1, needed: 2 }
        );
        assert_eq!(
            votes.vote(track, 1, 5),
            VoteOutcome::AlreadyVoted { votes: 1, needed: 2 }
        );
        assert_eq!(
            votes.vote(track, 2, 5),
            VoteOutcome::Passed { votes: 2, needed: 2 }
        );
    }

    #[test]
    fn test_vote_skip_resets_on_new_track() {
        let mut votes = VoteSkip::default();
        votes.vote(Uuid::new_v4(), 1, 7);
        let next = Uuid::new_v4();
        assert_eq!(
            votes.vote(next, 1, 7),
            VoteOutcome::Recorded { votes: 1, needed: 3 }
        );
    }

    #[tokio::test]
    async fn test_leave_timer_is_aborted_on_cancel() {
        let registry = SessionRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });
        registry.set_leave_timer(1, timer);

        assert!(registry.cancel_leave(1));
        assert!(!registry.cancel_leave(1));
        // The sender was dropped with the aborted task
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_position("1:30"), Some(Duration::from_secs(90)));
        assert_eq!(parse_position("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_position("2m 5s"), Some(Duration::from_secs(125)));
        assert_eq!(parse_position("1::2"), None);
        assert_eq!(parse_position("soon"), None);
        assert_eq!(parse_position("999999999999999999:0"), None);
        assert_eq!(parse_position("99999999999999999999"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }
}
