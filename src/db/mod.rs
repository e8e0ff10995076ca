pub mod schema;

use crate::config::Config;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One persisted settings override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRow {
    pub setting: String,
    pub val: String,
    pub val_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedCharacter {
    pub character_id: u64,
    pub name: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRecord {
    pub id: i64,
    pub guild_id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub id: i64,
    pub playlist_id: i64,
    pub title: String,
    pub url: String,
    pub position: i64,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(&config.database_url)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn();
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a synchronous database closure on the blocking thread pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow::anyhow!("Database task panicked: {}", e))?
    }

    // --- Guild Settings ---

    pub fn get_guild_settings(&self, guild_id: &str) -> anyhow::Result<Vec<SettingRow>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT setting, val, val_type FROM guild_settings WHERE guild_id = ?1")?;
        let rows = stmt.query_map([guild_id], |row| {
            Ok(SettingRow {
                setting: row.get(0)?,
                val: row.get(1)?,
                val_type: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn set_guild_setting(
        &self,
        guild_id: &str,
        setting: &str,
        val: &str,
        val_type: &str,
    ) -> anyhow::Result<()> {
        debug!("Database: Setting {} = {} for guild {}", setting, val, guild_id);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO guild_settings (guild_id, setting, val, val_type, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(guild_id, setting) DO UPDATE SET val = ?3, val_type = ?4, updated_at = CURRENT_TIMESTAMP",
            (guild_id, setting, val, val_type),
        )?;
        Ok(())
    }

    pub fn delete_guild_setting(&self, guild_id: &str, setting: &str) -> anyhow::Result<usize> {
        let conn = self.conn();
        let count = conn.execute(
            "DELETE FROM guild_settings WHERE guild_id = ?1 AND setting = ?2",
            (guild_id, setting),
        )?;
        Ok(count)
    }

    /// Guild ids whose `setting` currently equals `val`.
    pub fn find_guilds_with_setting(&self, setting: &str, val: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT guild_id FROM guild_settings WHERE setting = ?1 AND val = ?2 ORDER BY guild_id",
        )?;
        let rows = stmt.query_map((setting, val), |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // --- Stats ---

    pub fn get_user_stat(&self, guild_id: &str, user_id: &str, stat: &str) -> anyhow::Result<i64> {
        let conn = self.conn();
        let val = conn
            .query_row(
                "SELECT val FROM guild_user_stats WHERE guild_id = ?1 AND user_id = ?2 AND stat = ?3",
                (guild_id, user_id, stat),
                |row| row.get(0),
            )
            .optional()?;
        Ok(val.unwrap_or(0))
    }

    pub fn add_user_stat(
        &self,
        guild_id: &str,
        user_id: &str,
        stat: &str,
        amount: i64,
    ) -> anyhow::Result<i64> {
        let conn = self.conn();
        let val = conn.query_row(
            "INSERT INTO guild_user_stats (guild_id, user_id, stat, val) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(guild_id, user_id, stat) DO UPDATE SET val = val + ?4
             RETURNING val",
            (guild_id, user_id, stat, amount),
            |row| row.get(0),
        )?;
        Ok(val)
    }

    /// Subtracts `amount`, never storing less than 1.
    pub fn sub_user_stat(
        &self,
        guild_id: &str,
        user_id: &str,
        stat: &str,
        amount: i64,
    ) -> anyhow::Result<i64> {
        let conn = self.conn();
        let val = conn.query_row(
            "INSERT INTO guild_user_stats (guild_id, user_id, stat, val) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(guild_id, user_id, stat) DO UPDATE SET val = MAX(val - ?4, 1)
             RETURNING val",
            (guild_id, user_id, stat, amount),
            |row| row.get(0),
        )?;
        Ok(val)
    }

    pub fn top_user_stat(
        &self,
        guild_id: &str,
        stat: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, val FROM guild_user_stats WHERE guild_id = ?1 AND stat = ?2
             ORDER BY val DESC, user_id ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map((guild_id, stat, limit), |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn add_guild_stat(&self, guild_id: &str, stat: &str, amount: i64) -> anyhow::Result<i64> {
        let conn = self.conn();
        let val = conn.query_row(
            "INSERT INTO guild_stats (guild_id, stat, val) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id, stat) DO UPDATE SET val = val + ?3
             RETURNING val",
            (guild_id, stat, amount),
            |row| row.get(0),
        )?;
        Ok(val)
    }

    pub fn get_guild_stat(&self, guild_id: &str, stat: &str) -> anyhow::Result<i64> {
        let conn = self.conn();
        let val = conn
            .query_row(
                "SELECT val FROM guild_stats WHERE guild_id = ?1 AND stat = ?2",
                (guild_id, stat),
                |row| row.get(0),
            )
            .optional()?;
        Ok(val.unwrap_or(0))
    }

    // --- Levels ---

    pub fn get_level(&self, guild_id: &str, user_id: &str) -> anyhow::Result<Option<(u32, u64)>> {
        let conn = self.conn();
        let row: Option<(u32, i64)> = conn
            .query_row(
                "SELECT level, xp FROM guild_user_levels WHERE guild_id = ?1 AND user_id = ?2",
                (guild_id, user_id),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(level, xp)| (level, xp.max(0) as u64)))
    }

    pub fn save_level(&self, guild_id: &str, user_id: &str, level: u32, xp: u64) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO guild_user_levels (guild_id, user_id, level, xp) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET level = ?3, xp = ?4",
            (guild_id, user_id, level, xp as i64),
        )?;
        Ok(())
    }

    pub fn top_levels(&self, guild_id: &str, limit: usize) -> anyhow::Result<Vec<(String, u32, u64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, level, xp FROM guild_user_levels WHERE guild_id = ?1
             ORDER BY level DESC, xp DESC, user_id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map((guild_id, limit), |row| {
            let xp: i64 = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, xp.max(0) as u64))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// 1-based leaderboard position for the given level/xp pair.
    pub fn level_rank(&self, guild_id: &str, level: u32, xp: u64) -> anyhow::Result<u64> {
        let conn = self.conn();
        let ahead: i64 = conn.query_row(
            "SELECT COUNT(*) FROM guild_user_levels
             WHERE guild_id = ?1 AND (level > ?2 OR (level = ?2 AND xp > ?3))",
            (guild_id, level, xp as i64),
            |row| row.get(0),
        )?;
        Ok(ahead as u64 + 1)
    }

    // --- Linked FFXIV characters ---

    pub fn link_character(
        &self,
        guild_id: &str,
        user_id: &str,
        character: &LinkedCharacter,
    ) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO guild_characters (guild_id, user_id, character_id, name, server, linked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET character_id = ?3, name = ?4, server = ?5, linked_at = CURRENT_TIMESTAMP",
            (
                guild_id,
                user_id,
                character.character_id as i64,
                &character.name,
                &character.server,
            ),
        )?;
        Ok(())
    }

    pub fn get_character(&self, guild_id: &str, user_id: &str) -> anyhow::Result<Option<LinkedCharacter>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT character_id, name, server FROM guild_characters WHERE guild_id = ?1 AND user_id = ?2",
                (guild_id, user_id),
                |row| {
                    let id: i64 = row.get(0)?;
                    Ok(LinkedCharacter {
                        character_id: id as u64,
                        name: row.get(1)?,
                        server: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn unlink_character(&self, guild_id: &str, user_id: &str) -> anyhow::Result<usize> {
        let conn = self.conn();
        let count = conn.execute(
            "DELETE FROM guild_characters WHERE guild_id = ?1 AND user_id = ?2",
            (guild_id, user_id),
        )?;
        Ok(count)
    }

    // --- Playlists ---

    pub fn create_playlist(&self, guild_id: &str, user_id: &str, name: &str) -> anyhow::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO playlists (guild_id, user_id, name) VALUES (?1, ?2, ?3)",
            (guild_id, user_id, name),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_playlist(&self, guild_id: &str, name: &str) -> anyhow::Result<Option<PlaylistRecord>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, guild_id, user_id, name FROM playlists WHERE guild_id = ?1 AND name = ?2",
                (guild_id, name),
                map_playlist,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_playlists(&self, guild_id: &str) -> anyhow::Result<Vec<PlaylistRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, guild_id, user_id, name FROM playlists WHERE guild_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([guild_id], map_playlist)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Appends a song and returns its position in the playlist.
    pub fn add_song(&self, playlist_id: i64, title: &str, url: &str) -> anyhow::Result<i64> {
        let conn = self.conn();
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_songs WHERE playlist_id = ?1",
            [playlist_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO playlist_songs (playlist_id, title, url, position) VALUES (?1, ?2, ?3, ?4)",
            (playlist_id, title, url, position),
        )?;
        Ok(position)
    }

    pub fn list_songs(&self, playlist_id: i64) -> anyhow::Result<Vec<SongRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, playlist_id, title, url, position FROM playlist_songs
             WHERE playlist_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([playlist_id], map_song)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn random_guild_song(&self, guild_id: &str) -> anyhow::Result<Option<SongRecord>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT s.id, s.playlist_id, s.title, s.url, s.position
                 FROM playlist_songs s JOIN playlists p ON p.id = s.playlist_id
                 WHERE p.guild_id = ?1 ORDER BY RANDOM() LIMIT 1",
                [guild_id],
                map_song,
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete_playlist(&self, guild_id: &str, name: &str) -> anyhow::Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM playlist_songs WHERE playlist_id IN
             (SELECT id FROM playlists WHERE guild_id = ?1 AND name = ?2)",
            (guild_id, name),
        )?;
        let count = conn.execute(
            "DELETE FROM playlists WHERE guild_id = ?1 AND name = ?2",
            (guild_id, name),
        )?;
        Ok(count)
    }

    // --- Command log ---

    pub fn log_command(
        &self,
        guild_id: Option<&str>,
        user_id: &str,
        channel_id: &str,
        command: &str,
        args: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO command_logs (guild_id, user_id, channel_id, command, args, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)",
            (guild_id, user_id, channel_id, command, args),
        )?;
        Ok(())
    }

    pub fn count_commands(&self, guild_id: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn();
        let count = match guild_id {
            Some(gid) => conn.query_row(
                "SELECT COUNT(*) FROM command_logs WHERE guild_id = ?1",
                [gid],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM command_logs", [], |row| row.get(0))?,
        };
        Ok(count)
    }
}

fn map_playlist(row: &rusqlite::Row<'_>) -> Result<PlaylistRecord> {
    Ok(PlaylistRecord {
        id: row.get(0)?,
        guild_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
    })
}

fn map_song(row: &rusqlite::Row<'_>) -> Result<SongRecord> {
    Ok(SongRecord {
        id: row.get(0)?,
        playlist_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        position: row.get(4)?,
    })
}

#[cfg(test)]
pub(crate) fn test_database() -> Database {
    let config = crate::config::test_config();
    let db = Database::new(&config).unwrap();
    db.execute_init().unwrap();
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reports_unusable_directory() {
        // A regular file where the database directory should be
        let blocker = std::env::temp_dir().join(format!("bahamut-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"").unwrap();

        let mut config = crate::config::test_config();
        config.database_url = blocker.join("data").join("bahamut.db").display().to_string();
        let err = Database::new(&config).err().unwrap();
        assert!(err.to_string().contains("failed to create database directory"));

        std::fs::remove_file(&blocker).unwrap();
    }

    #[test]
    fn test_guild_settings_rows() {
        let db = test_database();

        assert!(db.get_guild_settings("123").unwrap().is_empty());

        db.set_guild_setting("123", "prefix", "?", "string").unwrap();
        db.set_guild_setting("123", "music_volume", "80", "number").unwrap();
        db.set_guild_setting("123", "prefix", "$", "string").unwrap();

        let mut rows = db.get_guild_settings("123").unwrap();
        rows.sort_by(|a, b| a.setting.cmp(&b.setting));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].setting, "prefix");
        assert_eq!(rows[1].val, "$");

        assert_eq!(db.delete_guild_setting("123", "prefix").unwrap(), 1);
        assert_eq!(db.get_guild_settings("123").unwrap().len(), 1);
    }

    #[test]
    fn test_find_guilds_with_setting() {
        let db = test_database();
        db.set_guild_setting("1", "premium_owner", "42", "string").unwrap();
        db.set_guild_setting("2", "premium_owner", "42", "string").unwrap();
        db.set_guild_setting("3", "premium_owner", "7", "string").unwrap();

        let guilds = db.find_guilds_with_setting("premium_owner", "42").unwrap();
        assert_eq!(guilds, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_user_stats() {
        let db = test_database();

        assert_eq!(db.get_user_stat("g", "u", "cookies").unwrap(), 0);
        assert_eq!(db.add_user_stat("g", "u", "cookies", 3).unwrap(), 3);
        assert_eq!(db.add_user_stat("g", "u", "cookies", 2).unwrap(), 5);

        // Subtraction never drops below one
        assert_eq!(db.sub_user_stat("g", "u", "cookies", 2).unwrap(), 3);
        assert_eq!(db.sub_user_stat("g", "u", "cookies", 10).unwrap(), 1);
        assert_eq!(db.get_user_stat("g", "u", "cookies").unwrap(), 1);

        db.add_user_stat("g", "v", "cookies", 9).unwrap();
        let top = db.top_user_stat("g", "cookies", 5).unwrap();
        assert_eq!(top[0], ("v".to_string(), 9));
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_guild_stats() {
        let db = test_database();
        assert_eq!(db.get_guild_stat("g", "songs_played").unwrap(), 0);
        db.add_guild_stat("g", "songs_played", 1).unwrap();
        db.add_guild_stat("g", "songs_played", 1).unwrap();
        assert_eq!(db.get_guild_stat("g", "songs_played").unwrap(), 2);
    }

    #[test]
    fn test_levels_and_rank() {
        let db = test_database();
        assert_eq!(db.get_level("g", "a").unwrap(), None);

        db.save_level("g", "a", 3, 40).unwrap();
        db.save_level("g", "b", 5, 10).unwrap();
        db.save_level("g", "c", 3, 90).unwrap();

        assert_eq!(db.get_level("g", "a").unwrap(), Some((3, 40)));
        let top = db.top_levels("g", 10).unwrap();
        assert_eq!(top[0].0, "b");
        assert_eq!(top[1].0, "c");
        assert_eq!(db.level_rank("g", 3, 40).unwrap(), 3);
        assert_eq!(db.level_rank("g", 5, 10).unwrap(), 1);
    }

    #[test]
    fn test_characters() {
        let db = test_database();
        let character = LinkedCharacter {
            character_id: 123456,
            name: "Y'shtola Rhul".to_string(),
            server: "Twintania".to_string(),
        };
        db.link_character("g", "u", &character).unwrap();
        assert_eq!(db.get_character("g", "u").unwrap(), Some(character));
        assert_eq!(db.get_character("other", "u").unwrap(), None);
        assert_eq!(db.unlink_character("g", "u").unwrap(), 1);
        assert_eq!(db.get_character("g", "u").unwrap(), None);
    }

    #[test]
    fn test_playlists() {
        let db = test_database();
        let id = db.create_playlist("g", "u", "chill").unwrap();
        assert!(db.create_playlist("g", "u", "chill").is_err(), "names are unique per guild");

        assert_eq!(db.add_song(id, "Song A", "https://a").unwrap(), 1);
        assert_eq!(db.add_song(id, "Song B", "https://b").unwrap(), 2);

        let songs = db.list_songs(id).unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[1].title, "Song B");

        assert!(db.random_guild_song("g").unwrap().is_some());
        assert!(db.random_guild_song("nope").unwrap().is_none());

        assert_eq!(db.list_playlists("g").unwrap().len(), 1);
        assert_eq!(db.delete_playlist("g", "chill").unwrap(), 1);
        assert!(db.list_songs(id).unwrap().is_empty());
        assert!(db.get_playlist("g", "chill").unwrap().is_none());
    }

    #[test]
    fn test_command_log() {
        let db = test_database();
        db.log_command(Some("g"), "u", "c", "ping", "").unwrap();
        db.log_command(Some("g"), "u", "c", "rank", "@someone").unwrap();
        db.log_command(None, "u", "dm", "help", "").unwrap();

        assert_eq!(db.count_commands(Some("g")).unwrap(), 2);
        assert_eq!(db.count_commands(None).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_database();
        let val = db
            .run_blocking(|db| db.add_user_stat("g", "u", "cookies", 4))
            .await
            .unwrap();
        assert_eq!(val, 4);
    }
}
