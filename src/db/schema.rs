/// Schema applied by `Database::execute_init`. Every id column holds a Discord snowflake string.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS guild_settings (
        guild_id TEXT NOT NULL,
        setting TEXT NOT NULL,
        val TEXT NOT NULL,
        val_type TEXT NOT NULL,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (guild_id, setting)
    );
    CREATE INDEX IF NOT EXISTS idx_guild_settings_value ON guild_settings (setting, val);

    CREATE TABLE IF NOT EXISTS guild_stats (
        guild_id TEXT NOT NULL,
        stat TEXT NOT NULL,
        val INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (guild_id, stat)
    );

    CREATE TABLE IF NOT EXISTS guild_user_stats (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        stat TEXT NOT NULL,
        val INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (guild_id, user_id, stat)
    );
    CREATE INDEX IF NOT EXISTS idx_guild_user_stats_rank ON guild_user_stats (guild_id, stat, val);

    CREATE TABLE IF NOT EXISTS guild_user_levels (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        level INTEGER NOT NULL DEFAULT 0,
        xp INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (guild_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS guild_characters (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        character_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        server TEXT NOT NULL,
        linked_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (guild_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS playlists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (guild_id, name)
    );

    CREATE TABLE IF NOT EXISTS playlist_songs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        playlist_id INTEGER NOT NULL REFERENCES playlists (id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        position INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_playlist_songs_playlist ON playlist_songs (playlist_id, position);

    CREATE TABLE IF NOT EXISTS command_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id TEXT,
        user_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        command TEXT NOT NULL,
        args TEXT NOT NULL,
        timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_command_logs_guild ON command_logs (guild_id);
";
