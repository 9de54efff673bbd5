//! Persistent SQLite store for messages and per-chat settings.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::bot::message::ChatMessage;

/// Per-chat setting keys.
pub mod keys {
    pub const BACKEND: &str = "backend";
    pub const MODEL: &str = "model";
    pub const CONTEXT: &str = "context";
    pub const HISTORY_DEPTH: &str = "history_depth";
    pub const TRANSLATION_ENABLED: &str = "translation_enabled";
    pub const TTS_VOICE: &str = "tts_voice";
    pub const LAST_LAUGH_GIF_MESSAGE_ID: &str = "last_laugh_gif_message_id";
}

pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Append-only message ledger plus a per-chat key/value settings table.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create an in-memory database (tests, ephemeral runs).
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        db
    }

    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("Failed to open database: {e}"))?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        info!("Opened database at {:?} ({} messages)", path, db.message_count());
        Ok(db)
    }

    fn init_schema(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                message_id INTEGER,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                chat_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (chat_id, key)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_messages_chat_msg ON messages(chat_id, message_id);
        "#,
        )
        .expect("Failed to initialize database schema");
    }

    pub fn message_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    /// Append a message. Rows are never mutated or deleted.
    pub fn store_message(&self, msg: &ChatMessage) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (chat_id, user_id, username, message_id, text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![msg.chat_id, msg.user_id, msg.username, msg.message_id, msg.text, msg.timestamp],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert message: {e}");
            0
        });
    }

    /// Recent messages for a chat, newest first. Callers reverse to
    /// chronological order before building prompt context.
    pub fn get_recent_messages(&self, chat_id: i64, limit: usize) -> Vec<ChatMessage> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT chat_id, user_id, username, message_id, text, timestamp
             FROM messages WHERE chat_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                warn!("Failed to prepare recent-messages query: {e}");
                return Vec::new();
            }
        };

        let rows = stmt.query_map(params![chat_id, limit as i64], |row| {
            Ok(ChatMessage {
                chat_id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                message_id: row.get(3)?,
                text: row.get(4)?,
                timestamp: row.get(5)?,
            })
        });

        match rows {
            Ok(rows) => rows.filter_map(Result::ok).collect(),
            Err(e) => {
                warn!("Failed to query recent messages: {e}");
                Vec::new()
            }
        }
    }

    /// Text of a specific message, or empty string if the address is unknown.
    pub fn get_message_text(&self, chat_id: i64, message_id: i64) -> String {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT text FROM messages WHERE chat_id = ?1 AND message_id = ?2",
            params![chat_id, message_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!("Failed to look up message text: {e}");
            None
        })
        .unwrap_or_default()
    }

    pub fn get_setting(&self, chat_id: i64, key: &str, default: &str) -> String {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE chat_id = ?1 AND key = ?2",
            params![chat_id, key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!("Failed to read setting {key}: {e}");
            None
        })
        .unwrap_or_else(|| default.to_string())
    }

    /// Upsert a setting. At most one value per (chat, key).
    pub fn set_setting(&self, chat_id: i64, key: &str, value: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (chat_id, key, value) VALUES (?1, ?2, ?3)",
            params![chat_id, key, value],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to write setting {key}: {e}");
            0
        });
    }

    /// History depth for a chat, falling back to the default on bad values.
    pub fn history_depth(&self, chat_id: i64) -> usize {
        self.get_setting(chat_id, keys::HISTORY_DEPTH, &DEFAULT_HISTORY_DEPTH.to_string())
            .parse()
            .unwrap_or(DEFAULT_HISTORY_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat_id: i64, message_id: i64, username: &str, text: &str, ts: &str) -> ChatMessage {
        ChatMessage::user(chat_id, 100, username, message_id, text, ts)
    }

    #[test]
    fn test_store_and_count() {
        let db = Database::in_memory();
        db.store_message(&msg(-1, 1, "alice", "hello", "2024-01-15T10:00:00Z"));
        db.store_message(&msg(-1, 2, "bob", "hi", "2024-01-15T10:01:00Z"));
        assert_eq!(db.message_count(), 2);
    }

    #[test]
    fn test_recent_messages_newest_first() {
        let db = Database::in_memory();
        db.store_message(&msg(-1, 1, "alice", "first", "2024-01-15T10:00:00Z"));
        db.store_message(&msg(-1, 2, "bob", "second", "2024-01-15T10:01:00Z"));
        db.store_message(&msg(-1, 3, "carol", "third", "2024-01-15T10:02:00Z"));

        let recent = db.get_recent_messages(-1, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "third");
        assert_eq!(recent[1].text, "second");
    }

    #[test]
    fn test_recent_messages_ties_broken_by_insertion_order() {
        let db = Database::in_memory();
        db.store_message(&msg(-1, 1, "alice", "a", "2024-01-15T10:00:00Z"));
        db.store_message(&msg(-1, 2, "bob", "b", "2024-01-15T10:00:00Z"));

        let recent = db.get_recent_messages(-1, 10);
        assert_eq!(recent[0].text, "b");
        assert_eq!(recent[1].text, "a");
    }

    #[test]
    fn test_recent_messages_scoped_to_chat() {
        let db = Database::in_memory();
        db.store_message(&msg(-1, 1, "alice", "here", "2024-01-15T10:00:00Z"));
        db.store_message(&msg(-2, 2, "bob", "elsewhere", "2024-01-15T10:01:00Z"));

        let recent = db.get_recent_messages(-1, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "here");
    }

    #[test]
    fn test_message_text_lookup() {
        let db = Database::in_memory();
        db.store_message(&msg(-1, 7, "alice", "find me", "2024-01-15T10:00:00Z"));
        assert_eq!(db.get_message_text(-1, 7), "find me");
        assert_eq!(db.get_message_text(-1, 8), "");
        assert_eq!(db.get_message_text(-2, 7), "");
    }

    #[test]
    fn test_settings_upsert() {
        let db = Database::in_memory();
        assert_eq!(db.get_setting(-1, keys::BACKEND, "GEMINI"), "GEMINI");

        db.set_setting(-1, keys::BACKEND, "OPENAI");
        assert_eq!(db.get_setting(-1, keys::BACKEND, "GEMINI"), "OPENAI");

        db.set_setting(-1, keys::BACKEND, "DEEPSEEK");
        assert_eq!(db.get_setting(-1, keys::BACKEND, "GEMINI"), "DEEPSEEK");

        // Other chats are unaffected.
        assert_eq!(db.get_setting(-2, keys::BACKEND, "GEMINI"), "GEMINI");
    }

    #[test]
    fn test_history_depth_parsing() {
        let db = Database::in_memory();
        assert_eq!(db.history_depth(-1), DEFAULT_HISTORY_DEPTH);
        db.set_setting(-1, keys::HISTORY_DEPTH, "25");
        assert_eq!(db.history_depth(-1), 25);
        db.set_setting(-1, keys::HISTORY_DEPTH, "garbage");
        assert_eq!(db.history_depth(-1), DEFAULT_HISTORY_DEPTH);
    }
}
