//! Classification of referenced messages.
//!
//! Given a (chat, message) address from a reply or reaction, decide what the
//! referenced message is before any backend call. Resolution order is fixed:
//! logged text wins, then a stored photo, then a stored voice note. A single
//! message id only ever corresponds to one logged entity, so first match is
//! safe.

use crate::bot::files::{FileCategory, FileStore};
use crate::bot::store::Database;

/// What a referenced message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Text(String),
    Photo(Vec<u8>),
    Voice(Vec<u8>),
    Unknown,
}

impl Subject {
    pub fn category(&self) -> &'static str {
        match self {
            Subject::Text(_) => "text",
            Subject::Photo(_) => "photo",
            Subject::Voice(_) => "voice",
            Subject::Unknown => "unknown",
        }
    }
}

pub fn classify(db: &Database, files: &FileStore, chat_id: i64, message_id: i64) -> Subject {
    let text = db.get_message_text(chat_id, message_id);
    if !text.is_empty() {
        return Subject::Text(text);
    }
    if let Some(bytes) = files.load(FileCategory::Photo, chat_id, message_id) {
        return Subject::Photo(bytes);
    }
    if let Some(bytes) = files.load(FileCategory::Voice, chat_id, message_id) {
        return Subject::Voice(bytes);
    }
    Subject::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::message::ChatMessage;
    use tempfile::TempDir;

    fn fixtures() -> (Database, TempDir) {
        (Database::in_memory(), TempDir::new().unwrap())
    }

    #[test]
    fn test_text_classification() {
        let (db, dir) = fixtures();
        let files = FileStore::new(dir.path());
        db.store_message(&ChatMessage::user(-1, 100, "alice", 5, "hello", "2024-01-15T10:00:00Z"));

        assert_eq!(classify(&db, &files, -1, 5), Subject::Text("hello".to_string()));
    }

    #[test]
    fn test_text_takes_precedence_over_stored_file() {
        let (db, dir) = fixtures();
        let files = FileStore::new(dir.path());
        db.store_message(&ChatMessage::user(-1, 100, "alice", 5, "caption", "2024-01-15T10:00:00Z"));
        files.store(FileCategory::Photo, -1, 5, b"jpeg").unwrap();

        assert_eq!(classify(&db, &files, -1, 5), Subject::Text("caption".to_string()));
    }

    #[test]
    fn test_photo_before_voice() {
        let (db, dir) = fixtures();
        let files = FileStore::new(dir.path());
        files.store(FileCategory::Photo, -1, 5, b"jpeg").unwrap();
        files.store(FileCategory::Voice, -1, 5, b"ogg").unwrap();

        assert_eq!(classify(&db, &files, -1, 5), Subject::Photo(b"jpeg".to_vec()));
    }

    #[test]
    fn test_voice_classification() {
        let (db, dir) = fixtures();
        let files = FileStore::new(dir.path());
        files.store(FileCategory::Voice, -1, 5, b"ogg").unwrap();

        assert_eq!(classify(&db, &files, -1, 5), Subject::Voice(b"ogg".to_vec()));
    }

    #[test]
    fn test_unknown_when_nothing_stored() {
        let (db, dir) = fixtures();
        let files = FileStore::new(dir.path());

        assert_eq!(classify(&db, &files, -1, 5), Subject::Unknown);
        assert_eq!(classify(&db, &files, -1, 5).category(), "unknown");
    }
}
