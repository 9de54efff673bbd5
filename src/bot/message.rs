//! Message types and the sentinel authorship convention.

use serde::{Deserialize, Serialize};

/// Sentinel user id for rows created by command handlers.
pub const COMMAND_USER_ID: i64 = -1;
/// Sentinel user id for rows authored by the bot itself.
pub const BOT_USER_ID: i64 = 0;

/// One stored conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    /// Origin message id. Older rows imported from other sources may not
    /// carry one.
    pub message_id: Option<i64>,
    pub text: String,
    /// RFC 3339 timestamp. Lexicographic order matches chronological order.
    pub timestamp: String,
}

impl ChatMessage {
    /// A row for a regular user message.
    pub fn user(
        chat_id: i64,
        user_id: i64,
        username: &str,
        message_id: i64,
        text: &str,
        timestamp: &str,
    ) -> Self {
        Self {
            chat_id,
            user_id,
            username: username.to_string(),
            message_id: Some(message_id),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    /// A row recording a command invocation ("{username}: {query}").
    pub fn command(chat_id: i64, username: &str, query: &str, timestamp: &str) -> Self {
        Self {
            chat_id,
            user_id: COMMAND_USER_ID,
            username: "command".to_string(),
            message_id: None,
            text: format!("{username}: {query}"),
            timestamp: timestamp.to_string(),
        }
    }

    /// A row for a bot-generated response. Keyed to the triggering message
    /// when that address is free, so later replies and reactions can
    /// reference the answer.
    pub fn bot(chat_id: i64, message_id: Option<i64>, text: &str, timestamp: &str) -> Self {
        Self {
            chat_id,
            user_id: BOT_USER_ID,
            username: "bot".to_string(),
            message_id,
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.user_id == BOT_USER_ID
    }
}

/// Current timestamp in the format stored alongside messages.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_row_uses_sentinel() {
        let msg = ChatMessage::command(-100, "alice", "what's up", "2024-01-15T10:00:00Z");
        assert_eq!(msg.user_id, COMMAND_USER_ID);
        assert_eq!(msg.username, "command");
        assert_eq!(msg.text, "alice: what's up");
        assert!(msg.message_id.is_none());
    }

    #[test]
    fn test_bot_row_keyed_to_trigger() {
        let msg = ChatMessage::bot(-100, Some(42), "hello", "2024-01-15T10:00:00Z");
        assert_eq!(msg.user_id, BOT_USER_ID);
        assert_eq!(msg.message_id, Some(42));
        assert!(msg.is_bot());
    }
}
