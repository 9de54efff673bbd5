//! Telegram transport using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::net::Download;
use teloxide::types::{FileId, MessageId, ReactionType, ReplyParameters};
use tracing::{debug, info, warn};

/// Outbound side of the chat transport. Reaction markers are fire-and-forget
/// hints; failures there are logged and swallowed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a reply, optionally threaded onto an earlier message. Returns the
    /// sent message's id.
    async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, String>;

    /// Set (or with `None`, clear) a reaction marker on a message.
    async fn set_reaction(&self, chat_id: i64, message_id: i64, emoji: Option<&str>);

    /// Send a voice note (OGG Opus bytes) threaded onto a message.
    async fn send_voice(
        &self,
        chat_id: i64,
        voice: Vec<u8>,
        reply_to: Option<i64>,
    ) -> Result<i64, String>;
}

pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Download a file (photo, voice note) by its Telegram file id.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        debug!("Downloaded {} bytes for file {}", data.len(), file_id);
        Ok(data)
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn set_reaction(&self, chat_id: i64, message_id: i64, emoji: Option<&str>) {
        let reactions = match emoji {
            Some(e) => vec![ReactionType::Emoji { emoji: e.to_string() }],
            None => vec![],
        };
        if let Err(e) = self
            .bot
            .set_message_reaction(ChatId(chat_id), MessageId(message_id as i32))
            .reaction(reactions)
            .await
        {
            warn!("Failed to set reaction: {e}");
        }
    }

    async fn send_voice(
        &self,
        chat_id: i64,
        voice: Vec<u8>,
        reply_to: Option<i64>,
    ) -> Result<i64, String> {
        info!("Sending voice to chat {} ({} bytes)", chat_id, voice.len());
        let input_file = teloxide::types::InputFile::memory(voice).file_name("voice.ogg");
        let mut request = self.bot.send_voice(ChatId(chat_id), input_file);
        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send voice: {e}");
            warn!("{}", msg);
            msg
        })
    }
}
