mod bot;
mod config;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageReactionUpdated};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use bot::store::keys;
use bot::telegram::Transport;
use bot::translate::{self, TranslateClient};
use bot::tts::TtsClient;
use bot::whisper::Transcriber;
use bot::{
    BrainRegistry, ChatMessage, CommandHandler, Database, DispatchEngine, FileCategory,
    FileStore, TelegramClient, Trigger, TriggerKind, Whisper, giphy,
};
use config::Config;

/// Reaction emoji that triggers a summary of the reacted-to message.
const TRIGGER_REACTION: &str = "👾";

struct BotState {
    engine: Arc<DispatchEngine>,
    commands: CommandHandler,
    telegram: Arc<TelegramClient>,
    translator: Option<TranslateClient>,
    giphy: giphy::GiphyClient,
    tts: Option<Arc<TtsClient>>,
}

impl BotState {
    fn new(config: &Config, bot: &Bot) -> Self {
        let db = match Database::open(&config.data_dir.join("messages.db")) {
            Ok(db) => Arc::new(db),
            Err(e) => panic!("Failed to open database: {e}"),
        };
        let files = Arc::new(FileStore::new(&config.data_dir.join("files")));
        let registry = Arc::new(BrainRegistry::new(config.credentials()));
        let telegram = Arc::new(TelegramClient::new(bot.clone()));

        let transcriber: Option<Arc<dyn Transcriber>> = match &config.whisper_model_path {
            Some(path) => match Whisper::new(path) {
                Ok(whisper) => Some(Arc::new(whisper)),
                Err(e) => {
                    warn!("Voice transcription disabled: {e}");
                    None
                }
            },
            None => {
                info!("Voice transcription disabled (no whisper_model_path)");
                None
            }
        };

        let engine = Arc::new(DispatchEngine::new(
            db,
            files,
            registry,
            telegram.clone(),
            transcriber,
        ));

        let tts = config
            .tts_endpoint
            .clone()
            .map(|endpoint| Arc::new(TtsClient::new(endpoint)));
        let commands = CommandHandler::new(engine.clone(), telegram.clone(), tts.clone());

        let translator = config
            .translate_api_url
            .clone()
            .map(TranslateClient::new);
        if translator.is_none() {
            info!("Translation disabled (no translate_api_url)");
        }

        Self {
            engine,
            commands,
            telegram,
            translator,
            giphy: giphy::GiphyClient::new(config.giphy_api_key.clone()),
            tts,
        }
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "beebot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("beebot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🐝 Starting beebot...");
    info!("Loaded config from {config_path}");

    let state = Arc::new(BotState::new(&config, &bot));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_message_reaction_updated().endpoint(handle_reaction));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Strip the `b`/`bot` trigger prefix. Bare `b` or `bot` yields an empty
/// query; non-triggering text yields `None`.
fn strip_trigger(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    if lower == "b" || lower == "bot" {
        return Some(String::new());
    }
    if lower.starts_with("bot ") {
        return Some(trimmed[4..].trim().to_string());
    }
    if lower.starts_with("b ") {
        return Some(trimmed[2..].trim().to_string());
    }
    None
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let username = user
        .username
        .as_deref()
        .unwrap_or(&user.first_name)
        .to_string();
    let chat_id = msg.chat.id.0;
    let message_id = msg.id.0 as i64;
    let timestamp = msg.date.to_rfc3339();

    let base = Trigger {
        chat_id,
        message_id,
        user_id: user.id.0 as i64,
        username: username.clone(),
        timestamp: timestamp.clone(),
        kind: TriggerKind::Command { query: String::new() },
    };

    // Photos: store the file, then analyze when the caption asks for it.
    if let Some(photos) = msg.photo() {
        let Some(photo) = photos.last() else {
            return Ok(());
        };
        match state.telegram.download_file(&photo.file.id.0).await {
            Ok(bytes) => {
                if let Err(e) = state
                    .engine
                    .files()
                    .store(FileCategory::Photo, chat_id, message_id, &bytes)
                {
                    warn!("Failed to store photo: {e}");
                }
            }
            Err(e) => warn!("Failed to download photo: {e}"),
        }

        let caption = msg.caption().unwrap_or("");
        if let Some(query) = strip_trigger(caption) {
            let query = if query.is_empty() {
                "Please analyze this image.".to_string()
            } else {
                query
            };
            let mut trigger = base;
            trigger.kind = TriggerKind::Reply { subject: message_id, query };
            state.engine.dispatch(trigger).await;
        }
        return Ok(());
    }

    // Voice notes: stored so later replies and reactions can reference them.
    if let Some(voice) = msg.voice() {
        match state.telegram.download_file(&voice.file.id.0).await {
            Ok(bytes) => {
                if let Err(e) = state
                    .engine
                    .files()
                    .store(FileCategory::Voice, chat_id, message_id, &bytes)
                {
                    warn!("Failed to store voice note: {e}");
                }
            }
            Err(e) => warn!("Failed to download voice note: {e}"),
        }
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') && state.commands.handle(&base, text).await {
        return Ok(());
    }

    if let Some(replied) = msg.reply_to_message() {
        let subject = replied.id.0 as i64;

        // Replying 'tts' to a text message voices it.
        if text.trim().eq_ignore_ascii_case("tts") {
            voice_message(&state, chat_id, subject).await;
            return Ok(());
        }

        if let Some(query) = strip_trigger(text) {
            let mut trigger = base;
            trigger.kind = TriggerKind::Reply { subject, query };
            state.engine.dispatch(trigger).await;
            return Ok(());
        }
    } else if let Some(query) = strip_trigger(text) {
        let mut trigger = base;
        trigger.kind = TriggerKind::Command { query };
        state.engine.dispatch(trigger).await;
        return Ok(());
    }

    // Plain chatter: log it so it can serve as context and reference target.
    state.engine.db().store_message(&ChatMessage::user(
        chat_id,
        user.id.0 as i64,
        &username,
        message_id,
        text,
        &timestamp,
    ));

    maybe_translate(&state, chat_id, message_id, text).await;
    maybe_send_laugh_gif(&bot, &state, chat_id, message_id, text).await;

    Ok(())
}

async fn handle_reaction(
    update: MessageReactionUpdated,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let is_trigger = update.new_reaction.iter().any(|r| match r {
        teloxide::types::ReactionType::Emoji { emoji } => emoji == TRIGGER_REACTION,
        _ => false,
    });
    if !is_trigger {
        return Ok(());
    }

    let Some(user) = update.user().cloned() else {
        return Ok(());
    };
    let username = user
        .username
        .as_deref()
        .unwrap_or(&user.first_name)
        .to_string();
    let subject = update.message_id.0 as i64;

    info!("Trigger reaction on message {} in chat {}", subject, update.chat.id.0);
    state
        .engine
        .dispatch(Trigger {
            chat_id: update.chat.id.0,
            message_id: subject,
            user_id: user.id.0 as i64,
            username,
            timestamp: update.date.to_rfc3339(),
            kind: TriggerKind::Reaction { subject },
        })
        .await;
    Ok(())
}

/// Synthesize the referenced message's text and send it back as a voice note.
async fn voice_message(state: &BotState, chat_id: i64, subject: i64) {
    let Some(tts) = &state.tts else {
        let _ = state
            .telegram
            .send_reply(chat_id, "Text-to-speech is not configured.", Some(subject))
            .await;
        return;
    };

    let text = state.engine.db().get_message_text(chat_id, subject);
    if text.is_empty() {
        let _ = state
            .telegram
            .send_reply(chat_id, "Nothing to voice in that message.", Some(subject))
            .await;
        return;
    }

    let voice = state.engine.db().get_setting(chat_id, keys::TTS_VOICE, "");
    let voice = if voice.is_empty() { None } else { Some(voice) };
    match tts.synthesize(&text, voice.as_deref()).await {
        Ok(audio) => {
            if let Err(e) = state.telegram.send_voice(chat_id, audio, Some(subject)).await {
                warn!("Failed to send voice note: {e}");
            }
        }
        Err(e) => {
            warn!("TTS failed: {e}");
            let _ = state
                .telegram
                .send_reply(chat_id, "Could not generate speech for that message.", Some(subject))
                .await;
        }
    }
}

/// Translate stored chatter to English when the chat opted in, replying only
/// when the source language differs.
async fn maybe_translate(state: &BotState, chat_id: i64, message_id: i64, text: &str) {
    let Some(translator) = &state.translator else {
        return;
    };
    if state
        .engine
        .db()
        .get_setting(chat_id, keys::TRANSLATION_ENABLED, "off")
        != "on"
    {
        return;
    }
    if let Some(translation) = translator.translate(text, translate::DEFAULT_TARGET).await {
        if translation.crossed_languages() {
            let _ = state
                .telegram
                .send_reply(chat_id, &translation.translated_text, Some(message_id))
                .await;
        }
    }
}

/// When the chat is laughing hard enough and the cooldown allows it, post a
/// laugh GIF.
async fn maybe_send_laugh_gif(
    bot: &Bot,
    state: &BotState,
    chat_id: i64,
    message_id: i64,
    text: &str,
) {
    if !giphy::contains_laughter(text) {
        return;
    }
    let db = state.engine.db();
    let recent: Vec<String> = db
        .get_recent_messages(chat_id, giphy::LAUGH_WINDOW)
        .into_iter()
        .map(|m| m.text)
        .collect();
    let last_gif_message_id: i64 = db
        .get_setting(chat_id, keys::LAST_LAUGH_GIF_MESSAGE_ID, "0")
        .parse()
        .unwrap_or(0);

    if !giphy::should_send_gif(&recent, message_id, last_gif_message_id) {
        return;
    }

    if let Some(url) = state.giphy.random_gif("laugh").await {
        match reqwest::Url::parse(&url) {
            Ok(gif_url) => {
                if let Err(e) = bot
                    .send_animation(ChatId(chat_id), InputFile::url(gif_url))
                    .await
                {
                    warn!("Failed to send laugh GIF: {e}");
                }
            }
            Err(e) => warn!("Bad GIF url from Giphy: {e}"),
        }
    }
    db.set_setting(chat_id, keys::LAST_LAUGH_GIF_MESSAGE_ID, &message_id.to_string());

    info!(
        "Laugh GIF gate fired in chat {chat_id}; next allowed after {} more messages",
        giphy::ANTISPAM_MESSAGES
    );
}

#[cfg(test)]
mod tests {
    use super::strip_trigger;

    #[test]
    fn test_strip_trigger_prefixes() {
        assert_eq!(strip_trigger("b what's up"), Some("what's up".to_string()));
        assert_eq!(strip_trigger("bot what's up"), Some("what's up".to_string()));
        assert_eq!(strip_trigger("B WHAT"), Some("WHAT".to_string()));
        assert_eq!(strip_trigger("b"), Some(String::new()));
        assert_eq!(strip_trigger("bot"), Some(String::new()));
    }

    #[test]
    fn test_strip_trigger_rejects_plain_text() {
        assert_eq!(strip_trigger("brittle code"), None);
        assert_eq!(strip_trigger("both of us"), None);
        assert_eq!(strip_trigger("hello"), None);
    }
}
