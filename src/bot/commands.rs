//! Slash-command layer.
//!
//! Commands are chat-configuration surface: they read and write the per-chat
//! settings the dispatch engine consumes, and `/b` feeds straight into
//! dispatch. Replies are plain strings sent through the transport.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bot::engine::{DispatchEngine, Trigger, TriggerKind};
use crate::bot::store::keys;
use crate::bot::telegram::Transport;
use crate::bot::tts::TtsClient;

const HELP_TEXT: &str = "\
Commands:
/b <query> - ask the bot (also: reply to the bot, or prefix a message with 'b ')
/model - list backends and models
/model <backend> [model] - switch backend and model (name or number)
/context - show behavior instructions
/context <instruction> - add a behavior instruction
/context clear - remove all instructions
/history [n] - show or set how many recent messages are sent as context
/translate on|off - toggle automatic translation
/tts [voice] - show available voices or pick one
/help - this message";

pub struct CommandHandler {
    engine: Arc<DispatchEngine>,
    transport: Arc<dyn Transport>,
    tts: Option<Arc<TtsClient>>,
}

/// Split `/cmd@botname args` into the bare command name and its argument
/// string. Returns `None` for non-command text.
pub fn parse(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // Group chats address commands as /cmd@botname.
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), args.to_string()))
}

impl CommandHandler {
    pub fn new(
        engine: Arc<DispatchEngine>,
        transport: Arc<dyn Transport>,
        tts: Option<Arc<TtsClient>>,
    ) -> Self {
        Self { engine, transport, tts }
    }

    /// Handle a slash command. Returns false when the text is not a command
    /// this bot knows, so the caller can fall through to other routing.
    pub async fn handle(&self, trigger: &Trigger, text: &str) -> bool {
        let Some((command, args)) = parse(text) else {
            return false;
        };
        info!("Command /{command} in chat {}", trigger.chat_id);

        let reply = match command.as_str() {
            "b" | "bot" => {
                let mut query_trigger = trigger.clone();
                query_trigger.kind = TriggerKind::Command { query: args };
                self.engine.dispatch(query_trigger).await;
                return true;
            }
            "model" => self.model(trigger.chat_id, &args),
            "context" => self.context(trigger.chat_id, &args),
            "history" => self.history(trigger.chat_id, &args),
            "translate" => self.translate(trigger.chat_id, &args),
            "tts" => self.tts(trigger.chat_id, &args).await,
            "help" | "start" => HELP_TEXT.to_string(),
            _ => return false,
        };

        if let Err(e) = self
            .transport
            .send_reply(trigger.chat_id, &reply, Some(trigger.message_id))
            .await
        {
            warn!("Failed to send command reply: {e}");
        }
        true
    }

    fn model(&self, chat_id: i64, args: &str) -> String {
        let db = self.engine.db();
        let brains = self.engine.brains();
        let backends = brains.list_backends();
        let default_backend = backends.first().cloned().unwrap_or_default();

        if args.is_empty() {
            let current_backend = db.get_setting(chat_id, keys::BACKEND, &default_backend);
            let current_model = db.get_setting(chat_id, keys::MODEL, "");

            let mut lines = vec!["Backends:".to_string()];
            for (i, name) in backends.iter().enumerate() {
                let marker = if *name == current_backend { " (current)" } else { "" };
                lines.push(format!("{}. {}{}", i + 1, name, marker));
            }
            lines.push(String::new());
            lines.push(format!("Models for {current_backend}:"));
            match brains.get_brain(&current_backend, None) {
                Ok(brain) => {
                    for (i, model) in brain.list_models().iter().enumerate() {
                        let marker = if *model == current_model { " (current)" } else { "" };
                        lines.push(format!("{}. {}{}", i + 1, model, marker));
                    }
                }
                Err(e) => lines.push(e.to_string()),
            }
            lines.push(String::new());
            lines.push("Switch with /model <backend> [model], by name or number.".to_string());
            return lines.join("\n");
        }

        let mut parts = args.split_whitespace();
        let backend_selector = parts.next().unwrap_or_default();
        let model_selector = parts.next();

        match brains.get_brain(backend_selector, model_selector) {
            Ok(brain) => {
                db.set_setting(chat_id, keys::BACKEND, brain.backend_name());
                match model_selector {
                    Some(_) => db.set_setting(chat_id, keys::MODEL, brain.model()),
                    // Back to the provider default when no model is given.
                    None => db.set_setting(chat_id, keys::MODEL, ""),
                }
                self.engine.invalidate_brain(chat_id);
                format!("Backend set to {} (model {}).", brain.backend_name(), brain.model())
            }
            Err(e) => e.to_string(),
        }
    }

    fn context(&self, chat_id: i64, args: &str) -> String {
        let db = self.engine.db();
        match args {
            "" | "show" => {
                let context = db.get_setting(chat_id, keys::CONTEXT, "");
                if context.is_empty() {
                    "No behavior instructions set.".to_string()
                } else {
                    format!("Behavior instructions:\n{context}")
                }
            }
            "clear" => {
                db.set_setting(chat_id, keys::CONTEXT, "");
                "Behavior instructions cleared.".to_string()
            }
            instruction => {
                let existing = db.get_setting(chat_id, keys::CONTEXT, "");
                let updated = if existing.is_empty() {
                    instruction.to_string()
                } else {
                    format!("{existing}\n{instruction}")
                };
                db.set_setting(chat_id, keys::CONTEXT, &updated);
                "Behavior instruction added.".to_string()
            }
        }
    }

    fn history(&self, chat_id: i64, args: &str) -> String {
        let db = self.engine.db();
        if args.is_empty() {
            return format!("History depth: {} messages.", db.history_depth(chat_id));
        }
        match args.parse::<usize>() {
            Ok(depth) if depth > 0 => {
                db.set_setting(chat_id, keys::HISTORY_DEPTH, &depth.to_string());
                format!("History depth set to {depth} messages.")
            }
            _ => format!("Invalid history depth: {args}. Expected a positive number."),
        }
    }

    fn translate(&self, chat_id: i64, args: &str) -> String {
        let db = self.engine.db();
        match args {
            "on" | "off" => {
                db.set_setting(chat_id, keys::TRANSLATION_ENABLED, args);
                format!("Translation turned {args}.")
            }
            "" => {
                let state = db.get_setting(chat_id, keys::TRANSLATION_ENABLED, "off");
                format!("Translation is {state}. Use /translate on|off.")
            }
            other => format!("Invalid argument: {other}. Use /translate on|off."),
        }
    }

    async fn tts(&self, chat_id: i64, args: &str) -> String {
        let Some(tts) = &self.tts else {
            return "Text-to-speech is not configured.".to_string();
        };
        let db = self.engine.db();
        if args.is_empty() {
            let current = db.get_setting(chat_id, keys::TTS_VOICE, "");
            let mut lines = vec!["Voices:".to_string()];
            match tts.list_voices().await {
                Ok(voices) => {
                    for voice in voices {
                        let marker = if voice == current { " (current)" } else { "" };
                        lines.push(format!("- {voice}{marker}"));
                    }
                }
                Err(e) => {
                    warn!("Failed to list voices: {e}");
                    lines.push("(voice list unavailable)".to_string());
                }
            }
            lines.push(String::new());
            lines.push("Pick one with /tts <voice>. Reply 'tts' to a message to voice it.".to_string());
            return lines.join("\n");
        }
        db.set_setting(chat_id, keys::TTS_VOICE, args);
        format!("Voice set to {args}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_command() {
        assert_eq!(parse("/help"), Some(("help".to_string(), String::new())));
    }

    #[test]
    fn test_parse_with_args() {
        assert_eq!(
            parse("/model gemini 2"),
            Some(("model".to_string(), "gemini 2".to_string()))
        );
    }

    #[test]
    fn test_parse_botname_suffix() {
        assert_eq!(
            parse("/b@beebot what's up"),
            Some(("b".to_string(), "what's up".to_string()))
        );
    }

    #[test]
    fn test_parse_case_insensitive_command() {
        assert_eq!(parse("/Help"), Some(("help".to_string(), String::new())));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(parse("hello"), None);
        assert_eq!(parse("/"), None);
        assert_eq!(parse(""), None);
    }
}
