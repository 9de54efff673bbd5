//! Dispatch core: per-trigger orchestration.
//!
//! Each inbound trigger runs the same path: classify the subject when the
//! trigger references an earlier message, resolve the chat's configured
//! backend, invoke exactly one provider operation, persist the returned
//! string as the bot's own history row, then deliver it. Provider failures
//! come back as strings and flow through persistence and delivery unchanged;
//! only selector errors and unclassifiable subjects short-circuit without
//! writing a synthetic bot row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::bot::brain::{Brain, BrainSource, SelectorError};
use crate::bot::files::FileStore;
use crate::bot::message::{now_timestamp, ChatMessage};
use crate::bot::resolver::{classify, Subject};
use crate::bot::store::{keys, Database};
use crate::bot::telegram::Transport;
use crate::bot::whisper::Transcriber;

/// Reply to an empty query on the primary command. Sent without touching
/// history or any backend.
pub const GREETING: &str = "I'm up. What's up?";

const MARKER_PROCESSING: &str = "👀";
const MARKER_UNSUPPORTED: &str = "🤷";
const MARKER_FAILED: &str = "👎";

const TRANSCRIPTION_FALLBACK: &str = "Could not transcribe audio";

/// What kind of trigger arrived and what it is about.
#[derive(Debug, Clone)]
pub enum TriggerKind {
    /// Explicit query command; the subject is the query text itself.
    Command { query: String },
    /// Reply to an earlier message; the subject is that message's address.
    Reply { subject: i64, query: String },
    /// Reaction emoji on an earlier message.
    Reaction { subject: i64 },
}

/// An inbound trigger as delivered by the transport layer.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub timestamp: String,
    pub kind: TriggerKind,
}

pub struct DispatchEngine {
    db: Arc<Database>,
    files: Arc<FileStore>,
    brains: Arc<dyn BrainSource>,
    transport: Arc<dyn Transport>,
    transcriber: Option<Arc<dyn Transcriber>>,
    /// Per-chat resolved backend cache. Never held across a provider call;
    /// concurrent misses may both construct and the last write wins.
    cache: Mutex<HashMap<i64, Arc<dyn Brain>>>,
}

impl DispatchEngine {
    pub fn new(
        db: Arc<Database>,
        files: Arc<FileStore>,
        brains: Arc<dyn BrainSource>,
        transport: Arc<dyn Transport>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            db,
            files,
            brains,
            transport,
            transcriber,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn brains(&self) -> &dyn BrainSource {
        self.brains.as_ref()
    }

    /// Evict a chat's cached backend. Called whenever the chat's backend or
    /// model setting changes; the next trigger re-reads the stored settings.
    pub fn invalidate_brain(&self, chat_id: i64) {
        self.cache.lock().unwrap().remove(&chat_id);
    }

    /// Resolve the chat's configured backend, consulting the stored settings
    /// only on cache miss.
    pub fn resolve_brain(&self, chat_id: i64) -> Result<Arc<dyn Brain>, SelectorError> {
        if let Some(brain) = self.cache.lock().unwrap().get(&chat_id) {
            return Ok(brain.clone());
        }

        let default_backend = self
            .brains
            .list_backends()
            .into_iter()
            .next()
            .unwrap_or_default();
        let backend = self.db.get_setting(chat_id, keys::BACKEND, &default_backend);
        let model = self.db.get_setting(chat_id, keys::MODEL, "");
        let model = if model.is_empty() { None } else { Some(model) };

        let brain = self.brains.get_brain(&backend, model.as_deref())?;
        info!(
            "Resolved backend {} (model {}) for chat {}",
            brain.backend_name(),
            brain.model(),
            chat_id
        );
        self.cache.lock().unwrap().insert(chat_id, brain.clone());
        Ok(brain)
    }

    /// System prompt: each stored behavior instruction on its own line,
    /// prefixed with a literal marker, in insertion order.
    pub fn system_prompt(&self, chat_id: i64) -> String {
        let context = self.db.get_setting(chat_id, keys::CONTEXT, "");
        if context.is_empty() {
            return String::new();
        }
        let mut prompt: String = context
            .lines()
            .map(|line| format!("System: {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push('\n');
        prompt
    }

    /// Run one trigger through the state machine.
    pub async fn dispatch(&self, trigger: Trigger) {
        let chat_id = trigger.chat_id;

        // Empty command short-circuits before classification: static
        // greeting, no history write, no backend call.
        if let TriggerKind::Command { query } = &trigger.kind {
            if query.trim().is_empty() {
                if let Err(e) = self
                    .transport
                    .send_reply(chat_id, GREETING, Some(trigger.message_id))
                    .await
                {
                    warn!("Failed to send greeting: {e}");
                }
                return;
            }
        }

        // Classified: resolve the subject for reference triggers.
        let subject = match &trigger.kind {
            TriggerKind::Command { .. } => None,
            TriggerKind::Reply { subject, .. } | TriggerKind::Reaction { subject } => {
                match classify(&self.db, &self.files, chat_id, *subject) {
                    Subject::Unknown => {
                        info!("Unclassifiable reference {}/{subject}", chat_id);
                        self.transport
                            .set_reaction(chat_id, trigger.message_id, Some(MARKER_UNSUPPORTED))
                            .await;
                        return;
                    }
                    classified => {
                        info!("Reference {}/{subject} classified as {}", chat_id, classified.category());
                        Some(classified)
                    }
                }
            }
        };

        self.transport
            .set_reaction(chat_id, trigger.message_id, Some(MARKER_PROCESSING))
            .await;

        // BackendResolved: settings are read fresh (through the cache) so a
        // /model change applies from the very next trigger.
        let brain = match self.resolve_brain(chat_id) {
            Ok(brain) => brain,
            Err(e) => {
                // User configuration error: surfaced verbatim, no bot row.
                if let Err(send_err) = self
                    .transport
                    .send_reply(chat_id, &e.to_string(), Some(trigger.message_id))
                    .await
                {
                    warn!("Failed to send selector error: {send_err}");
                }
                self.transport
                    .set_reaction(chat_id, trigger.message_id, None)
                    .await;
                return;
            }
        };

        let system_prompt = self.system_prompt(chat_id);

        // Context is read before the user's row lands, so the transcript
        // handed to the provider never contains the live query.
        let recent = self.recent(chat_id);

        // Record the user's side of the exchange before generating.
        match &trigger.kind {
            TriggerKind::Command { query } => {
                self.db.store_message(&ChatMessage::command(
                    chat_id,
                    &trigger.username,
                    query,
                    &trigger.timestamp,
                ));
            }
            TriggerKind::Reply { query, .. } => {
                // No message id here: the bot's row claims this address, so
                // later references resolve to the answer, not the question.
                self.db.store_message(&ChatMessage {
                    chat_id,
                    user_id: trigger.user_id,
                    username: trigger.username.clone(),
                    message_id: None,
                    text: query.clone(),
                    timestamp: trigger.timestamp.clone(),
                });
            }
            TriggerKind::Reaction { .. } => {}
        }

        // Generating: exactly one provider operation, chosen by category.
        let response = match (&trigger.kind, subject) {
            (TriggerKind::Command { query }, None) => {
                brain.process(query, &recent, &system_prompt).await
            }
            (TriggerKind::Reply { query, .. }, Some(Subject::Text(text))) => {
                let query =
                    format!("here's the referenced message: {text} and here's the query: {query}");
                brain.process(&query, &recent, &system_prompt).await
            }
            (TriggerKind::Reply { query, .. }, Some(Subject::Photo(bytes))) => {
                brain.process_image(&bytes, query, &system_prompt).await
            }
            (TriggerKind::Reply { query, .. }, Some(Subject::Voice(bytes))) => {
                let transcript = self.transcribe(&bytes);
                let query =
                    format!("here's a transcription {transcript} and here's the query: {query}");
                brain.process(&query, &recent, &system_prompt).await
            }
            (TriggerKind::Reaction { .. }, Some(Subject::Text(text))) => {
                let query = format!("Please explain this message: {text}");
                brain.process(&query, &recent, &system_prompt).await
            }
            (TriggerKind::Reaction { .. }, Some(Subject::Photo(bytes))) => {
                brain.process_image(&bytes, "Explain this image", &system_prompt).await
            }
            (TriggerKind::Reaction { .. }, Some(Subject::Voice(bytes))) => {
                let transcript = self.transcribe(&bytes);
                let query = format!(
                    "here's a transcription {transcript} and here's the query: give a brief summary"
                );
                brain.process(&query, &recent, &system_prompt).await
            }
            // Unknown subjects returned earlier; commands carry no subject.
            _ => unreachable!("trigger kind and subject cannot disagree"),
        };

        // Delivered: history first. Command and reply answers are keyed to
        // the triggering message so later references resolve to them; a
        // reaction's trigger id is the subject's own address, which the
        // reacted-to message already claims, so its answer stays unkeyed.
        // A delivery failure does not roll the row back.
        let answer_address = match &trigger.kind {
            TriggerKind::Reaction { .. } => None,
            _ => Some(trigger.message_id),
        };
        self.db.store_message(&ChatMessage::bot(
            chat_id,
            answer_address,
            &response,
            &now_timestamp(),
        ));

        let reply_to = match &trigger.kind {
            TriggerKind::Reaction { subject } => *subject,
            _ => trigger.message_id,
        };
        match self.transport.send_reply(chat_id, &response, Some(reply_to)).await {
            Ok(_) => {
                self.transport
                    .set_reaction(chat_id, trigger.message_id, None)
                    .await;
            }
            Err(e) => {
                warn!("Delivery failed for chat {chat_id}: {e}");
                self.transport
                    .set_reaction(chat_id, trigger.message_id, Some(MARKER_FAILED))
                    .await;
            }
        }
    }

    fn recent(&self, chat_id: i64) -> Vec<ChatMessage> {
        let depth = self.db.history_depth(chat_id);
        self.db.get_recent_messages(chat_id, depth)
    }

    fn transcribe(&self, audio: &[u8]) -> String {
        match &self.transcriber {
            Some(t) => match t.transcribe(audio) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Transcription failed: {e}");
                    TRANSCRIPTION_FALLBACK.to_string()
                }
            },
            None => {
                warn!("No transcriber configured");
                TRANSCRIPTION_FALLBACK.to_string()
            }
        }
    }
}
