//! Bot module - Telegram assistant dispatching chat content to LLM backends.

pub mod brain;
pub mod commands;
pub mod engine;
pub mod files;
pub mod giphy;
pub mod message;
pub mod resolver;
pub mod store;
pub mod telegram;
pub mod translate;
pub mod tts;
pub mod whisper;


pub use brain::registry::{BrainRegistry, Credentials};
pub use commands::CommandHandler;
pub use engine::{DispatchEngine, Trigger, TriggerKind};
pub use files::{FileCategory, FileStore};
pub use message::ChatMessage;
pub use store::Database;
pub use telegram::TelegramClient;
pub use whisper::Whisper;
