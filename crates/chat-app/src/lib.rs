//! Single-conversation chat client for the economics assistant backend.

pub mod chat;
pub mod settings;
pub mod terminal;

pub use chat::{
    Attachment, ChatController, FALLBACK_MESSAGE, FeedbackLedger, FeedbackSink, PendingReply,
    ReplyOutcome, Role, SessionEvent, SessionSnapshot, Turn,
};
pub use settings::{AppSettings, SettingsError, SettingsStore};
pub use terminal::{Command, Terminal, TerminalError};
