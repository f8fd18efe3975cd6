use econ_chat_backend::FetchErrorKind;
use econ_chat_storage::SessionId;

use crate::chat::message::{Attachment, Turn};

/// Change notifications pushed to presentation bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TurnAppended(Turn),
    BusyChanged(bool),
    InputChanged(String),
    AttachmentsChanged(Vec<Attachment>),
    /// The backend call failed and a fallback turn was appended.
    ReplyFailed { kind: FetchErrorKind },
}

/// Owned copy of the observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub transcript: Vec<Turn>,
    pub pending_input: String,
    pub pending_attachments: Vec<Attachment>,
    pub busy: bool,
}
