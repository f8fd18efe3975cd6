pub mod controller;
pub mod events;
pub mod feedback;
pub mod message;
pub mod state;

pub use controller::{ChatController, FALLBACK_MESSAGE, PendingReply, ReplyOutcome};
pub use events::{SessionEvent, SessionSnapshot};
pub use feedback::{FeedbackLedger, FeedbackSink};
pub use message::{Attachment, AttachmentError, ReplyTarget, RequestId, Role, Turn};
pub use state::{ChatState, ChatTransition, ChatTransitionRejection};
