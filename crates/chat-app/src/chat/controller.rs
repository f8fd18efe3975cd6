use std::fmt;
use std::sync::Arc;

use econ_chat_backend::{BoxFuture, FetchResult, ReplyClient, ReplyRequest};
use econ_chat_storage::{SessionId, TurnId};
use tokio::sync::mpsc;

use crate::chat::events::{SessionEvent, SessionSnapshot};
use crate::chat::message::{Attachment, ReplyTarget, RequestId, Turn};
use crate::chat::state::{ChatState, ChatTransition, ChatTransitionRejection};

/// Bot turn content appended whenever the backend call fails, whatever the cause.
pub const FALLBACK_MESSAGE: &str =
    "I'm having trouble responding right now. Please try again later.";

/// Result of one dispatched request, routed back by its target.
#[derive(Debug)]
pub struct ReplyOutcome {
    pub target: ReplyTarget,
    pub result: FetchResult<String>,
}

/// In-flight backend request handed out by [`ChatController::submit`].
///
/// Owns the request future, so the caller may keep editing the controller's buffers
/// while awaiting it.
pub struct PendingReply {
    target: ReplyTarget,
    request: BoxFuture<'static, FetchResult<String>>,
}

impl PendingReply {
    pub fn target(&self) -> ReplyTarget {
        self.target
    }

    pub async fn wait(self) -> ReplyOutcome {
        let result = self.request.await;
        ReplyOutcome {
            target: self.target,
            result,
        }
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PendingReply")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Owns the state of the single conversation: transcript, input buffers and the
/// request lifecycle.
pub struct ChatController {
    client: Arc<dyn ReplyClient>,
    session_id: SessionId,
    transcript: Vec<Turn>,
    pending_input: String,
    pending_attachments: Vec<Attachment>,
    state: ChatState,
    next_request_id: u64,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl ChatController {
    pub fn new(client: Arc<dyn ReplyClient>, session_id: SessionId) -> Self {
        Self {
            client,
            session_id,
            transcript: Vec::new(),
            pending_input: String::new(),
            pending_attachments: Vec::new(),
            state: ChatState::Idle,
            next_request_id: 1,
            subscribers: Vec::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn pending_attachments(&self) -> &[Attachment] {
        &self.pending_attachments
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            transcript: self.transcript.clone(),
            pending_input: self.pending_input.clone(),
            pending_attachments: self.pending_attachments.clone(),
            busy: self.is_busy(),
        }
    }

    /// Registers a listener for state changes. Dropped receivers are pruned on the next event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Replaces the input buffer. Allowed while a reply is pending.
    pub fn update_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
        self.emit(SessionEvent::InputChanged(self.pending_input.clone()));
    }

    /// Replaces the attachment selection. Allowed while a reply is pending.
    pub fn set_attachments(&mut self, attachments: Vec<Attachment>) {
        self.pending_attachments = attachments;
        self.emit(SessionEvent::AttachmentsChanged(
            self.pending_attachments.clone(),
        ));
    }

    /// Appends the user turn and dispatches one backend request.
    ///
    /// Returns `None` without side effects while a reply is pending or when there is
    /// neither non-whitespace input nor an attachment.
    pub fn submit(&mut self) -> Option<PendingReply> {
        if let ChatState::AwaitingReply(active) = self.state {
            tracing::debug!(
                session_id = %self.session_id,
                request_id = active.request_id.0,
                "ignored submit while awaiting reply"
            );
            return None;
        }
        if self.pending_input.trim().is_empty() && self.pending_attachments.is_empty() {
            tracing::debug!(session_id = %self.session_id, "ignored empty submit");
            return None;
        }

        let target = ReplyTarget::new(self.session_id, RequestId::new(self.next_request_id));
        let next_state = match self.state.apply(ChatTransition::Dispatch(target)) {
            Ok(next_state) => next_state,
            Err(rejection) => {
                tracing::warn!(?rejection, "rejected request dispatch");
                return None;
            }
        };
        self.next_request_id += 1;

        let content = std::mem::take(&mut self.pending_input);
        let attachments = std::mem::take(&mut self.pending_attachments);
        let request = ReplyRequest::new(content.clone(), self.session_id);
        let turn = Turn::user(content, attachments);
        self.transcript.push(turn.clone());
        self.state = next_state;

        tracing::info!(
            session_id = %self.session_id,
            request_id = target.request_id.0,
            turn_id = %turn.id,
            attachments = turn.attachments.len(),
            "dispatching reply request"
        );
        let request = self.client.fetch_reply(request);

        self.emit(SessionEvent::TurnAppended(turn));
        self.emit(SessionEvent::InputChanged(String::new()));
        self.emit(SessionEvent::AttachmentsChanged(Vec::new()));
        self.emit(SessionEvent::BusyChanged(true));

        Some(PendingReply { target, request })
    }

    /// Appends the bot turn for the active request and returns to idle.
    ///
    /// Outcomes for any other request are rejected and change nothing.
    pub fn resolve(&mut self, outcome: ReplyOutcome) -> Result<TurnId, ChatTransitionRejection> {
        let next_state = self
            .state
            .apply(ChatTransition::Resolve(outcome.target))
            .inspect_err(|rejection| {
                tracing::warn!(
                    session_id = %self.session_id,
                    request_id = outcome.target.request_id.0,
                    ?rejection,
                    "dropped reply for inactive request"
                );
            })?;

        let (content, failure) = match outcome.result {
            Ok(reply) => (reply, None),
            Err(error) => {
                let kind = error.kind();
                tracing::warn!(
                    session_id = %self.session_id,
                    request_id = outcome.target.request_id.0,
                    kind = %kind,
                    %error,
                    "reply request failed"
                );
                (FALLBACK_MESSAGE.to_string(), Some(kind))
            }
        };

        let turn = Turn::bot(content);
        let turn_id = turn.id;
        self.transcript.push(turn.clone());
        self.state = next_state;

        tracing::info!(
            session_id = %self.session_id,
            request_id = outcome.target.request_id.0,
            turn_id = %turn_id,
            failed = failure.is_some(),
            "resolved reply request"
        );

        self.emit(SessionEvent::TurnAppended(turn));
        if let Some(kind) = failure {
            self.emit(SessionEvent::ReplyFailed { kind });
        }
        self.emit(SessionEvent::BusyChanged(false));

        Ok(turn_id)
    }

    /// Submits, awaits the reply and resolves it. Returns the bot turn id when a request ran.
    pub async fn submit_and_wait(&mut self) -> Option<TurnId> {
        let pending = self.submit()?;
        let outcome = pending.wait().await;
        self.resolve(outcome).ok()
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
