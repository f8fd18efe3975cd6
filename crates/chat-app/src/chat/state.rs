use crate::chat::message::ReplyTarget;

/// Request lifecycle of the single conversation.
///
/// At most one backend request is outstanding; the state machine, not a lock, enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Idle,
    AwaitingReply(ReplyTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTransition {
    Dispatch(ReplyTarget),
    Resolve(ReplyTarget),
}

/// Rejection reason for illegal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTransitionRejection {
    AlreadyAwaiting {
        active: ReplyTarget,
        attempted: ReplyTarget,
    },
    NoActiveRequest,
    TargetMismatch {
        active: ReplyTarget,
        attempted: ReplyTarget,
    },
}

pub type ChatTransitionResult = Result<ChatState, ChatTransitionRejection>;

impl ChatState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::AwaitingReply(_))
    }

    pub fn active_target(&self) -> Option<ReplyTarget> {
        match self {
            Self::AwaitingReply(target) => Some(*target),
            Self::Idle => None,
        }
    }

    /// Applies one transition. A resolve must name the active request exactly.
    pub fn apply(&self, transition: ChatTransition) -> ChatTransitionResult {
        match transition {
            ChatTransition::Dispatch(target) => self.apply_dispatch(target),
            ChatTransition::Resolve(target) => self.apply_resolve(target),
        }
    }

    fn apply_dispatch(&self, target: ReplyTarget) -> ChatTransitionResult {
        match self {
            Self::Idle => Ok(Self::AwaitingReply(target)),
            Self::AwaitingReply(active) => Err(ChatTransitionRejection::AlreadyAwaiting {
                active: *active,
                attempted: target,
            }),
        }
    }

    fn apply_resolve(&self, target: ReplyTarget) -> ChatTransitionResult {
        match self {
            Self::AwaitingReply(active) if *active == target => Ok(Self::Idle),
            Self::AwaitingReply(active) => Err(ChatTransitionRejection::TargetMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle => Err(ChatTransitionRejection::NoActiveRequest),
        }
    }
}
