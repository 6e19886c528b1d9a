use folio_llm::{ProviderMessage, Role, StreamTarget};

use crate::confirm::{
    ActionState, ActionTransition, ActionTransitionRejection, Decision, PendingAction,
};
use crate::contact::ContactFlow;

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set while this message displays Yes/No controls.
    pub is_confirmation: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_confirmation: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        ProviderMessage::new(self.role, self.content.clone())
    }
}

/// The single owned conversation of the chat widget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    stream_state: StreamState,
    action_state: ActionState,
    contact_flow: ContactFlow,
    /// True while the transcript only holds a startup failure notice.
    failure_seeded: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream_state
    }

    pub fn action_state(&self) -> &ActionState {
        &self.action_state
    }

    pub fn contact_flow(&self) -> ContactFlow {
        self.contact_flow
    }

    pub fn contact_flow_mut(&mut self) -> &mut ContactFlow {
        &mut self.contact_flow
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.action_state.pending()
    }

    /// True when nothing worth keeping is in the transcript yet.
    pub fn needs_greeting(&self) -> bool {
        self.messages.is_empty() || self.failure_seeded
    }

    /// Drops everything and starts over from the greeting.
    pub fn reset(&mut self, greeting: &str) {
        *self = Self {
            messages: vec![Message::assistant(greeting)],
            ..Self::default()
        };
    }

    /// Replaces the transcript with a single startup failure notice.
    pub fn seed_failure(&mut self, notice: impl Into<String>) {
        *self = Self {
            messages: vec![Message::assistant(notice)],
            failure_seeded: true,
            ..Self::default()
        };
    }

    /// Appends a message and returns its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.failure_seeded = false;
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Rewrites an assistant message in place; other roles are left alone.
    pub fn set_assistant_content(&mut self, index: usize, content: impl Into<String>) -> bool {
        match self.messages.get_mut(index) {
            Some(message) if message.role == Role::Assistant => {
                message.content = content.into();
                true
            }
            _ => false,
        }
    }

    pub fn apply_stream_transition(
        &mut self,
        transition: StreamTransition,
    ) -> StreamTransitionResult {
        let next_state = self.stream_state.apply(transition)?;
        self.stream_state = next_state.clone();
        Ok(next_state)
    }

    /// Marks the message at `message_index` as a confirmation prompt for `pending`.
    pub fn arm_action(
        &mut self,
        pending: PendingAction,
        prompt: impl Into<String>,
    ) -> Result<(), ActionTransitionRejection> {
        let index = pending.message_index;
        self.action_state = self.action_state.apply(ActionTransition::Arm(pending))?;
        if let Some(message) = self.messages.get_mut(index) {
            message.content = prompt.into();
            message.is_confirmation = true;
        }
        Ok(())
    }

    /// Leaves `AwaitingConfirmation`, stripping the confirmation controls in the same step.
    pub fn take_pending(
        &mut self,
        decision: Decision,
    ) -> Result<PendingAction, ActionTransitionRejection> {
        let pending = self
            .action_state
            .pending()
            .cloned()
            .ok_or(ActionTransitionRejection::NothingPending)?;
        self.action_state = self.action_state.apply(ActionTransition::Resolve(decision))?;

        if let Some(message) = self.messages.get_mut(pending.message_index) {
            message.is_confirmation = false;
            message.content = pending.resolved_prompt(&message.content, decision);
        }
        Ok(pending)
    }

    pub fn finish_action(&mut self) -> Result<(), ActionTransitionRejection> {
        self.action_state = self.action_state.apply(ActionTransition::Finish)?;
        Ok(())
    }
}

/// Stream lifecycle of the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamTarget),
    Done(StreamTarget),
    Error {
        target: StreamTarget,
        message: String,
    },
    Cancelled(StreamTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
    Cancel(StreamTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyStreaming {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream,
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => None,
        }
    }

    /// Returns true when incoming stream data belongs to the live turn.
    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if *active == target)
    }

    /// Non-streaming states may start a new turn directly; terminal transitions must
    /// name the active turn exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(target) => match self {
                Self::Streaming(active) => Err(StreamTransitionRejection::AlreadyStreaming {
                    active: *active,
                    attempted: target,
                }),
                Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                    Ok(Self::Streaming(target))
                }
            },
            StreamTransition::Complete(target) => self.finish_with(target, Self::Done(target)),
            StreamTransition::Fail { target, message } => {
                self.finish_with(target, Self::Error { target, message })
            }
            StreamTransition::Cancel(target) => self.finish_with(target, Self::Cancelled(target)),
        }
    }

    fn finish_with(&self, target: StreamTarget, next: StreamState) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(next),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Done(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}
