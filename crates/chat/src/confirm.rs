use crate::action::{ActionDescriptor, ActionKind};

pub const PROCESSING_FORM_MESSAGE: &str = "Processing form submission...";
pub const CANCELLED_FORM_MESSAGE: &str = "Okay, cancelled form submission.";
pub const NO_SUBJECT_PLACEHOLDER: &str = "(No Subject Drafted)";
const FORM_QUESTION: &str = "Should I fill the contact form with this information and send it?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Confirm,
    Deny,
}

/// The single action waiting on a Yes/No answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub action: ActionDescriptor,
    /// Index of the assistant message showing the confirmation controls.
    pub message_index: usize,
}

impl PendingAction {
    pub fn new(action: ActionDescriptor, message_index: usize) -> Self {
        Self {
            action,
            message_index,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    /// Text the confirmation message keeps once the controls are gone.
    pub(crate) fn resolved_prompt(&self, prompt: &str, decision: Decision) -> String {
        match (self.kind(), decision) {
            (ActionKind::ContactForm, Decision::Confirm) => PROCESSING_FORM_MESSAGE.to_string(),
            (ActionKind::ContactForm, Decision::Deny) => CANCELLED_FORM_MESSAGE.to_string(),
            _ => prompt.to_string(),
        }
    }
}

/// Builds the question shown with the Yes/No controls.
pub fn confirmation_prompt(action: &ActionDescriptor, owner: &str) -> String {
    match action {
        ActionDescriptor::Scroll { section } => {
            format!("Do you want me to scroll to the \"{section}\" section?")
        }
        ActionDescriptor::Theme { theme } => format!("Do you want to switch to {theme} mode?"),
        ActionDescriptor::Link { name, .. } => {
            format!("Do you want me to open {owner}'s {name} profile in a new tab?")
        }
        ActionDescriptor::ContactForm(draft) => {
            let subject = if draft.subject.trim().is_empty() {
                NO_SUBJECT_PLACEHOLDER
            } else {
                draft.subject.as_str()
            };
            format!(
                "I've drafted the following message based on our conversation:\n\n\
                 **Subject:** {subject}\n**Message:**\n{}\n\n{FORM_QUESTION}",
                draft.message
            )
        }
    }
}

/// Confirmation lifecycle. Only `Idle` accepts new user input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    AwaitingConfirmation(PendingAction),
    Executing(ActionKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTransition {
    Arm(PendingAction),
    Resolve(Decision),
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTransitionRejection {
    AlreadyPending {
        active: ActionKind,
        attempted: ActionKind,
    },
    StillExecuting(ActionKind),
    NothingPending,
    NotExecuting,
}

impl ActionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        match self {
            Self::AwaitingConfirmation(pending) => Some(pending),
            Self::Idle | Self::Executing(_) => None,
        }
    }

    /// Applies one transition. A second action never replaces the pending one.
    ///
    /// Confirming moves to `Executing` until the side effect reports back; denying goes
    /// straight to `Idle` since any compensation runs without further state.
    pub fn apply(&self, transition: ActionTransition) -> Result<Self, ActionTransitionRejection> {
        match (self, transition) {
            (Self::Idle, ActionTransition::Arm(pending)) => Ok(Self::AwaitingConfirmation(pending)),
            (Self::AwaitingConfirmation(active), ActionTransition::Arm(attempted)) => {
                Err(ActionTransitionRejection::AlreadyPending {
                    active: active.kind(),
                    attempted: attempted.kind(),
                })
            }
            (Self::Executing(kind), ActionTransition::Arm(_)) => {
                Err(ActionTransitionRejection::StillExecuting(*kind))
            }
            (Self::AwaitingConfirmation(pending), ActionTransition::Resolve(Decision::Confirm)) => {
                Ok(Self::Executing(pending.kind()))
            }
            (Self::AwaitingConfirmation(_), ActionTransition::Resolve(Decision::Deny)) => {
                Ok(Self::Idle)
            }
            (Self::Idle | Self::Executing(_), ActionTransition::Resolve(_)) => {
                Err(ActionTransitionRejection::NothingPending)
            }
            (Self::Executing(_), ActionTransition::Finish) => Ok(Self::Idle),
            // Denials are already idle by the time their follow-up message lands.
            (Self::Idle, ActionTransition::Finish) => Ok(Self::Idle),
            (Self::AwaitingConfirmation(_), ActionTransition::Finish) => {
                Err(ActionTransitionRejection::NotExecuting)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ContactDraft;
    use crate::page::Theme;
    use crate::section::SectionId;

    fn scroll(index: usize) -> PendingAction {
        PendingAction::new(
            ActionDescriptor::Scroll {
                section: SectionId::Projects,
            },
            index,
        )
    }

    #[test]
    fn second_action_is_rejected_not_overwritten() {
        let armed = ActionState::Idle
            .apply(ActionTransition::Arm(scroll(1)))
            .unwrap_or_default();
        let theme = PendingAction::new(ActionDescriptor::Theme { theme: Theme::Dark }, 2);

        assert_eq!(
            armed.apply(ActionTransition::Arm(theme)),
            Err(ActionTransitionRejection::AlreadyPending {
                active: ActionKind::Scroll,
                attempted: ActionKind::Theme,
            })
        );
        assert_eq!(armed.pending(), Some(&scroll(1)));
    }

    #[test]
    fn confirm_executes_then_finishes_and_deny_goes_idle() {
        let armed = ActionState::AwaitingConfirmation(scroll(1));

        let executing = armed.apply(ActionTransition::Resolve(Decision::Confirm));
        assert_eq!(executing, Ok(ActionState::Executing(ActionKind::Scroll)));
        assert_eq!(
            ActionState::Executing(ActionKind::Scroll).apply(ActionTransition::Finish),
            Ok(ActionState::Idle)
        );
        assert_eq!(
            armed.apply(ActionTransition::Resolve(Decision::Deny)),
            Ok(ActionState::Idle)
        );
        assert_eq!(
            ActionState::Idle.apply(ActionTransition::Resolve(Decision::Confirm)),
            Err(ActionTransitionRejection::NothingPending)
        );
    }

    #[test]
    fn prompts_follow_action_kind() {
        assert_eq!(
            confirmation_prompt(&scroll(0).action, "Varun"),
            "Do you want me to scroll to the \"projects\" section?"
        );
        assert_eq!(
            confirmation_prompt(
                &ActionDescriptor::Link {
                    url: "https://github.com/x".to_string(),
                    name: "GitHub".to_string(),
                },
                "Varun"
            ),
            "Do you want me to open Varun's GitHub profile in a new tab?"
        );

        let draft = ActionDescriptor::ContactForm(ContactDraft {
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            subject: String::new(),
            message: "hi".to_string(),
        });
        let prompt = confirmation_prompt(&draft, "Varun");
        assert!(prompt.contains("**Subject:** (No Subject Drafted)"));
        assert!(prompt.ends_with(FORM_QUESTION));
    }

    #[test]
    fn contact_form_prompt_is_rewritten_on_resolution() {
        let pending = PendingAction::new(
            ActionDescriptor::ContactForm(ContactDraft {
                name: "A".to_string(),
                email: "a@b.com".to_string(),
                subject: "Hello".to_string(),
                message: "hi".to_string(),
            }),
            3,
        );
        assert_eq!(
            pending.resolved_prompt("draft", Decision::Confirm),
            PROCESSING_FORM_MESSAGE
        );
        assert_eq!(
            pending.resolved_prompt("draft", Decision::Deny),
            CANCELLED_FORM_MESSAGE
        );
        assert_eq!(scroll(0).resolved_prompt("question", Decision::Deny), "question");
    }
}
