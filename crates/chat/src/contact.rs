use crate::action::ActionKind;

/// Prose turns allowed while collecting details before the flow is dropped.
pub const MAX_COLLECTING_TURNS: u8 = 4;

const CONTACT_INTENT_PHRASES: [&str; 8] = [
    "contact",
    "get in touch",
    "reach out",
    "reach him",
    "reach her",
    "send a message",
    "send him a message",
    "hire",
];

/// Whether the conversation is in the middle of gathering contact-form details.
///
/// The model asks for name, email, and message in prose first and drafts the form on a
/// later turn; this tracks that span explicitly so the prompt can hold it on course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContactFlow {
    #[default]
    Inactive,
    Collecting {
        turns: u8,
    },
}

/// How a finished turn ended, as far as the contact flow cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Prose,
    Action(ActionKind),
    Failed,
}

pub fn is_contact_intent(text: &str) -> bool {
    let text = text.to_lowercase();
    CONTACT_INTENT_PHRASES
        .iter()
        .any(|phrase| text.contains(phrase))
}

impl ContactFlow {
    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::Collecting { .. })
    }

    /// Advances the flow after one completed turn.
    pub fn observe_turn(&mut self, user_text: &str, turn: TurnKind) {
        let next = match (*self, turn) {
            (Self::Inactive, TurnKind::Prose) if is_contact_intent(user_text) => {
                Self::Collecting { turns: 1 }
            }
            (Self::Inactive, _) => Self::Inactive,
            (Self::Collecting { turns }, TurnKind::Prose) if turns < MAX_COLLECTING_TURNS => {
                Self::Collecting { turns: turns + 1 }
            }
            (Self::Collecting { .. }, TurnKind::Prose) => {
                tracing::debug!("contact collection abandoned after too many turns");
                Self::Inactive
            }
            // Failed turns leave the flow where it was so the user can retry.
            (Self::Collecting { turns }, TurnKind::Failed) => Self::Collecting { turns },
            (Self::Collecting { .. }, TurnKind::Action(_)) => Self::Inactive,
        };

        if next != *self {
            tracing::debug!(from = ?*self, to = ?next, "contact flow changed");
        }
        *self = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_intent_is_keyword_based() {
        assert!(is_contact_intent("I want to contact Varun"));
        assert!(is_contact_intent("How can I get in touch?"));
        assert!(!is_contact_intent("What skills does he have?"));
    }

    #[test]
    fn prose_after_intent_starts_collection_and_draft_ends_it() {
        let mut flow = ContactFlow::default();
        flow.observe_turn("I want to contact Varun", TurnKind::Prose);
        assert_eq!(flow, ContactFlow::Collecting { turns: 1 });

        flow.observe_turn("I'm Ana, ana@x.io, about a job", TurnKind::Prose);
        assert_eq!(flow, ContactFlow::Collecting { turns: 2 });

        flow.observe_turn("that's all", TurnKind::Action(ActionKind::ContactForm));
        assert_eq!(flow, ContactFlow::Inactive);
    }

    #[test]
    fn intent_answered_with_action_does_not_start_collection() {
        let mut flow = ContactFlow::default();
        flow.observe_turn("scroll to contact", TurnKind::Action(ActionKind::Scroll));
        assert!(!flow.is_collecting());
    }

    #[test]
    fn collection_gives_up_after_turn_limit() {
        let mut flow = ContactFlow::Collecting {
            turns: MAX_COLLECTING_TURNS,
        };
        flow.observe_turn("tell me about his projects", TurnKind::Prose);
        assert_eq!(flow, ContactFlow::Inactive);
    }

    #[test]
    fn failed_turn_keeps_collection() {
        let mut flow = ContactFlow::Collecting { turns: 2 };
        flow.observe_turn("Ana", TurnKind::Failed);
        assert_eq!(flow, ContactFlow::Collecting { turns: 2 });
    }
}
