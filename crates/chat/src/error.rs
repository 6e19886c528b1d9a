use snafu::Snafu;

use crate::confirm::ActionTransitionRejection;
use crate::page::FormField;

/// Why the widget refused a new user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejection {
    Empty,
    Initializing,
    Generating,
    ActionPending,
    ModelSwitchPending,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("input rejected on `{stage}`: {reason:?}"))]
    InputRejected {
        stage: &'static str,
        reason: InputRejection,
    },
    #[snafu(display("action state rejected transition on `{stage}`: {rejection:?}"))]
    ActionTransition {
        stage: &'static str,
        rejection: ActionTransitionRejection,
    },
    #[snafu(display("no model switch is awaiting confirmation"))]
    NoPendingModelSwitch { stage: &'static str },
    #[snafu(display("model '{model_id}' is already active"))]
    SameModel {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("suggestion {index} does not exist"))]
    UnknownSuggestion { stage: &'static str, index: usize },
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum PageError {
    #[snafu(display("failed to write form field {field} on `{stage}`: {message}"))]
    FieldWrite {
        stage: &'static str,
        field: FormField,
        message: String,
    },
}
