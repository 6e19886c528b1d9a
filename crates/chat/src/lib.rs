#![deny(unsafe_code)]

//! Conversation engine of the portfolio chat widget.
//!
//! [`ChatAgent`] owns the model session and the transcript. Hosts feed it user input and
//! page context, and supply a [`PageHost`] when a confirmed action has to touch the page.

pub mod action;
pub mod agent;
pub mod config;
pub mod confirm;
pub mod contact;
pub mod error;
pub mod message;
pub mod page;
pub mod prompt;
pub mod section;
pub mod stream;

pub use action::{ActionDescriptor, ActionKind, ContactDraft, InvalidAction, ParseOutcome, parse_action};
pub use agent::{ActionReport, ChatAgent, StopHandle, TurnContext};
pub use config::{AgentConfig, Suggestion, default_greeting, suggestions};
pub use confirm::{ActionState, Decision, PendingAction};
pub use contact::ContactFlow;
pub use error::{ChatError, ChatResult, InputRejection, PageError};
pub use message::{Conversation, Message, StreamState};
pub use page::{FormField, PageHost, Theme};
pub use prompt::{PortfolioPrompt, PromptBuilder, PromptContext};
pub use section::{SectionBounds, SectionId, SectionTracker};
pub use stream::{ReplyAccumulator, TurnOutcome};
