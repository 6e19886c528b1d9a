//! Parser for the action protocol the model embeds in its replies.
//!
//! A reply that performs an action is exactly `[ACTION:<type>:<payload>]` and nothing
//! else. Anything that deviates is rejected; the caller never sees a half-built action.

use serde::Deserialize;

use crate::page::Theme;
use crate::section::SectionId;

pub const ACTION_MARKER: &str = "[ACTION:";

/// A contact message drafted by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDraft {
    pub name: String,
    pub email: String,
    /// Empty when the model did not draft one.
    pub subject: String,
    pub message: String,
}

/// A side effect the model asked for, with only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDescriptor {
    Scroll { section: SectionId },
    Theme { theme: Theme },
    Link { url: String, name: String },
    ContactForm(ContactDraft),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Scroll,
    Theme,
    Link,
    ContactForm,
}

impl ActionDescriptor {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Scroll { .. } => ActionKind::Scroll,
            Self::Theme { .. } => ActionKind::Theme,
            Self::Link { .. } => ActionKind::Link,
            Self::ContactForm(_) => ActionKind::ContactForm,
        }
    }
}

/// Why a reply that started with the marker was not a valid action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidAction {
    MissingMarker,
    Unterminated,
    MissingSeparator,
    UnknownKind(String),
    UnknownSection(String),
    UnknownTheme(String),
    MalformedLink(String),
    UnsupportedScheme(String),
    MalformedContactJson(String),
    MissingContactField(&'static str),
}

/// Result of parsing one completed reply. Exactly one branch applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Action(ActionDescriptor),
    /// Well-formed but not confirmable; the text is shown to the user instead.
    Clarification(String),
    Invalid(InvalidAction),
}

pub fn is_action_reply(reply: &str) -> bool {
    reply.starts_with(ACTION_MARKER)
}

#[derive(Deserialize)]
struct ContactPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Parses a completed reply against the action grammar.
///
/// `current_theme` turns a request for the theme already in use into a clarification.
pub fn parse_action(reply: &str, current_theme: Theme) -> ParseOutcome {
    match parse_descriptor(reply, current_theme) {
        Ok(Parsed::Action(action)) => ParseOutcome::Action(action),
        Ok(Parsed::Clarification(text)) => ParseOutcome::Clarification(text),
        Err(invalid) => ParseOutcome::Invalid(invalid),
    }
}

enum Parsed {
    Action(ActionDescriptor),
    Clarification(String),
}

fn parse_descriptor(reply: &str, current_theme: Theme) -> Result<Parsed, InvalidAction> {
    let Some(body) = reply.strip_prefix(ACTION_MARKER) else {
        return Err(InvalidAction::MissingMarker);
    };
    // Trailing whitespace after the closing bracket is tolerated; nothing else is.
    let Some(interior) = body.trim_end().strip_suffix(']') else {
        return Err(InvalidAction::Unterminated);
    };
    let Some((kind, rest)) = interior.split_once(':') else {
        return Err(InvalidAction::MissingSeparator);
    };

    let action = match kind {
        "scroll" => {
            let section = SectionId::parse(rest)
                .ok_or_else(|| InvalidAction::UnknownSection(rest.to_string()))?;
            ActionDescriptor::Scroll { section }
        }
        "theme" => {
            let theme =
                Theme::parse(rest).ok_or_else(|| InvalidAction::UnknownTheme(rest.to_string()))?;
            if theme == current_theme {
                return Ok(Parsed::Clarification(format!(
                    "You're already in {current_theme} mode. Did you mean to switch to {} mode?",
                    current_theme.opposite()
                )));
            }
            ActionDescriptor::Theme { theme }
        }
        "link" => parse_link(rest)?,
        "contact_form" => ActionDescriptor::ContactForm(parse_contact(rest)?),
        other => return Err(InvalidAction::UnknownKind(other.to_string())),
    };

    Ok(Parsed::Action(action))
}

fn parse_link(rest: &str) -> Result<ActionDescriptor, InvalidAction> {
    let Some((url, name)) = rest.rsplit_once(':') else {
        return Err(InvalidAction::MalformedLink(rest.to_string()));
    };
    if url.is_empty() || name.is_empty() {
        return Err(InvalidAction::MalformedLink(rest.to_string()));
    }
    if !(url.starts_with("http:") || url.starts_with("https:")) {
        return Err(InvalidAction::UnsupportedScheme(url.to_string()));
    }

    Ok(ActionDescriptor::Link {
        url: url.to_string(),
        name: name.to_string(),
    })
}

fn parse_contact(rest: &str) -> Result<ContactDraft, InvalidAction> {
    let payload: ContactPayload = serde_json::from_str(rest)
        .map_err(|error| InvalidAction::MalformedContactJson(error.to_string()))?;

    let required = |value: Option<String>, field: &'static str| {
        value
            .filter(|value| !value.trim().is_empty())
            .ok_or(InvalidAction::MissingContactField(field))
    };

    Ok(ContactDraft {
        name: required(payload.name, "name")?,
        email: required(payload.email, "email")?,
        subject: payload.subject.unwrap_or_default(),
        message: required(payload.message, "message")?,
    })
}
