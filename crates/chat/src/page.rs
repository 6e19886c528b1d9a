use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PageError;
use crate::section::SectionId;

/// Display theme of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the contact form the agent can write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Name,
    Email,
    Subject,
    Message,
}

pub const CONTACT_SUBMIT_ID: &str = "contact-submit";

impl FormField {
    pub const ALL: [FormField; 4] = [Self::Name, Self::Email, Self::Subject, Self::Message];

    /// Element id of the input on the page.
    pub const fn element_id(self) -> &'static str {
        match self {
            Self::Name => "contact-name",
            Self::Email => "contact-email",
            Self::Subject => "contact-subject",
            Self::Message => "contact-message",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_id())
    }
}

/// Side effects the agent performs on the surrounding page.
///
/// Implementations own the mutable page state; the agent only calls in after the user
/// confirmed (or denied) an action.
pub trait PageHost {
    /// Brings the anchor into view. Returns false when the anchor does not exist.
    fn scroll_to_section(&mut self, section: SectionId) -> bool;

    fn set_theme(&mut self, theme: Theme);

    /// Opens `url` in a new browsing context. Returns false when nothing was opened.
    fn open_link(&mut self, url: &str) -> bool;

    /// Writes a form value and notifies the form framework of the change.
    ///
    /// `Ok(false)` means the field is not on the page; `Err` means the write itself failed.
    fn set_form_field(&mut self, field: FormField, value: &str) -> Result<bool, PageError>;

    /// Presses the submit control. Returns false when the control is missing.
    fn click_submit(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_parsing_is_exact() {
        assert_eq!(Theme::parse("dark"), Some(Theme::Dark));
        assert_eq!(Theme::parse("Dark"), None);
        assert_eq!(Theme::Dark.opposite(), Theme::Light);
    }

    #[test]
    fn form_fields_map_to_fixed_element_ids() {
        let ids = FormField::ALL.map(FormField::element_id);
        assert_eq!(
            ids,
            [
                "contact-name",
                "contact-email",
                "contact-subject",
                "contact-message"
            ]
        );
    }
}
