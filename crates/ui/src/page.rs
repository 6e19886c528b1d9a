use std::collections::HashMap;

use folio_chat::{FormField, PageError, PageHost, SectionBounds, SectionId, SectionTracker, Theme};

pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 900.0;
const DEFAULT_SECTION_HEIGHT: f64 = 1000.0;

/// A submitted copy of the contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Headless stand-in for the portfolio page.
///
/// Sections are stacked vertically; scrolling moves the viewport and re-runs the section
/// tracker the same way a scroll listener would.
#[derive(Debug, Clone)]
pub struct MemoryPage {
    layout: Vec<SectionBounds>,
    viewport_height: f64,
    scroll_y: f64,
    tracker: SectionTracker,
    theme: Theme,
    opened_links: Vec<String>,
    fields: HashMap<FormField, String>,
    /// Input notifications fired per field, as a form framework would observe them.
    field_changes: HashMap<FormField, usize>,
    has_submit: bool,
    submissions: Vec<ContactSubmission>,
}

impl MemoryPage {
    pub fn new(sections: &[SectionId], theme: Theme) -> Self {
        let layout = sections
            .iter()
            .enumerate()
            .map(|(index, id)| {
                SectionBounds::new(*id, index as f64 * DEFAULT_SECTION_HEIGHT, DEFAULT_SECTION_HEIGHT)
            })
            .collect::<Vec<_>>();
        let fields = if sections.contains(&SectionId::Contact) {
            FormField::ALL
                .into_iter()
                .map(|field| (field, String::new()))
                .collect()
        } else {
            HashMap::new()
        };
        let has_submit = !fields.is_empty();

        let mut page = Self {
            layout,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            scroll_y: 0.0,
            tracker: SectionTracker::new(),
            theme,
            opened_links: Vec::new(),
            fields,
            field_changes: HashMap::new(),
            has_submit,
            submissions: Vec::new(),
        };
        page.scroll_to(0.0);
        page
    }

    pub fn portfolio(theme: Theme) -> Self {
        Self::new(&SectionId::ALL, theme)
    }

    pub fn current_section(&self) -> SectionId {
        self.tracker.current()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn opened_links(&self) -> &[String] {
        &self.opened_links
    }

    pub fn field(&self, field: FormField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn field_changes(&self, field: FormField) -> usize {
        self.field_changes.get(&field).copied().unwrap_or(0)
    }

    pub fn submissions(&self) -> &[ContactSubmission] {
        &self.submissions
    }

    /// Moves the viewport and updates the tracked section.
    pub fn scroll_to(&mut self, scroll_y: f64) -> SectionId {
        self.scroll_y = scroll_y.max(0.0);
        self.tracker
            .observe(self.scroll_y, self.viewport_height, &self.layout)
    }

    /// Types into a field the way a visitor would.
    pub fn type_into(&mut self, field: FormField, value: &str) {
        if let Some(current) = self.fields.get_mut(&field) {
            *current = value.to_string();
        }
    }

    fn field_value(&self, field: FormField) -> String {
        self.fields.get(&field).cloned().unwrap_or_default()
    }
}

impl PageHost for MemoryPage {
    fn scroll_to_section(&mut self, section: SectionId) -> bool {
        let Some(top) = self
            .layout
            .iter()
            .find(|bounds| bounds.id == section)
            .map(|bounds| bounds.top)
        else {
            tracing::debug!(%section, "scroll target missing from page");
            return false;
        };
        self.scroll_to(top);
        true
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    fn open_link(&mut self, url: &str) -> bool {
        tracing::info!(url, "opening link");
        self.opened_links.push(url.to_string());
        true
    }

    fn set_form_field(&mut self, field: FormField, value: &str) -> Result<bool, PageError> {
        let Some(current) = self.fields.get_mut(&field) else {
            return Ok(false);
        };
        *current = value.to_string();
        *self.field_changes.entry(field).or_default() += 1;
        Ok(true)
    }

    fn click_submit(&mut self) -> bool {
        if !self.has_submit {
            return false;
        }
        let submission = ContactSubmission {
            name: self.field_value(FormField::Name),
            email: self.field_value(FormField::Email),
            subject: self.field_value(FormField::Subject),
            message: self.field_value(FormField::Message),
        };
        tracing::info!(email = %submission.email, "contact form submitted");
        self.submissions.push(submission);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrolling_to_a_section_updates_the_tracker() {
        let mut page = MemoryPage::portfolio(Theme::Light);
        assert_eq!(page.current_section(), SectionId::Hero);

        assert!(page.scroll_to_section(SectionId::Projects));
        assert_eq!(page.current_section(), SectionId::Projects);
    }

    #[test]
    fn missing_contact_section_means_no_form() {
        let mut page = MemoryPage::new(&[SectionId::Hero, SectionId::About], Theme::Dark);

        assert!(!page.scroll_to_section(SectionId::Contact));
        assert_eq!(page.set_form_field(FormField::Name, "Ana"), Ok(false));
        assert!(!page.click_submit());
        assert!(page.submissions().is_empty());
    }

    #[test]
    fn form_writes_notify_and_submit_snapshots_values() {
        let mut page = MemoryPage::portfolio(Theme::Light);
        page.type_into(FormField::Name, "Ana");
        assert_eq!(page.set_form_field(FormField::Email, "ana@example.com"), Ok(true));
        assert_eq!(page.field_changes(FormField::Email), 1);
        assert_eq!(page.field_changes(FormField::Name), 0);

        assert!(page.click_submit());
        assert_eq!(page.submissions()[0].name, "Ana");
        assert_eq!(page.submissions()[0].email, "ana@example.com");
    }
}
