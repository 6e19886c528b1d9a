use folio_llm::{ProviderMessage, Role};

use crate::message::Message;
use crate::page::Theme;
use crate::section::SectionId;

/// Page context captured when a turn is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptContext {
    pub section: SectionId,
    pub theme: Theme,
    pub collecting_contact: bool,
}

/// Produces the system instruction for one turn.
pub trait PromptBuilder: Send + Sync {
    fn system_prompt(&self, context: &PromptContext) -> String;
}

/// Owner profile plus the action rules the model must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioPrompt {
    pub owner: String,
    pub profile: String,
    /// `(label, url)` pairs the model may open with a link action.
    pub links: Vec<(String, String)>,
}

impl PortfolioPrompt {
    pub fn new(owner: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            profile: profile.into(),
            links: Vec::new(),
        }
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push((label.into(), url.into()));
        self
    }

    fn section_list() -> String {
        SectionId::ALL
            .iter()
            .map(|id| format!("\"{id}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl PromptBuilder for PortfolioPrompt {
    fn system_prompt(&self, context: &PromptContext) -> String {
        let owner = &self.owner;
        let sections = Self::section_list();
        let links = if self.links.is_empty() {
            "*   (none)".to_string()
        } else {
            self.links
                .iter()
                .map(|(label, url)| format!("*   {label}: {url}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut prompt = format!(
            "You are {owner}'s AI assistant. Be professional and helpful.\n\
             Answer questions based *only* on the portfolio data below OR trigger an action \
             using the action format. **For action requests, respond ONLY with the action \
             string and NOTHING else.**\n\n\
             **Current Context:**\n\
             *   User is viewing section: \"{section}\"\n\
             *   Website theme: {theme}\n\
             *   Valid Scroll Sections: {sections}\n\n\
             **Portfolio Data:**\n{profile}\n\n\
             **Links:**\n{links}\n\n\
             **Action Formats:**\n\
             *   Scroll: `[ACTION:scroll:section_id]`\n\
             *   Theme: `[ACTION:theme:light]` or `[ACTION:theme:dark]`\n\
             *   Link: `[ACTION:link:url:link_name]`\n\
             *   Contact Form: `[ACTION:contact_form:{{\"name\": \"...\", \"email\": \"...\", \
             \"subject\": \"...\", \"message\": \"...\"}}]`\n\n\
             **Rules:**\n\
             1.  If the request maps unambiguously to an action, output ONLY the action string.\n\
             2.  If the requested theme is already active ({theme}), ask for clarification instead.\n\
             3.  If the user wants to contact {owner}, first ask for their name, email, and \
             message in a normal reply. Only once you have all three, output the contact_form \
             action with a drafted subject and message.\n\
             4.  Otherwise reply conversationally using Markdown, never mentioning the action format.\n\
             5.  If you don't know, say so politely. Keep answers concise.",
            section = context.section,
            theme = context.theme,
            profile = self.profile.trim(),
        );

        if context.collecting_contact {
            prompt.push_str(
                "\n\n**In progress:** You are collecting contact details. As soon as the user \
                 has given a name, an email, and what they want to say, output ONLY the \
                 `[ACTION:contact_form:{...}]` string. If something is missing, ask only for that.",
            );
        }

        prompt
    }
}

/// The last `window_size - 1` non-system messages of `history`.
///
/// One slot of the window is reserved for the message being sent.
pub fn context_window(history: &[Message], window_size: usize) -> Vec<ProviderMessage> {
    let keep = window_size.saturating_sub(1);
    let recent = history
        .iter()
        .filter(|message| message.role != Role::System)
        .collect::<Vec<_>>();
    let skip = recent.len().saturating_sub(keep);

    recent[skip..]
        .iter()
        .map(|message| message.to_provider_message())
        .collect()
}

/// System prompt, prior context, then the new user message.
pub fn request_messages(
    system_prompt: String,
    history: &[Message],
    user_text: &str,
    window_size: usize,
) -> Vec<ProviderMessage> {
    let mut messages = vec![ProviderMessage::new(Role::System, system_prompt)];
    messages.extend(context_window(history, window_size));
    messages.push(ProviderMessage::new(Role::User, user_text));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(collecting_contact: bool) -> PromptContext {
        PromptContext {
            section: SectionId::Skills,
            theme: Theme::Dark,
            collecting_contact,
        }
    }

    #[test]
    fn window_keeps_last_non_system_messages() {
        let history = vec![
            Message::new(Role::System, "rules"),
            Message::assistant("greeting"),
            Message::user("one"),
            Message::assistant("two"),
        ];
        let window = context_window(&history, 3);
        assert_eq!(
            window,
            vec![
                ProviderMessage::new(Role::User, "one"),
                ProviderMessage::new(Role::Assistant, "two"),
            ]
        );
        assert!(context_window(&history, 1).is_empty());
        assert!(context_window(&history, 0).is_empty());
    }

    #[test]
    fn request_starts_with_system_and_ends_with_user() {
        let history = vec![Message::assistant("greeting")];
        let messages = request_messages("sys".to_string(), &history, "hi", 3);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ProviderMessage::new(Role::System, "sys"));
        assert_eq!(messages[2], ProviderMessage::new(Role::User, "hi"));
    }

    #[test]
    fn prompt_carries_context_and_contact_reminder() {
        let builder = PortfolioPrompt::new("Varun", "Full-stack developer.")
            .with_link("GitHub", "https://github.com/Varun-Patkar");

        let idle = builder.system_prompt(&context(false));
        assert!(idle.contains("User is viewing section: \"skills\""));
        assert!(idle.contains("Website theme: dark"));
        assert!(idle.contains("*   GitHub: https://github.com/Varun-Patkar"));
        assert!(idle.contains("[ACTION:contact_form:{\"name\""));
        assert!(!idle.contains("**In progress:**"));

        let collecting = builder.system_prompt(&context(true));
        assert!(collecting.contains("**In progress:**"));
    }
}
