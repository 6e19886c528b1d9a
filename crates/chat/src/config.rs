use std::time::Duration;

use folio_llm::DEFAULT_CHAT_MODEL;

pub const DEFAULT_OWNER_NAME: &str = "Varun";
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u64 = 512;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(800);

/// Runtime knobs of the chat agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub model_id: String,
    pub owner_name: String,
    pub greeting: String,
    /// Messages forwarded per request, counting the new user message.
    pub context_window: usize,
    pub temperature: f64,
    pub max_tokens: u64,
    /// Wait between scrolling to the contact form and touching its fields.
    pub settle_delay: Duration,
}

pub fn default_greeting(owner: &str) -> String {
    format!(
        "Hello! I'm {owner}'s AI assistant. Feel free to ask me anything about their skills, \
         experience, or projects based on the portfolio. How can I help you today?"
    )
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_CHAT_MODEL.to_string(),
            owner_name: DEFAULT_OWNER_NAME.to_string(),
            greeting: default_greeting(DEFAULT_OWNER_NAME),
            context_window: DEFAULT_CONTEXT_WINDOW,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Quick prompt offered above the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    /// Text sent as the user message when the prompt is picked.
    pub trigger: String,
}

impl Suggestion {
    fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            label: text.clone(),
            trigger: text,
        }
    }
}

pub fn suggestions(owner: &str) -> Vec<Suggestion> {
    vec![
        Suggestion::same(format!("Show me {owner}'s GitHub")),
        Suggestion::same("Scroll to Projects"),
        Suggestion::same("Switch to Dark Mode"),
        Suggestion::same(format!("What skills does {owner} have?")),
        Suggestion {
            label: format!("Contact {owner}"),
            trigger: format!("I want to contact {owner}"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_use_the_owner_name() {
        let prompts = suggestions("Ana");
        assert_eq!(prompts.len(), 5);
        assert_eq!(prompts[0].trigger, "Show me Ana's GitHub");
        assert_eq!(prompts[1].trigger, "Scroll to Projects");
        assert_eq!(prompts[4].label, "Contact Ana");
        assert_eq!(prompts[4].trigger, "I want to contact Ana");
    }
}
