use crate::action::{ACTION_MARKER, ParseOutcome, parse_action};
use crate::page::Theme;

pub const AGENTIC_RESPONSE_PLACEHOLDER: &str = "Building Agentic Response...";
pub const EMPTY_REPLY_MESSAGE: &str = "Sorry, I couldn't generate a response.";

/// Classification of one completed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Prose(String),
    Empty,
    Action {
        raw: String,
        parsed: ParseOutcome,
    },
}

/// Accumulates streamed fragments and decides what the user may see meanwhile.
///
/// The reply is classified once, as soon as the buffer either holds the full marker or
/// stops being a prefix of it. Until then nothing is displayed, so a partial
/// `[ACTION:` never reaches the transcript.
#[derive(Debug, Clone, Default)]
pub struct ReplyAccumulator {
    buffer: String,
    classified: Option<bool>,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns the text to display for the turn so far.
    pub fn push(&mut self, delta: &str) -> &str {
        self.buffer.push_str(delta);

        if self.classified.is_none()
            && (self.buffer.len() >= ACTION_MARKER.len() || !ACTION_MARKER.starts_with(&self.buffer))
        {
            let is_action = self.buffer.starts_with(ACTION_MARKER);
            tracing::debug!(is_action, "reply classified");
            self.classified = Some(is_action);
        }

        self.display()
    }

    pub fn display(&self) -> &str {
        match self.classified {
            Some(true) => AGENTIC_RESPONSE_PLACEHOLDER,
            Some(false) => &self.buffer,
            None => "",
        }
    }

    pub fn is_action(&self) -> bool {
        self.classified == Some(true)
    }

    pub fn raw(&self) -> &str {
        &self.buffer
    }

    /// Classifies the completed reply, parsing it when it carries the marker.
    pub fn finish(self, current_theme: Theme) -> TurnOutcome {
        if self.buffer.starts_with(ACTION_MARKER) {
            let parsed = parse_action(&self.buffer, current_theme);
            return TurnOutcome::Action {
                raw: self.buffer,
                parsed,
            };
        }

        if self.buffer.trim().is_empty() {
            TurnOutcome::Empty
        } else {
            TurnOutcome::Prose(self.buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDescriptor;
    use crate::section::SectionId;

    fn displays(fragments: &[&str]) -> Vec<String> {
        let mut accumulator = ReplyAccumulator::new();
        fragments
            .iter()
            .map(|fragment| accumulator.push(fragment).to_string())
            .collect()
    }

    #[test]
    fn prose_is_echoed_and_never_replaced() {
        let shown = displays(&["He", "llo there", ", friend"]);
        assert_eq!(shown, vec!["He", "Hello there", "Hello there, friend"]);
        assert!(shown.iter().all(|text| text != AGENTIC_RESPONSE_PLACEHOLDER));
    }

    #[test]
    fn partial_marker_never_leaks() {
        let shown = displays(&["[", "AC", "TION", ":scr", "oll:projects", "]"]);
        assert_eq!(
            shown,
            vec![
                "",
                "",
                "",
                AGENTIC_RESPONSE_PLACEHOLDER,
                AGENTIC_RESPONSE_PLACEHOLDER,
                AGENTIC_RESPONSE_PLACEHOLDER,
            ]
        );
        assert!(shown.iter().all(|text| !text.contains("[ACTION")));
    }

    #[test]
    fn bracketed_prose_is_released_once_it_diverges() {
        let shown = displays(&["[", "Docs](https://x.y)"]);
        assert_eq!(shown, vec!["", "[Docs](https://x.y)"]);
    }

    #[test]
    fn whole_action_in_one_fragment_is_hidden() {
        let shown = displays(&["[ACTION:scroll:projects]"]);
        assert_eq!(shown, vec![AGENTIC_RESPONSE_PLACEHOLDER]);
    }

    #[test]
    fn finish_routes_to_parser_prose_or_empty() {
        let mut accumulator = ReplyAccumulator::new();
        accumulator.push("[ACTION:scroll:projects]");
        assert!(accumulator.is_action());
        assert_eq!(
            accumulator.finish(Theme::Light),
            TurnOutcome::Action {
                raw: "[ACTION:scroll:projects]".to_string(),
                parsed: ParseOutcome::Action(ActionDescriptor::Scroll {
                    section: SectionId::Projects
                }),
            }
        );

        let mut accumulator = ReplyAccumulator::new();
        accumulator.push("He has five years of Rust.");
        assert_eq!(
            accumulator.finish(Theme::Light),
            TurnOutcome::Prose("He has five years of Rust.".to_string())
        );

        assert_eq!(ReplyAccumulator::new().finish(Theme::Light), TurnOutcome::Empty);
    }

    #[test]
    fn short_marker_prefix_at_end_of_stream_is_prose() {
        let mut accumulator = ReplyAccumulator::new();
        accumulator.push("[AC");
        assert_eq!(accumulator.display(), "");
        assert_eq!(
            accumulator.finish(Theme::Light),
            TurnOutcome::Prose("[AC".to_string())
        );
    }
}
