use std::sync::Arc;

use folio_chat::{
    ActionReport, ChatAgent, ChatError, Decision, InputRejection, Message, PageHost, SectionId,
    TurnContext,
};
use folio_llm::{Role, SessionFactory, create_session_factory};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::page::MemoryPage;
use crate::settings::SettingsStore;

pub const BUSY_NOTICE: &str =
    "Still answering the previous message. Use /reset to abandon it.";

pub const HELP_TEXT: &str = "Commands: /reset, /model [id], /yes, /no, /section <id>, \
/suggest [n], /help, /quit. Anything else is sent to the assistant.";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Reset,
    Model(Option<String>),
    Confirm(Decision),
    Section(String),
    Suggest(Option<usize>),
    Help,
    Quit,
}

impl Command {
    /// True for commands that run a model turn.
    pub fn starts_turn(&self) -> bool {
        matches!(self, Self::Send(_) | Self::Suggest(Some(_)))
    }
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, Some(argument.trim()).filter(|arg| !arg.is_empty())),
        None => (command, None),
    };

    match name {
        "reset" => Command::Reset,
        "model" => Command::Model(argument.map(str::to_string)),
        "yes" | "y" => Command::Confirm(Decision::Confirm),
        "no" | "n" => Command::Confirm(Decision::Deny),
        "section" => Command::Section(argument.unwrap_or_default().to_string()),
        // Suggestions are numbered from 1 on screen.
        "suggest" => Command::Suggest(
            argument
                .and_then(|arg| arg.parse::<usize>().ok())
                .map(|number| number.saturating_sub(1)),
        ),
        "quit" | "exit" => Command::Quit,
        _ => Command::Help,
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Terminal host: owns the agent, the page it acts on, and the settings store.
pub struct ChatApp {
    agent: ChatAgent,
    page: MemoryPage,
    store: SettingsStore,
    rendered: usize,
}

impl ChatApp {
    pub fn new(store: SettingsStore) -> Self {
        let settings = store.settings();
        let factory: Arc<dyn SessionFactory> = create_session_factory(
            settings.to_provider_config(),
            settings.configured_models(),
        );
        let agent = ChatAgent::new(factory, Arc::new(settings.prompt()), settings.agent_config());
        Self::with_agent(agent, MemoryPage::portfolio(settings.initial_theme), store)
    }

    pub fn with_agent(agent: ChatAgent, page: MemoryPage, store: SettingsStore) -> Self {
        Self {
            agent,
            page,
            store,
            rendered: 0,
        }
    }

    pub fn agent(&self) -> &ChatAgent {
        &self.agent
    }

    pub fn page(&self) -> &MemoryPage {
        &self.page
    }

    fn turn_context(&self) -> TurnContext {
        TurnContext::new(self.page.current_section(), self.page.theme())
    }

    pub async fn run(&mut self) -> Result<(), AppError> {
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Runs the command loop over `input` until `/quit` or end of input.
    pub async fn run_with<R>(&mut self, input: R) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.agent.open().await;
        self.print_status();
        self.print_new_messages();
        println!("{HELP_TEXT}");

        let mut lines = input.lines();
        let mut queued = None;
        loop {
            let command = match queued.take() {
                Some(command) => command,
                None => {
                    let Some(line) = lines.next_line().await.context(ReadInputSnafu {
                        stage: "read-command-line",
                    })?
                    else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    parse_command(&line)
                }
            };
            if command == Command::Quit {
                break;
            }

            let notice = if command.starts_turn() {
                let (notice, next) = self.handle_streaming(command, &mut lines).await?;
                queued = next;
                notice
            } else {
                self.handle(command).await
            };
            self.print_new_messages();
            if let Some(notice) = notice {
                println!("* {notice}");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Runs a model turn while still reading input.
    ///
    /// `/reset` or `/quit` typed mid-reply stops the turn and is returned to run next;
    /// anything else is refused until the reply ends.
    async fn handle_streaming<R>(
        &mut self,
        command: Command,
        lines: &mut Lines<R>,
    ) -> Result<(Option<String>, Option<Command>), AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let stop = self.agent.stop_handle();
        let mut queued = None;
        let turn = self.handle(command);
        tokio::pin!(turn);

        let notice = loop {
            tokio::select! {
                biased;
                notice = &mut turn => break notice,
                line = lines.next_line(), if queued.is_none() => {
                    let line = line.context(ReadInputSnafu {
                        stage: "read-line-during-reply",
                    })?;
                    let command = match line {
                        Some(line) if line.trim().is_empty() => continue,
                        Some(line) => parse_command(&line),
                        None => Command::Quit,
                    };
                    if matches!(command, Command::Reset | Command::Quit) {
                        tracing::debug!(?command, "stopping the running reply");
                        stop.stop();
                        queued = Some(command);
                    } else {
                        println!("* {BUSY_NOTICE}");
                    }
                }
            }
        };
        Ok((notice, queued))
    }

    pub async fn shutdown(&mut self) {
        self.agent.shutdown().await;
    }

    /// Applies one command. Returns a host notice that is not part of the transcript.
    pub async fn handle(&mut self, command: Command) -> Option<String> {
        match command {
            Command::Send(text) => {
                let context = self.turn_context();
                self.agent.send(&text, context).await.err().map(describe_rejection)
            }
            Command::Suggest(Some(index)) => {
                let context = self.turn_context();
                self.agent
                    .send_suggestion(index, context)
                    .await
                    .err()
                    .map(describe_rejection)
            }
            Command::Suggest(None) => Some(
                self.agent
                    .suggestions()
                    .iter()
                    .enumerate()
                    .map(|(index, suggestion)| format!("{}. {}", index + 1, suggestion.label))
                    .collect::<Vec<_>>()
                    .join("  "),
            ),
            Command::Reset => {
                self.agent.reset().await;
                self.rendered = 0;
                if self.agent.is_ready() {
                    None
                } else {
                    self.agent.open().await;
                    self.agent.error().map(str::to_string)
                }
            }
            Command::Model(None) => Some(self.describe_models()),
            Command::Model(Some(model_id)) => match self.agent.request_model_switch(&model_id) {
                Ok(prompt) => Some(format!("{prompt} (/yes or /no)")),
                Err(error) => Some(describe_rejection(error)),
            },
            Command::Confirm(decision) => self.confirm(decision).await,
            Command::Section(raw) => match SectionId::parse(&raw) {
                Some(section) => {
                    self.page.scroll_to_section(section);
                    Some(format!("Viewing {}", self.page.current_section()))
                }
                None => Some(format!("Unknown section '{raw}'")),
            },
            Command::Help | Command::Quit => Some(HELP_TEXT.to_string()),
        }
    }

    async fn confirm(&mut self, decision: Decision) -> Option<String> {
        if let Some(model_id) = self.agent.pending_model_switch().map(str::to_string) {
            let confirmed = decision == Decision::Confirm;
            if confirmed {
                self.rendered = 0;
            }
            return match self.agent.resolve_model_switch(confirmed).await {
                Ok(true) => {
                    if let Err(error) = self.store.set_active_model(&model_id) {
                        tracing::warn!(error = %error, "failed to persist active model");
                    }
                    Some(format!("Now using {model_id}"))
                }
                Ok(false) if confirmed => self.agent.error().map(str::to_string),
                Ok(false) => Some("Model switch cancelled".to_string()),
                Err(error) => Some(describe_rejection(error)),
            };
        }

        match self.agent.resolve_confirmation(decision, &mut self.page).await {
            Ok(ActionReport { kind, succeeded, .. }) => {
                tracing::debug!(?kind, succeeded, "action resolved");
                None
            }
            Err(error) => Some(describe_rejection(error)),
        }
    }

    fn describe_models(&self) -> String {
        self.agent
            .models()
            .iter()
            .map(|model| {
                let marker = if model.id == self.agent.model_id() { "*" } else { " " };
                match &model.description {
                    Some(description) => format!("{marker} {} ({description})", model.id),
                    None => format!("{marker} {}", model.id),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn print_status(&self) {
        let status = self.agent.loading_message();
        if !status.is_empty() {
            println!("* {status}");
        }
    }

    fn print_new_messages(&mut self) {
        let messages = self.agent.messages();
        if self.rendered > messages.len() {
            self.rendered = 0;
        }
        for message in &messages[self.rendered..] {
            println!("{}", render_message(message));
        }
        self.rendered = messages.len();
    }
}

pub fn render_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    if message.is_confirmation {
        format!("{speaker}> {}\n  [/yes or /no]", message.content)
    } else {
        format!("{speaker}> {}", message.content)
    }
}

fn describe_rejection(error: ChatError) -> String {
    match &error {
        ChatError::InputRejected { reason, .. } => {
            tracing::debug!(?reason, "input rejected");
            match reason {
                InputRejection::Empty => "Type a message first.".to_string(),
                InputRejection::Initializing => {
                    "Still loading the model, please wait.".to_string()
                }
                InputRejection::Generating => {
                    "Still answering the previous message.".to_string()
                }
                InputRejection::ActionPending => {
                    "Answer the pending question with /yes or /no first.".to_string()
                }
                InputRejection::ModelSwitchPending => {
                    "Confirm or cancel the model switch with /yes or /no first.".to_string()
                }
            }
        }
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            parse_command("  Scroll to Projects "),
            Command::Send("Scroll to Projects".to_string())
        );
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_command("/reset"), Command::Reset);
        assert_eq!(parse_command("/model"), Command::Model(None));
        assert_eq!(
            parse_command("/model  Phi-3.5-mini "),
            Command::Model(Some("Phi-3.5-mini".to_string()))
        );
        assert_eq!(parse_command("/y"), Command::Confirm(Decision::Confirm));
        assert_eq!(parse_command("/no"), Command::Confirm(Decision::Deny));
        assert_eq!(parse_command("/suggest 2"), Command::Suggest(Some(1)));
        assert_eq!(parse_command("/suggest"), Command::Suggest(None));
        assert_eq!(
            parse_command("/section contact"),
            Command::Section("contact".to_string())
        );
        assert_eq!(parse_command("/bogus"), Command::Help);
    }

    #[test]
    fn only_messages_and_picked_suggestions_start_turns() {
        assert!(parse_command("hello").starts_turn());
        assert!(parse_command("/suggest 1").starts_turn());
        assert!(!parse_command("/suggest").starts_turn());
        assert!(!parse_command("/reset").starts_turn());
    }

    #[test]
    fn confirmation_messages_show_controls() {
        let mut message = Message::assistant("Do you want to switch to dark mode?");
        message.is_confirmation = true;
        assert!(render_message(&message).ends_with("[/yes or /no]"));
        assert_eq!(render_message(&Message::user("hi")), "you> hi");
    }
}
