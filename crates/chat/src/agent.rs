use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use folio_llm::{
    InitProgress, InterruptSlot, Model, ModelSession, ProgressCallback, ProviderStreamHandle,
    SessionFactory, StreamEventPayload, StreamRequest, StreamTarget,
};
use tokio::sync::oneshot;
use snafu::{OptionExt, ensure};

use crate::action::{ActionDescriptor, ActionKind, ContactDraft, ParseOutcome};
use crate::config::{AgentConfig, Suggestion, suggestions};
use crate::confirm::{Decision, PendingAction, confirmation_prompt};
use crate::contact::TurnKind;
use crate::error::{
    ChatError, ChatResult, InputRejectedSnafu, InputRejection, NoPendingModelSwitchSnafu,
    SameModelSnafu, UnknownSuggestionSnafu,
};
use crate::message::{Conversation, Message, StreamTransition};
use crate::page::{FormField, PageHost, Theme};
use crate::prompt::{PromptBuilder, PromptContext, request_messages};
use crate::section::SectionId;
use crate::stream::{EMPTY_REPLY_MESSAGE, ReplyAccumulator, TurnOutcome};

pub const INITIALIZING_MESSAGE: &str = "Initializing AI Assistant...";
pub const THINKING_MESSAGE: &str = "Thinking...";
pub const RESETTING_MESSAGE: &str = "Resetting chat...";
pub const READY_MESSAGE: &str = "Ready!";
pub const NOT_READY_MESSAGE: &str = "I'm still starting up, please wait a moment!";
pub const UNEXPECTED_RESPONSE_MESSAGE: &str =
    "Sorry, I received an unexpected response. Please try again.";
pub const DENIED_MESSAGE: &str = "Okay, I won't do that.";
pub const STOPPED_MESSAGE: &str = "Sorry, that response was stopped before it finished.";
pub const MODEL_SWITCH_PROMPT: &str =
    "Switching models will clear the current conversation and load the new model. Continue?";

const CONTACT_SCROLL_FAILED: &str =
    "Sorry, I couldn't scroll to the contact section to fill the form.";
const CONTACT_SUBMITTED: &str =
    "Okay, I've filled and attempted to submit the contact form for you.";
const CONTACT_SUBMIT_MISSING: &str = "Okay, I've filled the form, but couldn't find the submit button. Please click it manually.";
const CONTACT_FILL_FAILED: &str = "Sorry, I encountered an error while trying to fill the form.";
const CONTACT_DENIED: &str = "Okay, I won't submit the form. I'll clear the subject and message I drafted and scroll you to the contact section so you can make any edits or fill it out yourself.";
const CONTACT_DENIED_CLEAR_FAILED: &str =
    " (Though I encountered an issue clearing the fields).";
const CONTACT_DENIED_SCROLL_FAILED: &str = "Okay, I won't submit the form. I couldn't scroll to the contact section, but you can find it to make edits yourself.";

/// Page state the host reads at the moment a message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnContext {
    pub section: SectionId,
    pub theme: Theme,
}

impl TurnContext {
    pub const fn new(section: SectionId, theme: Theme) -> Self {
        Self { section, theme }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetMode {
    Manual,
    ModelSwitch,
}

/// What happened after the user answered a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub kind: ActionKind,
    pub decision: Decision,
    pub succeeded: bool,
    pub message: String,
}

/// Guards against overlapping session initialization.
///
/// The guard clears the latch on drop, so an abandoned initialization can be retried.
#[derive(Debug, Default)]
struct InitLatch(Arc<AtomicBool>);

struct InitGuard(Arc<AtomicBool>);

impl InitLatch {
    fn try_acquire(&self) -> Option<InitGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InitGuard(Arc::clone(&self.0)))
    }

    fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stops the turn that is streaming right now.
///
/// [`ChatAgent::send`] holds the agent until the reply ends, so a host clones this handle
/// beforehand to abandon a stuck generation, for example before a reset or when the
/// widget closes. The session stays loaded.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<InterruptSlot>);

impl StopHandle {
    /// Returns true when a running turn received the signal.
    pub fn stop(&self) -> bool {
        self.0.fire()
    }

    fn arm(&self) -> oneshot::Receiver<()> {
        self.0.arm()
    }
}

/// Owns the model session and the conversation of the chat widget.
pub struct ChatAgent {
    factory: Arc<dyn SessionFactory>,
    prompt: Arc<dyn PromptBuilder>,
    config: AgentConfig,
    session: Option<Arc<dyn ModelSession>>,
    init_latch: InitLatch,
    stop: StopHandle,
    ready: bool,
    loading_message: Arc<ArcSwap<String>>,
    error: Option<String>,
    conversation: Conversation,
    pending_model_switch: Option<String>,
    epoch: u64,
    next_turn: u64,
}

impl ChatAgent {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        prompt: Arc<dyn PromptBuilder>,
        config: AgentConfig,
    ) -> Self {
        Self {
            factory,
            prompt,
            config,
            session: None,
            init_latch: InitLatch::default(),
            stop: StopHandle::default(),
            ready: false,
            loading_message: Arc::new(ArcSwap::from_pointee(INITIALIZING_MESSAGE.to_string())),
            error: None,
            conversation: Conversation::new(),
            pending_model_switch: None,
            epoch: 0,
            next_turn: 1,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.conversation.pending_action()
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn models(&self) -> &[Model] {
        self.factory.models()
    }

    pub fn pending_model_switch(&self) -> Option<&str> {
        self.pending_model_switch.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_loading(&self) -> bool {
        self.init_latch.is_held() || self.is_generating()
    }

    fn is_generating(&self) -> bool {
        self.conversation.stream_state().active_target().is_some()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Quick prompts, phrased with the configured owner name.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        suggestions(&self.config.owner_name)
    }

    pub fn loading_message(&self) -> Arc<String> {
        self.loading_message.load_full()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn accepts_input(&self) -> bool {
        self.busy_rejection().is_none()
    }

    /// Starts the session on first open. Returns true when an initialization ran.
    pub async fn open(&mut self) -> bool {
        if self.session.is_some() || self.init_latch.is_held() {
            return false;
        }
        self.initialize().await
    }

    async fn initialize(&mut self) -> bool {
        let Some(_latch) = self.init_latch.try_acquire() else {
            tracing::debug!("session initialization already in flight");
            return false;
        };

        self.error = None;
        self.ready = false;
        self.set_loading(INITIALIZING_MESSAGE);

        let loading = Arc::clone(&self.loading_message);
        let progress: ProgressCallback = Arc::new(move |report: InitProgress| {
            tracing::debug!(progress = report.progress, text = %report.text, "model init progress");
            loading.store(Arc::new(report.text));
        });

        let factory = Arc::clone(&self.factory);
        let model_id = self.config.model_id.clone();
        match factory.create(&model_id, progress).await {
            Ok(session) => {
                self.session = Some(session);
                self.ready = true;
                if self.conversation.needs_greeting() {
                    self.conversation.reset(&self.config.greeting);
                }
                self.set_loading(READY_MESSAGE);
                tracing::info!(model_id = %model_id, "chat session ready");
                true
            }
            Err(error) => {
                tracing::error!(
                    model_id = %model_id,
                    error = %error,
                    "failed to initialize model session"
                );
                self.session = None;
                self.ready = false;
                self.error = Some(format!(
                    "Failed to initialize AI Assistant: {error}. Please try refreshing."
                ));
                self.conversation.seed_failure(format!(
                    "Sorry, I couldn't start up correctly. Please try refreshing the page. \
                     Error: {error}"
                ));
                self.set_loading("");
                false
            }
        }
    }

    fn input_rejection(&self, text: &str) -> Option<InputRejection> {
        if text.trim().is_empty() {
            Some(InputRejection::Empty)
        } else {
            self.busy_rejection()
        }
    }

    fn busy_rejection(&self) -> Option<InputRejection> {
        if self.init_latch.is_held() {
            Some(InputRejection::Initializing)
        } else if self.is_generating() {
            Some(InputRejection::Generating)
        } else if !self.conversation.action_state().is_idle() {
            Some(InputRejection::ActionPending)
        } else if self.pending_model_switch.is_some() {
            Some(InputRejection::ModelSwitchPending)
        } else {
            None
        }
    }

    /// Sends one user message and runs the model turn to completion.
    ///
    /// The user message lands in the transcript before the model is called.
    pub async fn send(&mut self, text: &str, context: TurnContext) -> ChatResult<()> {
        if let Some(reason) = self.input_rejection(text) {
            return InputRejectedSnafu {
                stage: "send",
                reason,
            }
            .fail();
        }
        let text = text.trim();

        let Some(session) = self.session.clone() else {
            self.conversation.push(Message::user(text));
            self.conversation.push(Message::assistant(NOT_READY_MESSAGE));
            self.error = Some("AI Assistant is not ready yet.".to_string());
            return Ok(());
        };

        let target = StreamTarget::new(self.epoch, self.next_turn);
        self.next_turn += 1;
        if let Err(rejection) = self
            .conversation
            .apply_stream_transition(StreamTransition::Start(target))
        {
            tracing::warn!(?rejection, "refusing to start a second turn");
            return InputRejectedSnafu {
                stage: "send-start-stream",
                reason: InputRejection::Generating,
            }
            .fail();
        }

        let history = self.conversation.messages().to_vec();
        self.conversation.push(Message::user(text));

        let prompt_context = PromptContext {
            section: context.section,
            theme: context.theme,
            collecting_contact: self.conversation.contact_flow().is_collecting(),
        };
        let system_prompt = self.prompt.system_prompt(&prompt_context);
        let request = StreamRequest::new(
            target,
            request_messages(system_prompt, &history, text, self.config.context_window),
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        self.error = None;
        self.set_loading(THINKING_MESSAGE);

        let stop_rx = self.stop.arm();
        TurnGuard::new(self, target, text)
            .run(session.as_ref(), request, context.theme, stop_rx)
            .await;
        Ok(())
    }

    pub async fn send_suggestion(&mut self, index: usize, context: TurnContext) -> ChatResult<()> {
        let suggestion = self
            .suggestions()
            .into_iter()
            .nth(index)
            .context(UnknownSuggestionSnafu {
                stage: "send-suggestion",
                index,
            })?;
        self.send(&suggestion.trigger, context).await
    }

    fn fail_turn(
        &mut self,
        target: StreamTarget,
        index: Option<usize>,
        user_text: &str,
        message: String,
    ) {
        let content = format!("Sorry, I encountered an error. Please try again. Error: {message}");
        let replaced = index
            .map(|index| self.conversation.set_assistant_content(index, content.clone()))
            .unwrap_or(false);
        if !replaced {
            self.conversation.push(Message::assistant(content));
        }
        self.error = Some(format!("Error generating response: {message}"));
        self.conversation
            .contact_flow_mut()
            .observe_turn(user_text, TurnKind::Failed);

        if let Err(rejection) = self
            .conversation
            .apply_stream_transition(StreamTransition::Fail { target, message })
        {
            tracing::warn!(?rejection, "stream state rejected failure");
        }
    }

    /// Settles a turn that ended without a reply: stopped, or dropped by its caller.
    fn stop_turn(
        &mut self,
        target: StreamTarget,
        index: Option<usize>,
        user_text: &str,
        stage: &'static str,
    ) {
        if let Some(session) = &self.session {
            match session.interrupt() {
                Ok(()) => tracing::info!(stage, "interrupted ongoing generation"),
                Err(error) => {
                    tracing::warn!(stage, error = %error, "failed to interrupt generation")
                }
            }
        }

        let replaced = index
            .map(|index| self.conversation.set_assistant_content(index, STOPPED_MESSAGE))
            .unwrap_or(false);
        if !replaced {
            self.conversation.push(Message::assistant(STOPPED_MESSAGE));
        }
        self.conversation
            .contact_flow_mut()
            .observe_turn(user_text, TurnKind::Failed);

        if let Err(rejection) = self
            .conversation
            .apply_stream_transition(StreamTransition::Cancel(target))
        {
            tracing::warn!(?rejection, "stream state rejected cancellation");
        }
        self.set_loading("");
    }

    fn complete_turn(
        &mut self,
        target: StreamTarget,
        index: usize,
        user_text: &str,
        outcome: TurnOutcome,
    ) {
        let turn_kind = match outcome {
            TurnOutcome::Prose(text) => {
                self.conversation.set_assistant_content(index, text);
                TurnKind::Prose
            }
            TurnOutcome::Empty => {
                self.conversation
                    .set_assistant_content(index, EMPTY_REPLY_MESSAGE);
                TurnKind::Failed
            }
            TurnOutcome::Action { raw, parsed } => self.apply_parsed_action(index, &raw, parsed),
        };

        self.conversation
            .contact_flow_mut()
            .observe_turn(user_text, turn_kind);

        if let Err(rejection) = self
            .conversation
            .apply_stream_transition(StreamTransition::Complete(target))
        {
            tracing::warn!(?rejection, "stream state rejected completion");
        }
    }

    fn apply_parsed_action(&mut self, index: usize, raw: &str, parsed: ParseOutcome) -> TurnKind {
        match parsed {
            ParseOutcome::Clarification(text) => {
                self.conversation.set_assistant_content(index, text);
                TurnKind::Prose
            }
            ParseOutcome::Invalid(reason) => {
                tracing::warn!(?reason, raw = %raw, "model emitted an invalid action");
                self.conversation
                    .set_assistant_content(index, UNEXPECTED_RESPONSE_MESSAGE);
                TurnKind::Failed
            }
            ParseOutcome::Action(action) => {
                let kind = action.kind();
                let prompt = confirmation_prompt(&action, &self.config.owner_name);
                match self
                    .conversation
                    .arm_action(PendingAction::new(action, index), prompt)
                {
                    Ok(()) => {
                        tracing::debug!(?kind, "action awaiting confirmation");
                        TurnKind::Action(kind)
                    }
                    Err(rejection) => {
                        tracing::warn!(?rejection, "second action rejected while one is pending");
                        self.conversation
                            .set_assistant_content(index, UNEXPECTED_RESPONSE_MESSAGE);
                        TurnKind::Failed
                    }
                }
            }
        }
    }

    /// Answers the pending confirmation and runs (or compensates for) its side effect.
    pub async fn resolve_confirmation(
        &mut self,
        decision: Decision,
        page: &mut dyn PageHost,
    ) -> ChatResult<ActionReport> {
        let pending = self
            .conversation
            .take_pending(decision)
            .map_err(|rejection| ChatError::ActionTransition {
                stage: "resolve-confirmation",
                rejection,
            })?;
        let kind = pending.kind();
        tracing::debug!(?kind, ?decision, "resolving pending action");

        let (succeeded, message) = match decision {
            Decision::Confirm => self.execute(pending.action, page).await,
            Decision::Deny => self.compensate(pending.action, page).await,
        };

        self.conversation.push(Message::assistant(message.clone()));
        if let Err(rejection) = self.conversation.finish_action() {
            tracing::warn!(?rejection, "action state rejected finish");
        }

        Ok(ActionReport {
            kind,
            decision,
            succeeded,
            message,
        })
    }

    async fn execute(&self, action: ActionDescriptor, page: &mut dyn PageHost) -> (bool, String) {
        let owner = &self.config.owner_name;
        match action {
            ActionDescriptor::Scroll { section } => {
                if page.scroll_to_section(section) {
                    (true, format!("Okay, scrolling to the {section} section."))
                } else {
                    (false, format!("Sorry, I couldn't find the {section} section."))
                }
            }
            ActionDescriptor::Theme { theme } => {
                page.set_theme(theme);
                (true, format!("Okay, switching to {theme} mode."))
            }
            ActionDescriptor::Link { url, name } => {
                if page.open_link(&url) {
                    (
                        true,
                        format!("Okay, opening {owner}'s {name} profile in a new tab."),
                    )
                } else {
                    (false, format!("Sorry, I couldn't open the link for {name}."))
                }
            }
            ActionDescriptor::ContactForm(draft) => self.submit_contact_form(&draft, page).await,
        }
    }

    async fn submit_contact_form(
        &self,
        draft: &ContactDraft,
        page: &mut dyn PageHost,
    ) -> (bool, String) {
        if !page.scroll_to_section(SectionId::Contact) {
            return (false, CONTACT_SCROLL_FAILED.to_string());
        }
        self.settle().await;

        let values = [
            (FormField::Name, draft.name.as_str()),
            (FormField::Email, draft.email.as_str()),
            (FormField::Subject, draft.subject.as_str()),
            (FormField::Message, draft.message.as_str()),
        ];
        for (field, value) in values {
            match page.set_form_field(field, value) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%field, "contact form field not found"),
                Err(error) => {
                    tracing::error!(error = %error, "failed to fill the contact form");
                    return (false, CONTACT_FILL_FAILED.to_string());
                }
            }
        }

        if page.click_submit() {
            (true, CONTACT_SUBMITTED.to_string())
        } else {
            tracing::warn!("contact submit control not found after filling fields");
            (false, CONTACT_SUBMIT_MISSING.to_string())
        }
    }

    async fn compensate(&self, action: ActionDescriptor, page: &mut dyn PageHost) -> (bool, String) {
        let ActionDescriptor::ContactForm(_) = action else {
            return (true, DENIED_MESSAGE.to_string());
        };

        if !page.scroll_to_section(SectionId::Contact) {
            return (false, CONTACT_DENIED_SCROLL_FAILED.to_string());
        }
        self.settle().await;

        for field in [FormField::Subject, FormField::Message] {
            if let Err(error) = page.set_form_field(field, "") {
                tracing::warn!(error = %error, "failed to clear drafted contact fields");
                return (false, format!("{CONTACT_DENIED}{CONTACT_DENIED_CLEAR_FAILED}"));
            }
        }
        (true, CONTACT_DENIED.to_string())
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    /// Clears the conversation back to the greeting, keeping any live session.
    ///
    /// A reply still streaming is abandoned first through [`StopHandle`].
    pub async fn reset(&mut self) {
        self.reset_with(ResetMode::Manual).await;
    }

    async fn reset_with(&mut self, mode: ResetMode) {
        self.set_loading(RESETTING_MESSAGE);
        self.error = None;
        self.epoch += 1;
        self.conversation.reset(&self.config.greeting);
        self.pending_model_switch = None;

        if mode == ResetMode::ModelSwitch
            && let Some(session) = self.session.take()
        {
            session.unload().await;
        }
        self.ready = self.session.is_some();
        self.set_loading("");
        tracing::info!(?mode, "chat reset");
    }

    /// Tears the session down entirely.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.unload().await;
        }
        self.ready = false;
    }

    /// Stages a model change; nothing happens until it is confirmed.
    pub fn request_model_switch(&mut self, model_id: &str) -> ChatResult<&'static str> {
        let model_id = model_id.trim();
        ensure!(
            model_id != self.config.model_id,
            SameModelSnafu {
                stage: "request-model-switch",
                model_id,
            }
        );
        self.pending_model_switch = Some(model_id.to_string());
        Ok(MODEL_SWITCH_PROMPT)
    }

    /// Applies or discards the staged model change. Returns true once the new model is ready.
    pub async fn resolve_model_switch(&mut self, confirm: bool) -> ChatResult<bool> {
        let model_id = self
            .pending_model_switch
            .take()
            .context(NoPendingModelSwitchSnafu {
                stage: "resolve-model-switch",
            })?;
        if !confirm {
            tracing::debug!(model_id = %model_id, "model switch declined");
            return Ok(false);
        }

        tracing::info!(from = %self.config.model_id, to = %model_id, "switching model");
        self.config.model_id = model_id;
        self.reset_with(ResetMode::ModelSwitch).await;
        Ok(self.initialize().await)
    }

    fn set_loading(&self, text: &str) {
        self.loading_message.store(Arc::new(text.to_string()));
    }
}

/// Owns the agent for one turn and settles the turn if it ends early.
///
/// Dropping the `send` future mid-stream still leaves exactly one assistant reply and
/// unlocks input.
struct TurnGuard<'a> {
    agent: &'a mut ChatAgent,
    target: StreamTarget,
    user_text: String,
    reply: Option<usize>,
    settled: bool,
}

impl<'a> TurnGuard<'a> {
    fn new(agent: &'a mut ChatAgent, target: StreamTarget, user_text: &str) -> Self {
        Self {
            agent,
            target,
            user_text: user_text.to_string(),
            reply: None,
            settled: false,
        }
    }

    async fn run(
        mut self,
        session: &dyn ModelSession,
        request: StreamRequest,
        theme: Theme,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let target = self.target;
        let ProviderStreamHandle { mut stream, worker } = match session.stream_chat(request) {
            Ok(handle) => handle,
            Err(error) => {
                tracing::error!(target = ?target, error = %error, "failed to start generation");
                self.agent
                    .fail_turn(target, None, &self.user_text, error.to_string());
                self.finish();
                return;
            }
        };
        tokio::spawn(worker);

        let index = self.agent.conversation.push(Message::assistant(""));
        self.reply = Some(index);
        let mut accumulator = ReplyAccumulator::new();
        let mut failure = None;
        let mut completed = false;

        loop {
            let event = tokio::select! {
                event = stream.recv() => event,
                Ok(()) = &mut stop_rx => {
                    tracing::debug!(target = ?target, "turn stopped by host");
                    self.agent
                        .stop_turn(target, Some(index), &self.user_text, "stop");
                    self.finish();
                    return;
                }
            };
            let Some(event) = event else {
                break;
            };
            // A session may reuse one channel across turns; every event names its turn.
            if !self
                .agent
                .conversation
                .stream_state()
                .accepts_stream_event(event.target)
            {
                tracing::debug!(target = ?event.target, "dropping stale stream event");
                continue;
            }
            match event.payload {
                StreamEventPayload::Delta(delta) => {
                    let display = accumulator.push(&delta).to_string();
                    self.agent.conversation.set_assistant_content(index, display);
                }
                StreamEventPayload::Done => {
                    completed = true;
                    break;
                }
                StreamEventPayload::Error(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }

        match (completed, failure) {
            (_, Some(message)) => {
                self.agent
                    .fail_turn(target, Some(index), &self.user_text, message)
            }
            (false, None) => self.agent.fail_turn(
                target,
                Some(index),
                &self.user_text,
                "the model stream closed before the reply finished".to_string(),
            ),
            (true, None) => {
                let outcome = accumulator.finish(theme);
                self.agent
                    .complete_turn(target, index, &self.user_text, outcome);
            }
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.settled = true;
        self.agent.set_loading("");
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.agent
                .stop_turn(self.target, self.reply, &self.user_text, "abandoned");
        }
    }
}
