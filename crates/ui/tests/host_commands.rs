use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use folio::app::{ChatApp, Command, HELP_TEXT};
use folio::page::MemoryPage;
use folio::settings::SettingsStore;
use folio_chat::agent::NOT_READY_MESSAGE;
use folio_chat::{ChatAgent, SectionId, Theme, default_greeting};
use folio_llm::{
    BoxFuture, Model, ModelSession, ProgressCallback, ProviderConfig, ProviderResult,
    ProviderStreamHandle, SessionFactory, StreamEventMapped, StreamEventPayload, StreamRequest,
    create_session_factory, default_local_models, make_event_stream,
};

/// Builds a host whose agent was never opened, so no model server is contacted.
fn unopened_app(dir: &tempfile::TempDir) -> ChatApp {
    let store = SettingsStore::new(dir.path().join("settings.json"));
    let settings = store.settings();
    let factory = create_session_factory(
        ProviderConfig::new("openai", "http://127.0.0.1:9/v1", ""),
        settings.configured_models(),
    );
    let agent = ChatAgent::new(factory, Arc::new(settings.prompt()), settings.agent_config());
    ChatApp::with_agent(agent, MemoryPage::portfolio(Theme::Dark), store)
}

#[tokio::test]
async fn section_command_moves_the_viewport() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = unopened_app(&dir);

    let notice = app.handle(Command::Section("skills".to_string())).await;
    assert_eq!(notice.as_deref(), Some("Viewing skills"));
    assert_eq!(app.page().current_section(), SectionId::Skills);

    let notice = app.handle(Command::Section("attic".to_string())).await;
    assert_eq!(notice.as_deref(), Some("Unknown section 'attic'"));
}

#[tokio::test]
async fn message_before_startup_is_answered_locally() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = unopened_app(&dir);

    let notice = app.handle(Command::Send("Hello".to_string())).await;

    assert!(notice.is_none());
    let messages = app.agent().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].content, NOT_READY_MESSAGE);
}

#[tokio::test]
async fn listings_and_help_do_not_touch_the_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = unopened_app(&dir);

    let models = app.handle(Command::Model(None)).await.unwrap_or_default();
    assert!(models.lines().any(|line| line.starts_with("* Llama-3.2-3B-Instruct")));

    let suggestions = app.handle(Command::Suggest(None)).await.unwrap_or_default();
    assert!(suggestions.starts_with("1. Show me Varun's GitHub"));

    assert_eq!(app.handle(Command::Help).await.as_deref(), Some(HELP_TEXT));
    assert!(app.agent().messages().is_empty());
}

#[tokio::test]
async fn confirming_with_nothing_pending_is_a_notice() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = unopened_app(&dir);

    let notice = app
        .handle(Command::Confirm(folio_chat::Decision::Confirm))
        .await;

    assert!(notice.is_some());
    assert!(app.agent().messages().is_empty());
}

/// Session whose replies start and then never finish.
struct HangingSession {
    interrupts: Arc<AtomicUsize>,
}

impl ModelSession for HangingSession {
    fn model_id(&self) -> &str {
        "hanging"
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        let target = request.target;
        let (event_tx, stream) = make_event_stream(target);
        let worker = Box::pin(async move {
            let partial = StreamEventMapped {
                target,
                payload: StreamEventPayload::Delta("Partial ans".to_string()),
            };
            if event_tx.send(partial).is_ok() {
                std::future::pending::<()>().await;
            }
        });
        Ok(ProviderStreamHandle { stream, worker })
    }

    fn interrupt(&self) -> ProviderResult<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unload<'a>(&'a self) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

struct HangingFactory {
    models: Vec<Model>,
    interrupts: Arc<AtomicUsize>,
}

impl SessionFactory for HangingFactory {
    fn provider_id(&self) -> &str {
        "hanging"
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    fn create<'a>(
        &'a self,
        _model_id: &'a str,
        _progress: ProgressCallback,
    ) -> BoxFuture<'a, ProviderResult<Arc<dyn ModelSession>>> {
        Box::pin(async move {
            let session: Arc<dyn ModelSession> = Arc::new(HangingSession {
                interrupts: Arc::clone(&self.interrupts),
            });
            Ok(session)
        })
    }
}

#[tokio::test]
async fn reset_typed_during_a_stuck_reply_recovers_the_chat() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.json"));
    let settings = store.settings();
    let interrupts = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(HangingFactory {
        models: default_local_models(),
        interrupts: Arc::clone(&interrupts),
    });
    let agent = ChatAgent::new(factory, Arc::new(settings.prompt()), settings.agent_config());
    let mut app = ChatApp::with_agent(agent, MemoryPage::portfolio(Theme::Dark), store);

    let input = tokio::io::BufReader::new(&b"Tell me about him\n/reset\n/quit\n"[..]);
    app.run_with(input).await.unwrap();

    assert_eq!(interrupts.load(Ordering::SeqCst), 1);
    let messages = app.agent().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, default_greeting("Varun"));
    assert!(app.agent().accepts_input());
}
