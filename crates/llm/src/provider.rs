use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use super::model::Model;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub endpoint: String,
    pub api_key: String,
}

/// Key sent to local servers that ignore authentication but still expect a bearer token.
pub const LOCAL_API_KEY: &str = "local";

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into().trim().to_string();
        Self {
            provider_id: provider_id.into().trim().to_string(),
            endpoint: endpoint.into().trim().trim_end_matches('/').to_string(),
            api_key: if api_key.is_empty() {
                LOCAL_API_KEY.to_string()
            } else {
                api_key
            },
        }
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Routing key for one generation.
///
/// `epoch` changes on every chat reset and `turn` on every send, so events from an
/// abandoned generation can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub epoch: u64,
    pub turn: u64,
}

impl StreamTarget {
    pub const fn new(epoch: u64, turn: u64) -> Self {
        Self { epoch, turn }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub target: StreamTarget,
    pub messages: Vec<ProviderMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl StreamRequest {
    pub fn new(target: StreamTarget, messages: Vec<ProviderMessage>) -> Self {
        Self {
            target,
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    Delta(String),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEventMapped {
    pub target: StreamTarget,
    pub payload: StreamEventPayload,
}

/// Status report emitted while a session is being created.
#[derive(Debug, Clone, PartialEq)]
pub struct InitProgress {
    pub text: String,
    pub progress: f32,
}

impl InitProgress {
    pub fn new(text: impl Into<String>, progress: f32) -> Self {
        Self {
            text: text.into(),
            progress: progress.clamp(0.0, 1.0),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(InitProgress) + Send + Sync>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("no model id was given on `{stage}`"))]
    MissingModelId { stage: &'static str },
    #[snafu(display("stream request for {target:?} has no messages"))]
    EmptyMessageSet {
        stage: &'static str,
        target: StreamTarget,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("failed to finalize HTTP request body: {message}"))]
    BuildHttpRequestBody {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("inference endpoint returned status {status}: {body}"))]
    EndpointStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("no generation is running on model '{model_id}'"))]
    NothingToInterrupt {
        stage: &'static str,
        model_id: String,
    },
    #[snafu(display("session for model '{model_id}' was unloaded"))]
    SessionUnloaded {
        stage: &'static str,
        model_id: String,
    },
}

pub struct ProviderEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEventMapped>,
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    pub fn new(target: StreamTarget, events: mpsc::UnboundedReceiver<StreamEventMapped>) -> Self {
        Self { target, events }
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    /// Returns `None` once the worker is gone, including after an interrupt.
    pub async fn recv(&mut self) -> Option<StreamEventMapped> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEventMapped> {
        self.events.try_recv().ok()
    }
}

/// Cancellation slot for the generation currently running on a session.
///
/// Arming replaces any previous generation's signal; firing consumes it.
#[derive(Debug, Default)]
pub struct InterruptSlot {
    active: Mutex<Option<oneshot::Sender<()>>>,
}

impl InterruptSlot {
    pub fn arm(&self) -> oneshot::Receiver<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        if let Ok(mut active) = self.active.lock() {
            *active = Some(cancel_tx);
        }
        cancel_rx
    }

    /// Returns true when a live generation received the signal.
    pub fn fire(&self) -> bool {
        self.active
            .lock()
            .ok()
            .and_then(|mut active| active.take())
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

/// A live handle to a running local model.
pub trait ModelSession: Send + Sync {
    fn model_id(&self) -> &str;
    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle>;
    /// Best-effort stop of the running generation.
    fn interrupt(&self) -> ProviderResult<()>;
    fn unload<'a>(&'a self) -> BoxFuture<'a, ()>;
}

/// Creates model sessions, reporting progress while the model loads.
pub trait SessionFactory: Send + Sync {
    fn provider_id(&self) -> &str;
    fn models(&self) -> &[Model];
    fn create<'a>(
        &'a self,
        model_id: &'a str,
        progress: ProgressCallback,
    ) -> BoxFuture<'a, ProviderResult<Arc<dyn ModelSession>>>;
}

pub fn make_event_stream(
    target: StreamTarget,
) -> (mpsc::UnboundedSender<StreamEventMapped>, ProviderEventStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (event_tx, ProviderEventStream::new(target, event_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_falls_back_to_local_key() {
        let config = ProviderConfig::new(" openai ", "http://127.0.0.1:8080/v1/", "  ");
        assert_eq!(config.provider_id, "openai");
        assert_eq!(config.endpoint, "http://127.0.0.1:8080/v1");
        assert_eq!(config.api_key, LOCAL_API_KEY);
    }

    #[test]
    fn interrupt_slot_fires_once_per_arm() {
        let slot = InterruptSlot::default();
        assert!(!slot.fire());

        let mut cancel_rx = slot.arm();
        assert!(slot.fire());
        assert!(cancel_rx.try_recv().is_ok());
        assert!(!slot.fire());
    }

    #[test]
    fn rearming_drops_the_previous_signal() {
        let slot = InterruptSlot::default();
        let mut first = slot.arm();
        let mut second = slot.arm();

        assert!(slot.fire());
        assert!(first.try_recv().is_err());
        assert!(second.try_recv().is_ok());
    }

    #[tokio::test]
    async fn event_stream_ends_when_sender_drops() {
        let target = StreamTarget::new(1, 2);
        let (event_tx, mut stream) = make_event_stream(target);
        event_tx
            .send(StreamEventMapped {
                target,
                payload: StreamEventPayload::Delta("hi".to_string()),
            })
            .ok();
        drop(event_tx);

        assert_eq!(stream.target(), target);
        assert_eq!(
            stream.recv().await.map(|event| event.payload),
            Some(StreamEventPayload::Delta("hi".to_string()))
        );
        assert_eq!(stream.recv().await, None);
    }
}
