use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::http_client::{self, HttpClientExt, NoBody};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::model::{Model, default_local_models};
use super::provider::{
    BoxFuture, CompletionsFailedSnafu, EmptyMessageSetSnafu, EndpointStatusSnafu,
    HttpClientSnafu, InitProgress, InterruptSlot, MissingModelIdSnafu, ModelSession,
    NothingToInterruptSnafu, ProgressCallback, ProviderConfig, ProviderError, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, Role, SessionFactory,
    SessionUnloadedSnafu, StreamEventMapped, StreamEventPayload, StreamRequest, StreamTarget,
    make_event_stream,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// Opens sessions against an OpenAI-compatible local inference server.
pub struct RigSessionFactory {
    config: ProviderConfig,
    models: Vec<Model>,
}

impl RigSessionFactory {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_models(config, default_local_models())
    }

    pub fn with_models(config: ProviderConfig, models: Vec<Model>) -> Self {
        Self { config, models }
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    /// Fetches the served model list; a reachable endpoint is the readiness signal.
    async fn probe_endpoint(config: &ProviderConfig) -> ProviderResult<Vec<String>> {
        let client = Self::build_client(config)?;
        let request = client
            .get("/models")
            .context(HttpClientSnafu {
                stage: "build-probe-request",
            })?
            .body(NoBody)
            .map_err(|source| ProviderError::BuildHttpRequestBody {
                stage: "build-probe-request-body",
                message: source.to_string(),
            })?;

        let response = client.send(request).await.context(HttpClientSnafu {
            stage: "send-probe-request",
        })?;
        let status = response.status();
        let payload = http_client::text(response).await.context(HttpClientSnafu {
            stage: "read-probe-response",
        })?;

        if !status.is_success() {
            return EndpointStatusSnafu {
                stage: "probe-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        Ok(Self::extract_model_ids(&payload))
    }

    fn extract_model_ids(payload: &str) -> Vec<String> {
        let mut ids = Vec::new();
        let mut cursor = payload;
        let needle = "\"id\":\"";

        while let Some(start) = cursor.find(needle) {
            let tail = &cursor[start + needle.len()..];
            let Some(end) = tail.find('"') else {
                break;
            };

            let candidate = tail[..end].trim();
            if !candidate.is_empty() {
                ids.push(candidate.to_string());
            }
            cursor = &tail[end + 1..];
        }

        ids.sort();
        ids.dedup();
        ids
    }
}

impl SessionFactory for RigSessionFactory {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn models(&self) -> &[Model] {
        &self.models
    }

    fn create<'a>(
        &'a self,
        model_id: &'a str,
        progress: ProgressCallback,
    ) -> BoxFuture<'a, ProviderResult<Arc<dyn ModelSession>>> {
        Box::pin(async move {
            let model_id = model_id.trim();
            ensure!(
                !model_id.is_empty(),
                MissingModelIdSnafu {
                    stage: "create-session",
                }
            );

            progress(InitProgress::new(
                format!("Connecting to {}...", self.config.endpoint),
                0.1,
            ));
            let served = Self::probe_endpoint(&self.config).await?;

            // Single-model servers often report an alias, so a miss is only worth a warning.
            if !served.is_empty() && !served.iter().any(|id| id == model_id) {
                tracing::warn!(
                    model_id = %model_id,
                    served = ?served,
                    "requested model is not listed by the endpoint"
                );
            }

            progress(InitProgress::new(format!("Loading {model_id}..."), 0.6));
            let session = RigSession {
                config: self.config.clone(),
                model_id: model_id.to_string(),
                interrupt: InterruptSlot::default(),
                unloaded: AtomicBool::new(false),
            };

            progress(InitProgress::new("Ready!", 1.0));
            tracing::info!(
                provider_id = %self.config.provider_id,
                model_id = %model_id,
                "model session created"
            );
            Ok(Arc::new(session) as Arc<dyn ModelSession>)
        })
    }
}

pub struct RigSession {
    config: ProviderConfig,
    model_id: String,
    interrupt: InterruptSlot,
    unloaded: AtomicBool,
}

impl RigSession {
    fn to_rig_message(message: &ProviderMessage) -> Option<RigMessage> {
        match message.role {
            Role::System => None,
            Role::User => Some(RigMessage::user(message.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(message.content.clone())),
        }
    }

    /// Rig takes a single preamble, so system-role messages are folded into it.
    fn merged_preamble(request: &StreamRequest) -> Option<String> {
        let parts = request
            .messages
            .iter()
            .filter(|message| {
                matches!(message.role, Role::System) && !message.content.trim().is_empty()
            })
            .map(|message| message.content.clone())
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    async fn open_stream(
        config: &ProviderConfig,
        model_id: &str,
        request: &StreamRequest,
    ) -> ProviderResult<RigStreamingResponse> {
        let client = RigSessionFactory::build_client(config)?;
        let model = client.completion_model(model_id.to_string());

        let mut messages = request
            .messages
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::warn!(
                target = ?request.target,
                model_id = %model_id,
                total_message_count = request.messages.len(),
                "cannot open stream because no user/assistant messages remain after filtering"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-pop-prompt",
                target: request.target,
            }
            .fail();
        };
        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = Self::merged_preamble(request) {
            builder = builder.preamble(preamble);
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn map_stream_item<R>(
        target: StreamTarget,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        let payload = match item {
            StreamedAssistantContent::Text(text) => StreamEventPayload::Delta(text.text),
            StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => return None,
        };

        Some(StreamEventMapped { target, payload })
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        model_id: String,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let target = request.target;
        let mut stream = match Self::open_stream(&config, &model_id, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    model_id = %model_id,
                    error = %error,
                    "failed to open model stream"
                );
                let _ = event_tx.send(StreamEventMapped {
                    target,
                    payload: StreamEventPayload::Error(error.to_string()),
                });
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(target = ?target, "generation interrupted");
                    stream.cancel();
                    return;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(target, item)
                                && event_tx.send(mapped).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(
                                target = ?target,
                                error = %source,
                                "model stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            let _ = event_tx.send(StreamEventMapped {
                                target,
                                payload: StreamEventPayload::Error(error.to_string()),
                            });
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = event_tx.send(StreamEventMapped {
            target,
            payload: StreamEventPayload::Done,
        });
    }
}

impl ModelSession for RigSession {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !self.unloaded.load(Ordering::Acquire),
            SessionUnloadedSnafu {
                stage: "stream-chat",
                model_id: self.model_id.clone(),
            }
        );
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );

        let (event_tx, stream) = make_event_stream(request.target);
        let cancel_rx = self.interrupt.arm();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            self.model_id.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }

    fn interrupt(&self) -> ProviderResult<()> {
        ensure!(
            self.interrupt.fire(),
            NothingToInterruptSnafu {
                stage: "interrupt",
                model_id: self.model_id.clone(),
            }
        );
        Ok(())
    }

    fn unload<'a>(&'a self) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.unloaded.store(true, Ordering::Release);
            self.interrupt.fire();
            tracing::info!(model_id = %self.model_id, "model session unloaded");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids_are_extracted_sorted_and_deduplicated() {
        let payload = r#"{"data":[{"id":"b-model"},{"id":"a-model"},{"id":"b-model"},{"id":""}]}"#;
        assert_eq!(
            RigSessionFactory::extract_model_ids(payload),
            vec!["a-model".to_string(), "b-model".to_string()]
        );
    }

    #[test]
    fn system_messages_fold_into_preamble() {
        let request = StreamRequest::new(
            StreamTarget::new(0, 1),
            vec![
                ProviderMessage::new(Role::System, "rules"),
                ProviderMessage::new(Role::User, "hello"),
                ProviderMessage::new(Role::System, "  "),
            ],
        );
        assert_eq!(
            RigSession::merged_preamble(&request),
            Some("rules".to_string())
        );
        assert!(RigSession::to_rig_message(&request.messages[0]).is_none());
    }

    #[test]
    fn interrupt_without_generation_reports_error() {
        let session = RigSession {
            config: ProviderConfig::new("openai", "http://127.0.0.1:9/v1", ""),
            model_id: "m".to_string(),
            interrupt: InterruptSlot::default(),
            unloaded: AtomicBool::new(false),
        };
        assert!(matches!(
            session.interrupt(),
            Err(ProviderError::NothingToInterrupt { .. })
        ));
    }

    #[tokio::test]
    async fn unloaded_session_refuses_to_stream() {
        let session = RigSession {
            config: ProviderConfig::new("openai", "http://127.0.0.1:9/v1", ""),
            model_id: "m".to_string(),
            interrupt: InterruptSlot::default(),
            unloaded: AtomicBool::new(false),
        };
        session.unload().await;

        let request = StreamRequest::new(
            StreamTarget::new(0, 1),
            vec![ProviderMessage::new(Role::User, "hello")],
        );
        assert!(matches!(
            session.stream_chat(request),
            Err(ProviderError::SessionUnloaded { .. })
        ));
    }
}
