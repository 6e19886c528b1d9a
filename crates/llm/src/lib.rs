//! Model session collaborator for the portfolio chat agent.
//!
//! The agent only sees [`SessionFactory`] and [`ModelSession`]; the rig-backed
//! implementation talks to an OpenAI-compatible local inference server.
use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;

pub use model::{DEFAULT_CHAT_MODEL, Model, default_local_models, find_model};
pub use provider::{
    BoxFuture, InitProgress, InterruptSlot, LOCAL_API_KEY, ModelSession, ProgressCallback,
    ProviderConfig, ProviderError, ProviderEventStream, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, Role, SessionFactory, StreamEventMapped,
    StreamEventPayload, StreamRequest, StreamTarget, make_event_stream,
};
pub use rig_adapter::{RIG_OPENAI_PROVIDER_ID, RigSession, RigSessionFactory};

pub fn create_session_factory(
    mut config: ProviderConfig,
    models: Vec<Model>,
) -> Arc<dyn SessionFactory> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }
    let models = if models.is_empty() {
        default_local_models()
    } else {
        models
    };

    Arc::new(RigSessionFactory::with_models(config, models))
}
