use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::ChatProvider;
use crate::retrieval::Retriever;
use crate::speech::proxy::UpstreamConnector;
use crate::speech::token::SpeechClient;

/// Shared application state injected into all route handlers via Axum extractors.
/// Every outbound collaborator sits behind a trait object so tests can swap it.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn ChatProvider>,
    /// Question-bank search. `DisabledRetriever` unless a vector store is wired in.
    pub retriever: Arc<dyn Retriever>,
    pub connector: Arc<dyn UpstreamConnector>,
    pub speech: SpeechClient,
    pub config: Config,
}
