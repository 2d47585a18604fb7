mod config;
mod errors;
mod interview;
mod llm_client;
mod relay;
mod retrieval;
mod routes;
mod speech;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::retrieval::DisabledRetriever;
use crate::routes::build_router;
use crate::speech::proxy::VendorConnector;
use crate::speech::token::SpeechClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting interview API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize chat-completion client
    let llm = LlmClient::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
    )?;
    info!(
        "LLM client initialized (chat: {}, extraction: {})",
        config.chat_model, config.extraction_model
    );

    // Initialize speech vendor clients
    let speech = SpeechClient::new(config.speech.sts_url.clone())?;
    let connector = VendorConnector::new(speech.clone(), config.speech.clone());
    if config.speech.app_id.is_none() || config.speech.access_key.is_none() {
        info!("Speech credentials not set; audio sessions will be refused");
    }
    info!("Audio config policy: {:?}", config.audio_config_policy);

    // Build app state
    let state = AppState {
        llm: Arc::new(llm),
        retriever: Arc::new(DisabledRetriever),
        connector: Arc::new(connector),
        speech,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
