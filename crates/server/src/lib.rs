//! HTTP/WebSocket gateway: one WebSocket route carrying the interview
//! session protocol, one REST route for completion polling, and the wiring
//! that assembles stores and adapters from configuration.

mod http;
mod ws;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use viva_adapters::{
    EmbeddingSimilarity, HttpLanguageModel, HttpSpeechToText, HttpTextToSpeech, MockLanguageModel,
    MockSimilarity, MockSpeechToText, MockTextToSpeech,
};
use viva_config::AppConfig;
use viva_core::InterviewStore;
use viva_engine::Ports;
use viva_store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub ports: Ports,
    /// Interviews with a live session.  At most one socket may drive an
    /// interview at a time.
    active_sessions: Arc<Mutex<HashSet<Uuid>>>,
}

impl AppState {
    pub fn new(config: AppConfig, ports: Ports) -> Self {
        Self {
            config,
            ports,
            active_sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim exclusive session ownership of an interview.
    pub(crate) async fn claim_session(&self, interview_id: Uuid) -> bool {
        self.active_sessions.lock().await.insert(interview_id)
    }

    pub(crate) async fn release_session(&self, interview_id: Uuid) {
        self.active_sessions.lock().await.remove(&interview_id);
    }
}

/// Assemble the adapter set described by the configuration.
pub async fn build_ports(config: &AppConfig) -> Result<Ports> {
    let store: Arc<dyn InterviewStore> = if config.store.journal_path.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            MemoryStore::open(&config.store.journal_path)
                .await
                .with_context(|| format!("opening journal {}", config.store.journal_path))?,
        )
    };

    if config.adapters.use_mock_adapters {
        warn!("mock adapters selected; no external service will be called");
        return Ok(Ports {
            store,
            llm: Arc::new(MockLanguageModel::new()),
            stt: Arc::new(MockSpeechToText::new()),
            tts: Arc::new(MockTextToSpeech::new()),
            similarity: Arc::new(MockSimilarity::new()),
        });
    }

    let api_key = std::env::var(&config.adapters.llm_api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        warn!(
            env = %config.adapters.llm_api_key_env,
            "LLM API key not set; language model calls will be unauthenticated"
        );
    }

    Ok(Ports {
        store,
        llm: Arc::new(HttpLanguageModel::new(
            &config.adapters.llm_base_url,
            &config.adapters.llm_model,
            api_key,
        )),
        stt: Arc::new(HttpSpeechToText::new(&config.adapters.stt_base_url)),
        tts: Arc::new(HttpTextToSpeech::new(&config.adapters.tts_base_url)),
        similarity: Arc::new(EmbeddingSimilarity::new(
            &config.adapters.embeddings_base_url,
            &config.adapters.embeddings_model,
        )),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/interviews/{id}/summary", get(http::summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until SIGINT/SIGTERM.  In-flight sessions finish their
/// current turn before the process exits.
pub async fn serve(config: AppConfig) -> Result<()> {
    let ports = build_ports(&config).await?;
    serve_with_ports(config, ports).await
}

pub async fn serve_with_ports(config: AppConfig, ports: Ports) -> Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::new(config, ports);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(%bind_addr, "interview gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_state() -> AppState {
        let mut config = AppConfig::default();
        config.adapters.use_mock_adapters = true;
        config.store.journal_path = String::new();
        let ports = build_ports(&config).await.unwrap();
        AppState::new(config, ports)
    }

    #[tokio::test]
    async fn one_live_session_per_interview() {
        let state = mock_state().await;
        let interview_id = Uuid::new_v4();

        assert!(state.claim_session(interview_id).await);
        assert!(!state.claim_session(interview_id).await, "second claim must be refused");

        state.release_session(interview_id).await;
        assert!(state.claim_session(interview_id).await, "slot frees on disconnect");
    }

    #[tokio::test]
    async fn mock_config_builds_without_a_journal() {
        let mut config = AppConfig::default();
        config.adapters.use_mock_adapters = true;
        config.store.journal_path = String::new();
        assert!(build_ports(&config).await.is_ok());
    }
}
