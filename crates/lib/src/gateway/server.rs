//! Gateway HTTP server.

use crate::activity::Activity;
use crate::adapter::{Adapter, TurnOutcome};
use crate::bot::{RelayBot, TurnError};
use crate::config::Config;
use crate::connector::BotConnector;
use crate::engine::HttpEngineClient;
use crate::references::ReferenceStore;
use crate::state::MemoryStorage;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const NOTIFY_ACK_HTML: &str =
    "<html><body><h1>Proactive messages have been sent.</h1></body></html>";

/// Shared state for the gateway (config, turn adapter, conversation references).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub adapter: Arc<Adapter>,
    pub references: Arc<ReferenceStore>,
}

/// Wire the engine client, connector, state storage and bot from config.
/// Fails when no engine url is configured.
pub fn build_state(config: Config) -> Result<GatewayState> {
    let engine_url = config
        .engine
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .context("engine url not configured (set engine.url or TENEO_ENGINE_URL)")?;
    let engine = HttpEngineClient::new(engine_url, &config.engine)
        .context("building engine client")?;
    log::info!("engine client targeting {}", engine.url());

    let connector = BotConnector::new(
        config.connector.app_id.clone(),
        config.connector.app_password.clone(),
        config.connector.token_endpoint.clone(),
    );
    let references = Arc::new(ReferenceStore::new(
        config.references.max_entries,
        config.references.ttl_secs,
    ));
    let bot = RelayBot::new(
        Arc::new(engine),
        references.clone(),
        config.engine.sheet_id.clone(),
        config.messages.greeting.clone(),
    );
    let adapter = Adapter::new(bot, Arc::new(MemoryStorage::new()), Arc::new(connector));
    Ok(GatewayState {
        config: Arc::new(config),
        adapter: Arc::new(adapter),
        references,
    })
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(messages))
        .route("/api/notify", get(notify))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let prune_every = Duration::from_secs(config.references.prune_interval_secs.max(1));
    let state = build_state(config)?;

    let prune_task = {
        let references = state.references.clone();
        let adapter = state.adapter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(prune_every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = references.prune().await;
                if !removed.is_empty() {
                    let released = adapter.forget(&removed).await;
                    log::info!(
                        "pruned {} conversation reference(s), released {} state entr(ies)",
                        removed.len(),
                        released
                    );
                }
            }
        })
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited");
    prune_task.abort();
    served?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// POST /api/messages: one inbound activity, one turn.
async fn messages(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("rejecting undecodable activity: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    match state.adapter.process_activity(activity).await {
        Ok(TurnOutcome::Completed(summary)) => {
            log::debug!(
                "turn completed: {:?}, {} exchange(s)",
                summary.kind,
                summary.exchanges.len()
            );
            StatusCode::OK
        }
        Ok(TurnOutcome::Recovered { error }) => {
            log::debug!("turn recovered after error: {}", error);
            StatusCode::OK
        }
        Err(TurnError::InvalidActivity(field)) => {
            log::debug!("rejecting activity without {}", field);
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            log::error!("turn failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /api/notify: proactive message to every known conversation.
async fn notify(State(state): State<GatewayState>) -> impl IntoResponse {
    let summary = state
        .adapter
        .notify_all(&state.references, &state.config.messages.notification)
        .await;
    log::info!(
        "proactive notification: {} sent, {} failed",
        summary.sent,
        summary.failed
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        NOTIFY_ACK_HTML,
    )
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "conversations": state.references.len().await,
    }))
}
