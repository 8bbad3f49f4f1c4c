//! Gateway HTTP server: the authenticated bot endpoint plus local chat and
//! embeddings routes.

use crate::activity::Activity;
use crate::auth::{fetch_key_set, AuthProvider, TokenVerifier};
use crate::config::{self, Config};
use crate::dispatch::ReplyDispatcher;
use crate::llm::{Embedder, OllamaClient};
use crate::pipeline::Pipeline;
use crate::prompt::PromptTemplate;
use crate::retrieval::HttpVectorIndex;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the gateway (verifier, pipeline, model handles).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub pipeline: Arc<Pipeline>,
    pub embedder: Arc<dyn Embedder>,
}

/// Build the router over a prepared state. Separate from run_gateway so tests
/// can mount capability doubles.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/messages", post(messages))
        .route("/chat", post(chat))
        .route("/embeddings", post(embeddings))
        .with_state(state)
}

/// GET / returns a simple health JSON (for probes).
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// POST /api/messages — the bot endpoint. The response carries only the
/// authorization outcome; the answer travels out-of-band through the reply
/// dispatcher, so the pipeline runs in its own task and keeps running even if
/// the inbound connection goes away.
async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(activity): Json<Activity>,
) -> StatusCode {
    let Some(token) = bearer_token(&headers) else {
        log::debug!("messages: missing bearer token");
        return StatusCode::UNAUTHORIZED;
    };
    if !state.verifier.verify(token) {
        log::debug!("messages: token rejected");
        return StatusCode::UNAUTHORIZED;
    }
    let request_id = uuid::Uuid::new_v4();
    log::info!(
        "messages: accepted activity {} as request {}",
        activity.id,
        request_id
    );
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.handle(activity).await {
            log::warn!("request {}: {}", request_id, e);
        }
    });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// POST /chat — synchronous grounded chat for local use. Unlike the bot
/// endpoint, the answer is returned in the response body.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, StatusCode> {
    let result = match req.max_tokens {
        Some(n) => state.pipeline.answer_with(&req.question, n).await,
        None => state.pipeline.answer(&req.question).await,
    };
    match result {
        Ok(answer) => Ok(Json(ChatResponse { answer })),
        Err(e) => {
            log::warn!("chat: {}", e);
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingsRequest {
    pub input: Vec<String>,
}

/// POST /embeddings — embed a batch of texts with the configured model.
async fn embeddings(
    State(state): State<AppState>,
    Json(req): Json<EmbeddingsRequest>,
) -> Result<Json<Vec<Vec<f32>>>, StatusCode> {
    let mut out = Vec::with_capacity(req.input.len());
    for text in &req.input {
        match state.embedder.embed(text).await {
            Ok(v) => out.push(v),
            Err(e) => {
                log::warn!("embeddings: {}", e);
                return Err(StatusCode::BAD_GATEWAY);
            }
        }
    }
    Ok(Json(out))
}

/// Run the gateway: resolve credentials, fetch the signing key set (startup
/// fails when it cannot be fetched), wire the pipeline, and serve until
/// shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    let client_id = config::resolve_client_id(&config)
        .context("bot client id not configured (set bot.clientId or BOT_CLIENT_ID)")?;
    let client_secret = config::resolve_client_secret(&config)
        .context("bot client secret not configured (set bot.clientSecret or BOT_CLIENT_SECRET)")?;
    let jwks_url = config::resolve_jwks_url(&config)
        .context("signing key set url not configured (set bot.jwksUrl or BOT_JWKS_URL)")?;
    let token_url = config
        .bot
        .token_url
        .clone()
        .context("identity endpoint not configured (set bot.tokenUrl)")?;

    let http = reqwest::Client::new();
    let key_set = fetch_key_set(&http, &jwks_url).await?;
    let verifier = Arc::new(TokenVerifier::new(
        key_set,
        client_id.clone(),
        config.bot.issuer.clone(),
    ));

    let ollama = Arc::new(OllamaClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.embed_model.clone(),
    ));
    let index = Arc::new(HttpVectorIndex::new(config.retrieval.index_url.clone()));
    let auth = AuthProvider::new(token_url, client_id, client_secret, config.bot.scope.clone());
    let pipeline = Arc::new(Pipeline::new(
        ollama.clone(),
        index,
        ollama.clone(),
        PromptTemplate::new(config.prompt.template.clone()),
        auth,
        ReplyDispatcher::new(),
        config.llm.max_concurrency,
        config.llm.max_tokens,
    ));

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = AppState {
        config: Arc::new(config),
        verifier,
        pipeline,
        embedder: ollama,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}
