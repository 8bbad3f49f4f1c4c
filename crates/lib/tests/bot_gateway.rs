//! Integration tests: run the gateway router with capability doubles and a
//! mock conversation service, then drive the bot endpoint end to end.
//! Does not require Ollama or a vector index.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lib::activity::ReplyActivity;
use lib::auth::{AuthProvider, TokenVerifier};
use lib::config::Config;
use lib::dispatch::ReplyDispatcher;
use lib::gateway::{router, AppState};
use lib::llm::{CompletionBackend, Embedder, LlmError};
use lib::pipeline::Pipeline;
use lib::prompt::PromptTemplate;
use lib::retrieval::{IndexError, RetrievedContext, VectorIndex};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &str = "channel-signing-secret";
const AUDIENCE: &str = "bot-client-id";

fn key_set() -> JwkSet {
    let k = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(SECRET);
    serde_json::from_value(json!({
        "keys": [{ "kty": "oct", "kid": "test-key", "alg": "HS256", "k": k }]
    }))
    .expect("build jwk set")
}

fn valid_token() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as i64;
    let header = Header {
        alg: Algorithm::HS256,
        kid: Some("test-key".to_string()),
        ..Header::default()
    };
    let claims = json!({ "aud": AUDIENCE, "exp": now + 600, "iat": now });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET.as_bytes())).expect("encode jwt")
}

#[derive(Default)]
struct RecordingEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.25, 0.5])
    }
}

struct FixedIndex(String);

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn nearest_one(&self, _vector: &[f32]) -> Result<RetrievedContext, IndexError> {
        Ok(RetrievedContext {
            text: self.0.clone(),
        })
    }
}

struct EmptyIndex;

#[async_trait]
impl VectorIndex for EmptyIndex {
    async fn nearest_one(&self, _vector: &[f32]) -> Result<RetrievedContext, IndexError> {
        Err(IndexError::NotFound)
    }
}

#[derive(Default)]
struct RecordingCompletion {
    calls: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl CompletionBackend for RecordingCompletion {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((prompt.to_string(), max_tokens));
        Ok("Carrots and onions.".to_string())
    }
}

#[derive(Clone, Default)]
struct Captured {
    replies: Arc<Mutex<Vec<(String, ReplyActivity)>>>,
}

async fn capture_reply(
    State(captured): State<Captured>,
    Path((conversation_id, activity_id)): Path<(String, String)>,
    Json(reply): Json<ReplyActivity>,
) -> Json<serde_json::Value> {
    captured.replies.lock().expect("replies lock").push((
        format!("conversations/{}/activities/{}", conversation_id, activity_id),
        reply,
    ));
    Json(json!({ "id": "reply-1" }))
}

/// Mock conversation service: captures POSTed reply activities.
async fn spawn_conversation_service() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route(
            "/v3/conversations/:conversation_id/activities/:activity_id",
            post(capture_reply),
        )
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind conversation service");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), captured)
}

/// Mock identity endpoint for the client-credentials grant.
async fn spawn_token_endpoint() -> String {
    let app = Router::new().route(
        "/token",
        post(|| async {
            Json(json!({ "access_token": "outbound-token", "expires_in": 3600 }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind token endpoint");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/token", addr)
}

fn test_state(
    index: Arc<dyn VectorIndex>,
    completion: Arc<RecordingCompletion>,
    embedder: Arc<RecordingEmbedder>,
    token_url: &str,
) -> AppState {
    let template =
        PromptTemplate::new("Answer from context.\nContext: {context}\nQuestion: {question}");
    let pipeline = Pipeline::new(
        embedder.clone(),
        index,
        completion,
        template,
        AuthProvider::new(token_url, AUDIENCE, "secret", ""),
        ReplyDispatcher::new(),
        1,
        2000,
    );
    AppState {
        config: Arc::new(Config::default()),
        verifier: Arc::new(TokenVerifier::new(key_set(), AUDIENCE, None)),
        pipeline: Arc::new(pipeline),
        embedder,
    }
}

async fn spawn_gateway(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway");
    let addr = listener.local_addr().expect("local_addr");
    let app = router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn soup_activity(service_url: &str) -> serde_json::Value {
    json!({
        "type": "message",
        "id": "42",
        "serviceUrl": service_url,
        "from": { "id": "A" },
        "recipient": { "id": "B" },
        "conversation": { "id": "C" },
        "text": "What ingredients for soup?"
    })
}

async fn wait_for_reply(captured: &Captured) -> (String, ReplyActivity) {
    for _ in 0..100 {
        if let Some(entry) = captured.replies.lock().expect("replies lock").first() {
            return entry.clone();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no reply delivered within 2s");
}

#[tokio::test]
async fn health_responds_with_running() {
    let token_url = spawn_token_endpoint().await;
    let state = test_state(
        Arc::new(EmptyIndex),
        Arc::new(RecordingCompletion::default()),
        Arc::new(RecordingEmbedder::default()),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let res = reqwest::get(&base).await.expect("get health");
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.expect("parse health");
    assert_eq!(body.get("runtime").and_then(|v| v.as_str()), Some("running"));
}

#[tokio::test]
async fn bot_endpoint_delivers_grounded_reply_out_of_band() {
    let (service_url, captured) = spawn_conversation_service().await;
    let token_url = spawn_token_endpoint().await;
    let completion = Arc::new(RecordingCompletion::default());
    let embedder = Arc::new(RecordingEmbedder::default());
    let state = test_state(
        Arc::new(FixedIndex("Soup needs carrots and onions.".to_string())),
        completion.clone(),
        embedder.clone(),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/messages", base))
        .header("Authorization", format!("Bearer {}", valid_token()))
        .json(&soup_activity(&service_url))
        .send()
        .await
        .expect("post activity");
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);

    let (path, reply) = wait_for_reply(&captured).await;
    assert_eq!(path, "conversations/C/activities/42");
    assert_eq!(reply.from.as_ref().map(|a| a.id.as_str()), Some("B"));
    assert_eq!(reply.recipient.as_ref().map(|a| a.id.as_str()), Some("A"));
    assert_eq!(reply.reply_to_id, "42");
    assert_eq!(reply.text, "Carrots and onions.");

    let calls = completion.calls.lock().expect("calls lock").clone();
    assert_eq!(calls.len(), 1);
    let (prompt, max_tokens) = &calls[0];
    assert_eq!(
        prompt,
        "Answer from context.\nContext: Soup needs carrots and onions.\nQuestion: What ingredients for soup?"
    );
    assert_eq!(*max_tokens, 2000);
}

#[tokio::test]
async fn rejected_token_never_reaches_retrieval() {
    let token_url = spawn_token_endpoint().await;
    let embedder = Arc::new(RecordingEmbedder::default());
    let state = test_state(
        Arc::new(FixedIndex("context".to_string())),
        Arc::new(RecordingCompletion::default()),
        embedder.clone(),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let client = reqwest::Client::new();
    let activity = soup_activity("http://127.0.0.1:1");

    let res = client
        .post(format!("{}/api/messages", base))
        .header("Authorization", "Bearer not-a-valid-token")
        .json(&activity)
        .send()
        .await
        .expect("post activity");
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{}/api/messages", base))
        .json(&activity)
        .send()
        .await
        .expect("post activity without header");
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_index_aborts_without_generation_or_delivery() {
    let (service_url, captured) = spawn_conversation_service().await;
    let token_url = spawn_token_endpoint().await;
    let completion = Arc::new(RecordingCompletion::default());
    let state = test_state(
        Arc::new(EmptyIndex),
        completion.clone(),
        Arc::new(RecordingEmbedder::default()),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/messages", base))
        .header("Authorization", format!("Bearer {}", valid_token()))
        .json(&soup_activity(&service_url))
        .send()
        .await
        .expect("post activity");
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(completion.calls.lock().expect("calls lock").is_empty());
    assert!(captured.replies.lock().expect("replies lock").is_empty());
}

#[tokio::test]
async fn chat_returns_answer_in_the_response() {
    let token_url = spawn_token_endpoint().await;
    let state = test_state(
        Arc::new(FixedIndex("Soup needs carrots and onions.".to_string())),
        Arc::new(RecordingCompletion::default()),
        Arc::new(RecordingEmbedder::default()),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/chat", base))
        .json(&json!({ "question": "What ingredients for soup?" }))
        .send()
        .await
        .expect("post chat");
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.expect("parse chat response");
    assert_eq!(
        body.get("answer").and_then(|v| v.as_str()),
        Some("Carrots and onions.")
    );
}

#[tokio::test]
async fn embeddings_returns_one_vector_per_input() {
    let token_url = spawn_token_endpoint().await;
    let state = test_state(
        Arc::new(EmptyIndex),
        Arc::new(RecordingCompletion::default()),
        Arc::new(RecordingEmbedder::default()),
        &token_url,
    );
    let base = spawn_gateway(state).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/embeddings", base))
        .json(&json!({ "input": ["first", "second"] }))
        .send()
        .await
        .expect("post embeddings");
    assert!(res.status().is_success());
    let body: Vec<Vec<f32>> = res.json().await.expect("parse embeddings");
    assert_eq!(body.len(), 2);
    assert_eq!(body[0], vec![0.25, 0.5]);
}
