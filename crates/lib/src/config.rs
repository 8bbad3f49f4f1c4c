//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.verso/config.json`) and
//! environment. Credentials for the outbound identity provider come from the
//! environment first so they can stay out of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bot channel settings (inbound verification, outbound identity).
    #[serde(default)]
    pub bot: BotConfig,

    /// Vector index settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Model settings (completion and embeddings).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Prompt template settings.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Bot channel config: where inbound tokens are verified against and where
/// outbound tokens are minted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// OAuth2 client id for the outbound identity provider. Also the expected
    /// audience of inbound tokens. Overridden by BOT_CLIENT_ID env.
    pub client_id: Option<String>,

    /// OAuth2 client secret. Overridden by BOT_CLIENT_SECRET env.
    pub client_secret: Option<String>,

    /// Well-known URL of the channel's signing key set. Overridden by
    /// BOT_JWKS_URL env. Fetched once at startup; startup fails without it.
    pub jwks_url: Option<String>,

    /// Expected issuer of inbound tokens. When unset, issuer is not checked.
    pub issuer: Option<String>,

    /// Identity endpoint for the client-credentials grant.
    pub token_url: Option<String>,

    /// Scope sent with the token request.
    #[serde(default)]
    pub scope: String,
}

/// Vector index config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// Base URL of the vector index service (default "http://127.0.0.1:8000").
    #[serde(default = "default_index_url")]
    pub index_url: String,
}

fn default_index_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
        }
    }
}

/// Model config for the Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Ollama base URL. When unset, the client default (127.0.0.1:11434) is used.
    pub base_url: Option<String>,

    /// Completion model name (default "gemma:2b").
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model name (default "nomic-embed-text").
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Output-length bound passed to the completion call (default 2000).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// How many generations may run at once. The backing model is resource
    /// bound (one accelerator), so this defaults to a single slot and excess
    /// requests queue.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_model() -> String {
    "gemma:2b".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_max_concurrency() -> usize {
    1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            embed_model: default_embed_model(),
            max_tokens: default_max_tokens(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Prompt template config. The template is immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    /// Grounding template; must contain `{context}` and `{question}`.
    #[serde(default = "default_template")]
    pub template: String,
}

fn default_template() -> String {
    "Use the following pieces of context to answer the question at the end. \
     If you don't know the answer, just say that you don't know, don't try to \
     make up an answer.\nContext: {context}\nQuestion: {question}"
        .to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}

fn env_or(var: &str, fallback: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            fallback
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the OAuth2 client id: env BOT_CLIENT_ID overrides config.
pub fn resolve_client_id(config: &Config) -> Option<String> {
    env_or("BOT_CLIENT_ID", config.bot.client_id.as_ref())
}

/// Resolve the OAuth2 client secret: env BOT_CLIENT_SECRET overrides config.
pub fn resolve_client_secret(config: &Config) -> Option<String> {
    env_or("BOT_CLIENT_SECRET", config.bot.client_secret.as_ref())
}

/// Resolve the signing key set URL: env BOT_JWKS_URL overrides config.
pub fn resolve_jwks_url(config: &Config) -> Option<String> {
    env_or("BOT_JWKS_URL", config.bot.jwks_url.as_ref())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("VERSO_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".verso").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or VERSO_CONFIG_PATH). Missing file =>
/// default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
