//! Vector index client: top-1 nearest-neighbor lookup over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The single nearest record's content, grounding one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("index api error: {0}")]
    Api(String),
    #[error("index returned no records")]
    NotFound,
}

/// Nearest-neighbor lookup. Always asks for exactly the top-1 record:
/// single-context grounding, not multi-chunk aggregation. Distance ties are
/// broken by the index's native order, which is not assumed stable.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn nearest_one(&self, vector: &[f32]) -> Result<RetrievedContext, IndexError>;
}

/// HTTP-backed index: POST {base}/query with the query vector and k=1.
#[derive(Clone)]
pub struct HttpVectorIndex {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVectorIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RetrievedContext>,
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn nearest_one(&self, vector: &[f32]) -> Result<RetrievedContext, IndexError> {
        let url = format!("{}/query", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&QueryRequest { vector, k: 1 })
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(IndexError::Api(format!("{} {}", status, body)));
        }
        let data: QueryResponse = res.json().await?;
        data.matches.into_iter().next().ok_or(IndexError::NotFound)
    }
}
