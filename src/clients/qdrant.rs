use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{check_status, ClientError, VectorIndex};
use crate::config::VectorConfig;
use crate::core::SimilarCase;

/// Embedding server + Qdrant collection.
pub struct QdrantIndex {
    client: Client,
    embedding_url: String,
    collection_url: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    vector: Vec<f32>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<HashMap<String, Value>>,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            embedding_url: config.embedding_url.clone(),
            collection_url: format!(
                "{}/collections/{}",
                config.qdrant_host.trim_end_matches('/'),
                config.collection
            ),
        })
    }
}

/// Qdrant point ids are either unsigned integers or UUID strings.
fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode a search response body, keeping the index's ordering but making
/// sure it is descending by score.
pub fn parse_search_response(body: &str) -> Result<Vec<SimilarCase>, ClientError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
    let mut cases: Vec<SimilarCase> = parsed
        .result
        .into_iter()
        .map(|p| SimilarCase {
            id: point_id(&p.id),
            score: p.score.clamp(0.0, 1.0),
            payload: p.payload.unwrap_or_default(),
        })
        .collect();
    cases.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(cases)
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let resp = self
            .client
            .post(&self.embedding_url)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        let resp = check_status("embedding", resp).await?;
        let body: EmbeddingResponse = resp.json().await?;
        if body.vector.is_empty() {
            return Err(ClientError::Decode("empty embedding vector".into()));
        }
        Ok(body.vector)
    }

    async fn search_similar_cases(&self, vector: &[f32], top_k: usize) -> Result<Vec<SimilarCase>, ClientError> {
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await?;
        let resp = check_status("qdrant", resp).await?;
        let text = resp.text().await?;
        let mut cases = parse_search_response(&text)?;
        cases.truncate(top_k);
        Ok(cases)
    }

    async fn save_vector(&self, id: &str, vector: &[f32], payload: HashMap<String, Value>) -> Result<(), ClientError> {
        let resp = self
            .client
            .put(format!("{}/points", self.collection_url))
            .json(&json!({
                "points": [{ "id": id, "vector": vector, "payload": payload }]
            }))
            .send()
            .await?;
        check_status("qdrant", resp).await?;
        Ok(())
    }
}
