pub mod openai;
pub mod qdrant;
pub mod safe_browsing;

#[cfg(test)]
pub mod fake;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::SimilarCase;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Threat-list lookup for URLs.
#[async_trait]
pub trait BlocklistChecker: Send + Sync {
    /// `Ok(true)` when the URL matches a known threat.
    async fn lookup(&self, url: &str) -> Result<bool, ClientError>;
}

/// Embedding model plus the vector index of classified cases.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError>;

    /// At most `top_k` hits, highest score first. Empty corpus → empty vec.
    async fn search_similar_cases(&self, vector: &[f32], top_k: usize) -> Result<Vec<SimilarCase>, ClientError>;

    /// Upsert; an existing `id` is overwritten.
    async fn save_vector(&self, id: &str, vector: &[f32], payload: HashMap<String, Value>) -> Result<(), ClientError>;
}

/// Prompt-in, text-out language model.
#[async_trait]
pub trait LlmAssessor: Send + Sync {
    async fn generate_response(&self, prompt: &str) -> Result<String, ClientError>;
}

/// Turn a non-2xx response into `ClientError::Status`.
pub(crate) async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
