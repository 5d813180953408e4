//! Deterministic in-process stand-ins for the external services.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{BlocklistChecker, ClientError, LlmAssessor, VectorIndex};
use crate::core::SimilarCase;

fn unavailable(service: &'static str) -> ClientError {
    ClientError::Status {
        service,
        status: 503,
        body: "unavailable".into(),
    }
}

pub struct FakeBlocklist {
    listed: HashSet<String>,
    fail: bool,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeBlocklist {
    pub fn with(urls: &[&str]) -> Self {
        Self {
            listed: urls.iter().map(|u| u.to_string()).collect(),
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with(&[])
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlocklistChecker for FakeBlocklist {
    async fn lookup(&self, url: &str) -> Result<bool, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(unavailable("safe-browsing"));
        }
        Ok(self.listed.contains(url))
    }
}

/// Vector index returning canned results; records every write.
pub struct FakeIndex {
    results: Mutex<Vec<SimilarCase>>,
    fail_embed: bool,
    fail_search: bool,
    fail_save: bool,
    search_delay: Option<Duration>,
    pub saved: Mutex<HashMap<String, (Vec<f32>, HashMap<String, Value>)>>,
    pub embed_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl FakeIndex {
    pub fn with_scores(scores: &[f32]) -> Self {
        let results = scores
            .iter()
            .enumerate()
            .map(|(i, s)| SimilarCase {
                id: format!("case-{i}"),
                score: *s,
                payload: HashMap::new(),
            })
            .collect();
        Self {
            results: Mutex::new(results),
            fail_embed: false,
            fail_search: false,
            fail_save: false,
            search_delay: None,
            saved: Mutex::new(HashMap::new()),
            embed_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cases(cases: Vec<SimilarCase>) -> Self {
        let index = Self::with_scores(&[]);
        *index.results.lock().unwrap() = cases;
        index
    }

    pub fn empty() -> Self {
        Self::with_scores(&[])
    }

    pub fn failing_search() -> Self {
        Self {
            fail_search: true,
            ..Self::empty()
        }
    }

    pub fn failing_embed(scores: &[f32]) -> Self {
        Self {
            fail_embed: true,
            ..Self::with_scores(scores)
        }
    }

    pub fn slow_search(delay: Duration, scores: &[f32]) -> Self {
        Self {
            search_delay: Some(delay),
            ..Self::with_scores(scores)
        }
    }

    pub fn failing_save(scores: &[f32]) -> Self {
        Self {
            fail_save: true,
            ..Self::with_scores(scores)
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

/// Stable toy embedding: byte histogram folded into 8 buckets.
pub fn toy_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[(b as usize + i) % 8] += 1.0;
    }
    v
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(unavailable("embedding"));
        }
        Ok(toy_embedding(text))
    }

    async fn search_similar_cases(&self, _vector: &[f32], top_k: usize) -> Result<Vec<SimilarCase>, ClientError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.search_delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_search {
            return Err(unavailable("qdrant"));
        }
        let mut results = self.results.lock().unwrap().clone();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn save_vector(&self, id: &str, vector: &[f32], payload: HashMap<String, Value>) -> Result<(), ClientError> {
        if self.fail_save {
            return Err(unavailable("qdrant"));
        }
        self.saved
            .lock()
            .unwrap()
            .insert(id.to_string(), (vector.to_vec(), payload));
        Ok(())
    }
}

/// One scripted LLM reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// 200 response without usable content.
    Malformed,
    Unavailable,
}

/// LLM replaying scripted replies in order; the last one repeats.
pub struct FakeLlm {
    replies: Mutex<VecDeque<Reply>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn scripted(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(answers: &[&str]) -> Self {
        Self::scripted(answers.iter().map(|a| Reply::Text(a.to_string())).collect())
    }

    pub fn failing() -> Self {
        Self::scripted(vec![Reply::Unavailable])
    }

    pub fn slow(delay: Duration, answer: &str) -> Self {
        Self {
            delay: Some(delay),
            ..Self::answering(&[answer])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmAssessor for FakeLlm {
    async fn generate_response(&self, _prompt: &str) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match next {
            Some(Reply::Text(answer)) => Ok(answer),
            Some(Reply::Malformed) => Err(ClientError::Decode("no choices[0].message.content".into())),
            _ => Err(unavailable("openai")),
        }
    }
}
