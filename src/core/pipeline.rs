use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::{BlocklistChecker, ClientError, LlmAssessor, VectorIndex};
use crate::config::{Config, DetectionConfig};
use crate::core::normalize::{normalize_case, normalize_url, InputError};
use crate::core::{DetectionGroup, DetectionInput, DetectionResult, InputKind, RiskTier, SimilarCase};
use crate::db::SharedDatabase;
use crate::signals::budget::{estimate_call_cost, BudgetState};
use crate::signals::verdict::{build_prompt, parse_verdict, LlmVerdict};
use crate::signals::{DetectionBudget, QualityGate, StatusMapper};

/// Characters of user text kept in a feedback payload.
const FEEDBACK_CONTENT_CHARS: usize = 200;

/// Per-service call bounds.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub blocklist: Duration,
    pub vector: Duration,
    pub llm: Duration,
}

impl Timeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            blocklist: Duration::from_millis(config.blocklist.timeout_ms),
            vector: Duration::from_millis(config.vector.timeout_ms),
            llm: Duration::from_millis(config.openai.timeout_ms),
        }
    }
}

/// Outcome of the embed + search step. Failures leave both empty.
#[derive(Debug, Default)]
struct Similarity {
    vector: Option<Vec<f32>>,
    results: Vec<SimilarCase>,
}

/// Why escalation did or did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Disabled,
    NotNeeded,
    /// Similarity already says DANGER; the LLM cannot raise it further.
    AlreadyDanger,
    Required,
}

/// The multi-signal detection pipeline. Holds no per-request state; the
/// budget is the only thing shared across concurrent calls.
pub struct DetectionPipeline {
    blocklist: Arc<dyn BlocklistChecker>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmAssessor>,
    budget: Arc<DetectionBudget>,
    history: Option<SharedDatabase>,
    quality: QualityGate,
    mapper: StatusMapper,
    config: DetectionConfig,
    timeouts: Timeouts,
}

impl DetectionPipeline {
    pub fn new(
        config: &Config,
        blocklist: Arc<dyn BlocklistChecker>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmAssessor>,
        budget: Arc<DetectionBudget>,
    ) -> Self {
        let detection = config.detection.clone();
        Self {
            blocklist,
            index,
            llm,
            budget,
            history: None,
            quality: QualityGate::new(detection.quality, detection.min_acceptable_score),
            mapper: StatusMapper::new(detection.thresholds),
            config: detection,
            timeouts: Timeouts::from_config(config),
        }
    }

    pub fn with_history(mut self, db: SharedDatabase) -> Self {
        self.history = Some(db);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Validate and classify a URL.
    pub async fn detect_url(&self, raw: &str) -> Result<DetectionResult, InputError> {
        let input = normalize_url(raw, self.config.max_input_length)?;
        Ok(self.detect(input).await)
    }

    /// Validate and classify a free-text case description.
    pub async fn detect_case(&self, raw: &str) -> Result<DetectionResult, InputError> {
        let input = normalize_case(raw, self.config.max_input_length)?;
        Ok(self.detect(input).await)
    }

    /// Classify already-normalized input. Never fails: every external failure
    /// degrades to a default signal.
    async fn detect(&self, input: DetectionInput) -> DetectionResult {
        let result = match &input {
            DetectionInput::Url(url) => self.run_url(url).await,
            DetectionInput::Case(text) => self.run_text(text, InputKind::Case).await,
        };
        info!(
            kind = input.kind().as_str(),
            status = %result.status,
            top_score = ?result.top_score,
            escalated = result.escalated,
            "Detection complete"
        );
        self.record_history(input.kind(), input.content(), &result);
        result
    }

    async fn run_url(&self, url: &str) -> DetectionResult {
        if self.config.parallel_url_signals {
            let (listed, similarity) = tokio::join!(self.check_url(url), self.similarity(url));
            if listed {
                return DetectionResult::blocklisted();
            }
            return self.assess(url, InputKind::Url, similarity).await;
        }

        if self.check_url(url).await {
            return DetectionResult::blocklisted();
        }
        self.run_text(url, InputKind::Url).await
    }

    async fn run_text(&self, text: &str, kind: InputKind) -> DetectionResult {
        let similarity = self.similarity(text).await;
        self.assess(text, kind, similarity).await
    }

    /// Status mapping, optional escalation and (for cases) feedback.
    async fn assess(&self, text: &str, kind: InputKind, similarity: Similarity) -> DetectionResult {
        let quality = self.quality.score(text);
        let mut result = self.mapper.map(&similarity.results);
        result.quality_score = Some(quality * 10.0);
        if kind == InputKind::Url {
            result.group = Some(DetectionGroup::Phishing);
        }
        let vector_tier = result.status;

        match self.escalation_decision(kind, quality, vector_tier) {
            Escalation::Required => {
                if let Some(verdict) = self.escalate(text, result.top_score).await {
                    fold_verdict(&mut result, verdict);
                }
            }
            decision => debug!(?decision, quality, tier = %vector_tier, "Escalation not attempted"),
        }
        result.settle_action();

        if kind == InputKind::Case {
            self.write_feedback(text, similarity.vector, &result).await;
        }
        result
    }

    /// Escalate when the LLM is enabled and either the similarity tier is
    /// WARNING or a case description is thin. Length says nothing about a URL,
    /// so URLs escalate on WARNING only.
    pub fn escalation_decision(&self, kind: InputKind, quality: f64, vector_tier: RiskTier) -> Escalation {
        if !self.config.enable_openai {
            return Escalation::Disabled;
        }
        if vector_tier == RiskTier::Danger {
            return Escalation::AlreadyDanger;
        }
        let thin_case = kind == InputKind::Case && self.quality.is_low(quality);
        if thin_case || vector_tier == RiskTier::Warning {
            Escalation::Required
        } else {
            Escalation::NotNeeded
        }
    }

    /// Ask the LLM, retrying unparseable or malformed answers up to
    /// `max_search_attempts` calls in total. Each call is charged to the budget
    /// before it is made.
    async fn escalate(&self, text: &str, top_score: Option<f32>) -> Option<LlmVerdict> {
        let prompt = build_prompt(text, top_score);
        let cost = estimate_call_cost(&prompt);
        let attempts = self.config.max_search_attempts.max(1);

        for attempt in 1..=attempts {
            match self.budget.try_reserve(cost) {
                Ok(state) => {
                    debug!(attempt, calls_used = state.calls_used, cost, "LLM call reserved");
                    self.persist_budget(&state);
                }
                Err(refusal) => {
                    info!(?refusal, attempt, "Escalation skipped, LLM budget exhausted");
                    return None;
                }
            }

            let answer = match bounded("openai", self.timeouts.llm, self.llm.generate_response(&prompt)).await {
                Ok(answer) => answer,
                Err(ClientError::Decode(detail)) => {
                    warn!(attempt, %detail, "Malformed LLM response");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "LLM unavailable, keeping similarity verdict");
                    return None;
                }
            };

            match parse_verdict(&answer) {
                Some(verdict) => {
                    debug!(attempt, tier = %verdict.tier, "LLM verdict parsed");
                    return Some(verdict);
                }
                None => warn!(attempt, answer_len = answer.len(), "Unparseable LLM answer"),
            }
        }
        None
    }

    /// Blocklist lookup. Errors and timeouts count as "not listed".
    async fn check_url(&self, url: &str) -> bool {
        match bounded("safe-browsing", self.timeouts.blocklist, self.blocklist.lookup(url)).await {
            Ok(listed) => {
                debug!(listed, "Blocklist lookup done");
                listed
            }
            Err(e) => {
                warn!(error = %e, "Blocklist lookup failed, treating as no match");
                false
            }
        }
    }

    async fn similarity(&self, text: &str) -> Similarity {
        let vector = match bounded("embedding", self.timeouts.vector, self.index.embed(text)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Embedding failed, no similarity signal");
                return Similarity::default();
            }
        };
        let results = match bounded(
            "qdrant",
            self.timeouts.vector,
            self.index.search_similar_cases(&vector, self.config.top_k),
        )
        .await
        {
            Ok(mut results) => {
                results.sort_by(|a, b| b.score.total_cmp(&a.score));
                results.truncate(self.config.top_k);
                results
            }
            Err(e) => {
                warn!(error = %e, "Similarity search failed, no similarity signal");
                Vec::new()
            }
        };
        debug!(count = results.len(), top = ?results.first().map(|r| r.score), "Similarity search done");
        Similarity {
            vector: Some(vector),
            results,
        }
    }

    async fn write_feedback(&self, text: &str, vector: Option<Vec<f32>>, result: &DetectionResult) {
        if result.status < self.config.feedback_min_tier {
            return;
        }
        let Some(vector) = vector else {
            debug!("No embedding available, feedback skipped");
            return;
        };
        let id = Uuid::new_v4().to_string();
        let payload = feedback_payload(text, result);
        match bounded("qdrant", self.timeouts.vector, self.index.save_vector(&id, &vector, payload)).await {
            Ok(()) => debug!(%id, status = %result.status, "Feedback case stored"),
            Err(e) => warn!(error = %e, "Feedback write failed"),
        }
    }

    fn persist_budget(&self, state: &BudgetState) {
        if let Some(db) = &self.history {
            if let Err(e) = db.save_budget(state) {
                warn!("Failed to persist LLM budget: {e}");
            }
        }
    }

    fn record_history(&self, kind: InputKind, text: &str, result: &DetectionResult) {
        if let Some(db) = &self.history {
            if let Err(e) = db.record_detection(kind, text, result) {
                warn!("Failed to record detection history: {e}");
            }
        }
    }
}

/// Most-severe-wins fold of the LLM verdict into the similarity result.
fn fold_verdict(result: &mut DetectionResult, verdict: LlmVerdict) {
    let folded = result.status.fold(verdict.tier);
    if folded != result.status {
        result.reason = verdict
            .reason
            .unwrap_or_else(|| folded.generic_reason().to_string());
    }
    result.status = folded;
    result.escalated = true;
}

fn feedback_payload(text: &str, result: &DetectionResult) -> HashMap<String, Value> {
    let content: String = text.chars().take(FEEDBACK_CONTENT_CHARS).collect();
    HashMap::from([
        ("CONTENT".to_string(), json!(content)),
        ("status".to_string(), json!(result.status)),
        ("source".to_string(), json!("user-analyzed")),
        ("created_at".to_string(), json!(Utc::now().to_rfc3339())),
    ])
}

/// Run an external call under a deadline.
async fn bounded<T>(
    service: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout { service, after }),
    }
}
