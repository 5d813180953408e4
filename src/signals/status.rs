use serde_json::Value;

use crate::config::StatusThresholds;
use crate::core::{ActionType, DetectionGroup, DetectionResult, RiskTier, SimilarCase};

/// Maps the top similarity score to a tier. Lower bounds are inclusive.
pub struct StatusMapper {
    thresholds: StatusThresholds,
}

impl StatusMapper {
    pub fn new(thresholds: StatusThresholds) -> Self {
        Self { thresholds }
    }

    pub fn tier_for_score(&self, score: f32) -> RiskTier {
        if score >= self.thresholds.danger {
            RiskTier::Danger
        } else if score >= self.thresholds.warning {
            RiskTier::Warning
        } else {
            RiskTier::Safe
        }
    }

    /// Tier from an ordered result list. Empty means no signal → SAFE.
    pub fn tier(&self, results: &[SimilarCase]) -> RiskTier {
        results
            .first()
            .map_or(RiskTier::Safe, |top| self.tier_for_score(top.score))
    }

    pub fn map(&self, results: &[SimilarCase]) -> DetectionResult {
        let status = self.tier(results);
        let top = results.first();
        let category = top.and_then(category_of);
        let reason = match category {
            Some(category) if status != RiskTier::Safe => {
                format!("Resembles a known {} case", category.label())
            }
            _ => status.generic_reason().to_string(),
        };
        DetectionResult {
            status,
            reason,
            top_score: top.map(|c| c.score),
            matched_case_id: top.map(|c| c.id.clone()),
            escalated: false,
            group: category.map(|c| c.group()),
            quality_score: None,
            action: ActionType::for_outcome(status, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseCategory {
    Transaction,
    Investment,
    Impersonation,
    Phishing,
}

impl CaseCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CaseCategory::Transaction => "transaction fraud",
            CaseCategory::Investment => "investment fraud",
            CaseCategory::Impersonation => "impersonation",
            CaseCategory::Phishing => "phishing",
        }
    }

    pub fn group(&self) -> DetectionGroup {
        match self {
            CaseCategory::Transaction | CaseCategory::Investment => DetectionGroup::Normal,
            CaseCategory::Impersonation | CaseCategory::Phishing => DetectionGroup::Phishing,
        }
    }
}

/// Category of a matched case, read from its `category` or `CONTENT` payload field.
pub fn category_of(case: &SimilarCase) -> Option<CaseCategory> {
    let text = ["category", "CONTENT"]
        .iter()
        .find_map(|k| case.payload.get(*k).and_then(Value::as_str))?;
    let lower = text.to_lowercase();
    let category = if text.contains("거래") || lower.contains("transaction") {
        CaseCategory::Transaction
    } else if text.contains("투자") || lower.contains("investment") {
        CaseCategory::Investment
    } else if text.contains("사칭") || lower.contains("impersonation") {
        CaseCategory::Impersonation
    } else {
        CaseCategory::Phishing
    };
    Some(category)
}
