pub mod normalize;
pub mod pipeline;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user submission to classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionInput {
    Url(String),
    Case(String),
}

impl DetectionInput {
    pub fn content(&self) -> &str {
        match self {
            DetectionInput::Url(s) | DetectionInput::Case(s) => s,
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            DetectionInput::Url(_) => InputKind::Url,
            DetectionInput::Case(_) => InputKind::Case,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputKind {
    Url,
    Case,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Url => "URL",
            InputKind::Case => "CASE",
        }
    }
}

/// Risk tier, ordered by severity: `Safe < Warning < Danger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Safe,
    Warning,
    Danger,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "SAFE",
            RiskTier::Warning => "WARNING",
            RiskTier::Danger => "DANGER",
        }
    }

    /// Case-insensitive parse of a tier name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Some(RiskTier::Safe),
            "WARNING" => Some(RiskTier::Warning),
            "DANGER" => Some(RiskTier::Danger),
            _ => None,
        }
    }

    /// Most severe of the two. DANGER is never downgraded.
    pub fn fold(self, other: RiskTier) -> RiskTier {
        self.max(other)
    }

    pub fn generic_reason(&self) -> &'static str {
        match self {
            RiskTier::Safe => "No similar scam cases were found",
            RiskTier::Warning => "Partially matches known scam patterns, proceed with caution",
            RiskTier::Danger => "Closely matches known scam cases",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scam family of the matched case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionGroup {
    /// Transaction and investment fraud.
    Normal,
    /// Phishing and impersonation.
    Phishing,
}

impl DetectionGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionGroup::Normal => "NORMAL",
            DetectionGroup::Phishing => "PHISHING",
        }
    }
}

/// What the caller should do with the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    ImmediateAction,
    ManualReview,
    /// Detailed report with no close match: likely a new pattern worth sharing.
    CommunityShare,
    NoAction,
}

/// Quality (0-10 scale) at or above which an unmatched report is shared.
pub const COMMUNITY_SHARE_QUALITY: f64 = 6.0;

impl ActionType {
    pub fn for_outcome(status: RiskTier, quality_score: Option<f64>) -> Self {
        match status {
            RiskTier::Danger => ActionType::ImmediateAction,
            RiskTier::Warning => ActionType::ManualReview,
            RiskTier::Safe if quality_score.is_some_and(|q| q >= COMMUNITY_SHARE_QUALITY) => {
                ActionType::CommunityShare
            }
            RiskTier::Safe => ActionType::NoAction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ImmediateAction => "IMMEDIATE_ACTION",
            ActionType::ManualReview => "MANUAL_REVIEW",
            ActionType::CommunityShare => "COMMUNITY_SHARE",
            ActionType::NoAction => "NO_ACTION",
        }
    }
}

/// The single verdict produced for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub status: RiskTier,
    pub reason: String,
    /// Top similarity score, if the vector index returned anything.
    pub top_score: Option<f32>,
    pub matched_case_id: Option<String>,
    /// Whether the LLM assessor contributed to `status`.
    pub escalated: bool,
    pub group: Option<DetectionGroup>,
    /// Input quality on the 0-10 scale. Absent for blocklist hits.
    pub quality_score: Option<f64>,
    pub action: ActionType,
}

impl DetectionResult {
    pub fn blocklisted() -> Self {
        Self {
            status: RiskTier::Danger,
            reason: "URL is listed in the threat-intelligence blocklist".to_string(),
            top_score: None,
            matched_case_id: None,
            escalated: false,
            group: Some(DetectionGroup::Phishing),
            quality_score: None,
            action: ActionType::ImmediateAction,
        }
    }

    /// Recompute `action` from the final status and quality.
    pub fn settle_action(&mut self) {
        self.action = ActionType::for_outcome(self.status, self.quality_score);
    }
}

/// One hit from the vector index, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_ordered_by_severity() {
        assert!(RiskTier::Safe < RiskTier::Warning);
        assert!(RiskTier::Warning < RiskTier::Danger);
    }

    #[test]
    fn fold_keeps_most_severe() {
        assert_eq!(RiskTier::Danger.fold(RiskTier::Safe), RiskTier::Danger);
        assert_eq!(RiskTier::Safe.fold(RiskTier::Warning), RiskTier::Warning);
        assert_eq!(RiskTier::Warning.fold(RiskTier::Warning), RiskTier::Warning);
    }

    #[test]
    fn parse_tier_names() {
        assert_eq!(RiskTier::parse(" danger "), Some(RiskTier::Danger));
        assert_eq!(RiskTier::parse("Warning"), Some(RiskTier::Warning));
        assert_eq!(RiskTier::parse("unknown"), None);
    }

    #[test]
    fn tier_serializes_uppercase() {
        let json = serde_json::to_string(&RiskTier::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }

    #[test]
    fn action_follows_status_and_quality() {
        assert_eq!(ActionType::for_outcome(RiskTier::Danger, Some(1.0)), ActionType::ImmediateAction);
        assert_eq!(ActionType::for_outcome(RiskTier::Danger, None), ActionType::ImmediateAction);
        assert_eq!(ActionType::for_outcome(RiskTier::Warning, Some(10.0)), ActionType::ManualReview);
        assert_eq!(ActionType::for_outcome(RiskTier::Safe, Some(10.0)), ActionType::CommunityShare);
        assert_eq!(ActionType::for_outcome(RiskTier::Safe, Some(6.0)), ActionType::CommunityShare);
        assert_eq!(ActionType::for_outcome(RiskTier::Safe, Some(5.0)), ActionType::NoAction);
        assert_eq!(ActionType::for_outcome(RiskTier::Safe, None), ActionType::NoAction);
    }

    #[test]
    fn action_serializes_screaming_snake() {
        let json = serde_json::to_string(&ActionType::CommunityShare).unwrap();
        assert_eq!(json, "\"COMMUNITY_SHARE\"");
        assert_eq!(ActionType::ImmediateAction.as_str(), "IMMEDIATE_ACTION");
    }

    #[test]
    fn blocklisted_is_phishing_immediate_action() {
        let r = DetectionResult::blocklisted();
        assert_eq!(r.group, Some(DetectionGroup::Phishing));
        assert_eq!(r.action, ActionType::ImmediateAction);
        assert_eq!(r.quality_score, None);
    }

    #[test]
    fn input_dispatch() {
        let url = DetectionInput::Url("https://a.example".into());
        let case = DetectionInput::Case("text".into());
        assert_eq!(url.kind(), InputKind::Url);
        assert_eq!(case.kind(), InputKind::Case);
        assert_eq!(case.content(), "text");
    }
}
