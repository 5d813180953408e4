use serde::Deserialize;

use crate::core::RiskTier;

/// Risk signal extracted from an LLM answer.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmVerdict {
    pub tier: RiskTier,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(alias = "status", alias = "classification")]
    risk: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Build the assessment prompt for a case description.
pub fn build_prompt(case_text: &str, similar_hint: Option<f32>) -> String {
    let hint = match similar_hint {
        Some(score) => format!("The closest known scam case has similarity {score:.2} (0-1)."),
        None => "No similar known scam case was found.".to_string(),
    };
    format!(
        "You assess whether a user-reported situation is a scam (phishing, fraud, impersonation, \
         investment or trade fraud).\n\
         Situation: \"{case_text}\"\n\
         {hint}\n\
         Answer with JSON only:\n\
         {{\"risk\": \"SAFE|WARNING|DANGER\", \"reason\": \"short explanation\", \"confidence\": 0.0-1.0}}"
    )
}

/// Parse an LLM answer. JSON first (bare, fenced or embedded), then a
/// keyword scan that accepts exactly one tier name. `None` if neither works.
pub fn parse_verdict(answer: &str) -> Option<LlmVerdict> {
    parse_json(answer).or_else(|| parse_keywords(answer))
}

fn parse_json(answer: &str) -> Option<LlmVerdict> {
    let trimmed = answer.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => return None,
    };
    let raw: RawVerdict = serde_json::from_str(candidate).ok()?;
    let tier = RiskTier::parse(&raw.risk)?;
    Some(LlmVerdict {
        tier,
        reason: raw.reason.filter(|r| !r.trim().is_empty()),
        confidence: raw.confidence.map(|c| c.clamp(0.0, 1.0)),
    })
}

/// Words that negate a tier name within the next two tokens ("isn't" splits
/// into ISN + T).
const NEGATIONS: [&str; 6] = ["NOT", "NO", "NEVER", "ISN", "WASN", "DOESN"];

/// Whole-word scan for tier names. Exactly one distinct tier, never negated.
fn parse_keywords(answer: &str) -> Option<LlmVerdict> {
    let upper = answer.to_ascii_uppercase();
    let tokens: Vec<&str> = upper
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.iter().any(|t| *t == "UNSAFE") {
        return None;
    }

    let mut found: Option<RiskTier> = None;
    for (i, token) in tokens.iter().enumerate() {
        let Some(tier) = RiskTier::parse(token) else {
            continue;
        };
        if tokens[i.saturating_sub(2)..i].iter().any(|t| NEGATIONS.contains(t)) {
            return None;
        }
        match found {
            Some(prev) if prev != tier => return None,
            _ => found = Some(tier),
        }
    }
    found.map(|tier| LlmVerdict {
        tier,
        reason: None,
        confidence: None,
    })
}
