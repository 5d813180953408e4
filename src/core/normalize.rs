use thiserror::Error;
use url::Url;

use super::DetectionInput;

/// Caller-visible validation failure. Raised before the pipeline runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("input is empty")]
    Empty,
    #[error("input is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
}

/// Trim and collapse whitespace runs (including CR/LF/tab) to single spaces.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize free text for a case submission.
pub fn normalize_case(raw: &str, max_len: usize) -> Result<DetectionInput, InputError> {
    let text = collapse_whitespace(raw);
    check_length(&text, max_len)?;
    Ok(DetectionInput::Case(text))
}

/// Normalize a URL. Scheme-less input is assumed to be `http://`.
pub fn normalize_url(raw: &str, max_len: usize) -> Result<DetectionInput, InputError> {
    let trimmed = raw.trim();
    check_length(trimmed, max_len)?;
    if trimmed.chars().any(char::is_whitespace) {
        return Err(InputError::MalformedUrl(trimmed.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|_| InputError::MalformedUrl(trimmed.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InputError::MalformedUrl(trimmed.to_string()));
    }
    match parsed.host_str() {
        // Bare words like "http://foo" are not routable hosts.
        Some(host) if host.contains('.') || host == "localhost" => {}
        _ => return Err(InputError::MalformedUrl(trimmed.to_string())),
    }

    // Keep what the user typed; the blocklist matches on the literal URL.
    Ok(DetectionInput::Url(trimmed.to_string()))
}

fn check_length(text: &str, max_len: usize) -> Result<(), InputError> {
    if text.is_empty() {
        return Err(InputError::Empty);
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(InputError::TooLong { len, max: max_len });
    }
    Ok(())
}
