//! Parsing of raw oracle responses into validated actions.

use tracing::debug;

use crate::action::{preview, Action, RawAction};
use crate::Error;

/// Characters of the raw response quoted in parse errors.
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Parse the oracle's raw text into a validated [`Action`].
///
/// Code fences and prose around the JSON object are stripped first. This is
/// the only place where validation runs.
pub fn parse_decision(response: &str) -> Result<Action, Error> {
    let cleaned = clean_response(response);

    let raw: RawAction = serde_json::from_str(cleaned).map_err(|e| {
        Error::Decision(format!(
            "failed to parse action JSON: {e}; response was: {}",
            preview(response, RESPONSE_PREVIEW_CHARS)
        ))
    })?;

    debug!(kind = %raw.kind, "Parsed raw decision");
    Ok(raw.normalize_and_validate()?)
}

/// Strip markdown fences and keep the outermost `{ ... }` slice.
fn clean_response(response: &str) -> &str {
    let mut cleaned = response.trim();

    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned = cleaned.trim();

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    }
}
