//! Parsing model replies into raw verdicts
//!
//! Replies are expected to hold a JSON array, ideally inside a ```json
//! fence. A bare fence, raw JSON, or an array embedded in prose are
//! accepted too.

use crate::capability::CapabilityError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Locate the JSON payload in a model reply.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    } else if let Some(start) = text.find("```") {
        let start = start + 3;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    let trimmed = text.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// One entry of a model reply. Fields missing for an operation stay `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEntry {
    pub id: Value,
    #[serde(default)]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub should_expand: Option<bool>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub matched_span: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    List(Vec<WireEntry>),
    Wrapped { verdicts: Vec<WireEntry> },
}

/// Parse the entries of a model reply.
pub fn parse_entries(text: &str) -> Result<Vec<WireEntry>, CapabilityError> {
    let json = extract_json(text);
    match serde_json::from_str::<Payload>(json) {
        Ok(Payload::List(entries)) | Ok(Payload::Wrapped { verdicts: entries }) => Ok(entries),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse capability reply");
            Err(CapabilityError::Malformed(e.to_string()))
        }
    }
}

/// Resolve the id a model echoed back. Prompts label candidates `1..=n`;
/// labels map back to candidate ids, anything else passes through so the
/// gateway can reject it.
pub fn resolve_id(id: &Value, labels: &HashMap<String, String>) -> String {
    let raw = match id {
        Value::String(s) => s.trim().trim_start_matches('[').trim_end_matches(']').to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    labels.get(&raw).cloned().unwrap_or(raw)
}
