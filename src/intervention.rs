//! Human-in-the-loop responses
//!
//! When the backend suspends a turn it either wants extracted data reviewed
//! (confirm or correct) or wants free-text guidance. Exactly one payload shape
//! goes out on the resumption stream.

use crate::protocol::{InterventionPrompt, ReviewFields, StreamRequest};
use crate::state_machine::ThreadId;
use serde::Serialize;

/// Value sent back to resume a suspended turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HumanResponse {
    /// Accept the extracted data as-is
    Confirm,
    /// Override some of the extracted fields
    Correct { fields: ReviewFields },
    /// Free-text answer
    Guidance { text: String },
}

impl HumanResponse {
    pub fn correct(fields: ReviewFields) -> Self {
        HumanResponse::Correct { fields }
    }

    pub fn guidance(text: impl Into<String>) -> Self {
        HumanResponse::Guidance { text: text.into() }
    }

    /// Query parameters carrying this response. A confirmation never carries
    /// field overrides.
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self {
            HumanResponse::Confirm => vec![("correct".to_string(), "y".to_string())],
            HumanResponse::Correct { fields } => fields.query_params(),
            HumanResponse::Guidance { text } => vec![("response".to_string(), text.clone())],
        }
    }

    /// Text recorded as the human's entry in the conversation
    pub fn summary(&self) -> String {
        match self {
            HumanResponse::Confirm => "Confirmed".to_string(),
            HumanResponse::Correct { fields } => fields
                .query_params()
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
            HumanResponse::Guidance { text } => text.clone(),
        }
    }
}

/// Build the resumption request for `thread`
pub fn resume_request(
    endpoint: &str,
    thread: &ThreadId,
    response: &HumanResponse,
) -> StreamRequest {
    StreamRequest::new(endpoint)
        .params(response.query_params())
        .param("thread_id", thread.as_str())
}

/// Interpret a typed reply against the prompt that asked for it.
///
/// A question takes the reply verbatim as guidance. For a review prompt, a
/// reply starting with `y`/`Y` confirms and `name=...`/`birthday=...` pairs
/// (separated by `;` or `,`) correct. Any other reply to a review prompt is
/// `None`; the backend would read it as a confirmation, so the caller must ask
/// again.
pub fn parse_reply(prompt: &InterventionPrompt, input: &str) -> Option<HumanResponse> {
    let input = input.trim();
    if !prompt.is_review() {
        return Some(HumanResponse::guidance(input));
    }
    if input.starts_with(['y', 'Y']) && !input.contains('=') {
        return Some(HumanResponse::Confirm);
    }

    let mut fields = ReviewFields::default();
    for pair in input.split([';', ',']) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => fields.name = Some(value),
            "birthday" => fields.birthday = Some(value),
            _ => {}
        }
    }

    (!fields.is_empty()).then(|| HumanResponse::correct(fields))
}
