//! Oracle decisions
//!
//! The oracle answers in free text that should contain one JSON object. The
//! object is cut out from the first `{` to the last `}` and mapped onto a
//! [`Decision`].

use serde_json::{Map, Value};

use crate::core::{PilotError, Result};

/// Why the loop is pausing instead of acting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The oracle asked to wait
    Requested,
    /// Every oracle attempt failed; stall rather than abort
    OracleUnavailable,
}

/// The oracle's proposed next action
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Click { target: String },
    Fill { target: String, value: String },
    Press { key: String },
    Wait { reason: WaitReason },
    Finish { success: bool, desc: String },
    /// Parsed cleanly but carried no usable `action`
    Unusable { raw: String },
}

impl Decision {
    /// The `action` string this decision corresponds to
    pub fn action_name(&self) -> &'static str {
        match self {
            Decision::Click { .. } => "click",
            Decision::Fill { .. } => "fill",
            Decision::Press { .. } => "press",
            Decision::Wait { .. } => "wait",
            Decision::Finish { .. } => "finish",
            Decision::Unusable { .. } => "unusable",
        }
    }

    /// What the step acted on, as recorded in history
    pub fn target_label(&self) -> Option<&str> {
        match self {
            Decision::Click { target } | Decision::Fill { target, .. } => Some(target),
            Decision::Press { key } => Some(key),
            _ => None,
        }
    }

    /// Whether the step executor handles this decision
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            Decision::Click { .. } | Decision::Fill { .. } | Decision::Press { .. }
        )
    }

    /// Parse an oracle response.
    ///
    /// Errors (retryable) when no braces are found or the substring is not a
    /// JSON object. A well-formed object without a known `action` yields
    /// [`Decision::Unusable`].
    pub fn parse(response: &str) -> Result<Self> {
        let object = extract_object(response)?;

        let action = object
            .get("action")
            .and_then(Value::as_str)
            .map(|a| a.trim().to_ascii_lowercase());

        let decision = match action.as_deref() {
            Some("click") => Decision::Click {
                target: string_field(&object, "target"),
            },
            Some("fill") => Decision::Fill {
                target: string_field(&object, "target"),
                value: string_field(&object, "value"),
            },
            Some("press") => Decision::Press {
                key: string_field(&object, "key"),
            },
            Some("wait") => Decision::Wait {
                reason: WaitReason::Requested,
            },
            Some("finish") => Decision::Finish {
                success: bool_field(&object, "success"),
                desc: string_field(&object, "desc"),
            },
            _ => Decision::Unusable {
                raw: Value::Object(object).to_string(),
            },
        };
        Ok(decision)
    }
}

fn extract_object(response: &str) -> Result<Map<String, Value>> {
    let start = response.find('{');
    let end = response.rfind('}');

    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => {
            return Err(PilotError::oracle(
                "response contains no JSON object".to_string(),
            ))
        }
    };

    match serde_json::from_str::<Value>(slice)? {
        Value::Object(map) => Ok(map),
        _ => Err(PilotError::oracle("decision is not a JSON object")),
    }
}

/// Strings pass through, numbers and booleans are stringified, anything else is empty
fn string_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
