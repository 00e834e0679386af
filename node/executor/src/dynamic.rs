//! Argument extraction from script output

use serde_json::Value;
use tracing::{debug, warn};

const RESPONSE_MARKER: &str = "Response:";
const CONDITION_MARKER: &str = "Condition satisfied: true";

/// Interpret script stdout as an argument list.
///
/// Tried in order: a non-empty JSON array, every `Response: <number>` line,
/// a satisfied-condition marker, and finally a single `"0"`.
pub fn parse_dynamic_args(output: &str) -> Vec<Value> {
    let trimmed = output.trim();

    if let Ok(values) = serde_json::from_str::<Vec<Value>>(trimmed) {
        if !values.is_empty() {
            debug!(count = values.len(), "Parsed dynamic arguments as JSON array");
            return values;
        }
    }

    let responses = response_values(output);
    if !responses.is_empty() {
        debug!(count = responses.len(), "Parsed dynamic arguments from response lines");
        return responses;
    }

    if output.contains(CONDITION_MARKER) {
        return vec![Value::Bool(true)];
    }

    warn!("No arguments recognized in script output, defaulting to 0");
    vec![Value::String("0".to_string())]
}

/// Static arguments are passed through as text
pub fn parse_static_args(args: &[String]) -> Vec<Value> {
    args.iter().cloned().map(Value::String).collect()
}

fn response_values(output: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut rest = output;

    while let Some(pos) = rest.find(RESPONSE_MARKER) {
        rest = rest[pos + RESPONSE_MARKER.len()..].trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let token = &rest[..end];
        rest = &rest[end..];

        if token.is_empty() {
            continue;
        }
        let value = token
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(token.to_string()));
        values.push(value);
    }

    values
}
