//! Built-in handlers.

use serde_json::Value;

use super::router::HandlerError;

/// Reply with the content. Strings come back verbatim, anything else as compact JSON.
pub fn echo(content: &Value) -> Result<String, HandlerError> {
    match content {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

/// Acknowledge a non-empty content.
pub fn ack(content: &Value) -> Result<String, HandlerError> {
    let text = match content {
        Value::Null => return Err(HandlerError::Missing("content")),
        Value::String(s) if s.is_empty() => return Err(HandlerError::Missing("content")),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(format!("message received: {}", text))
}
