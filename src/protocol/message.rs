//! Request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single request read off a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Name of the handler to run. Empty means "no route given".
    #[serde(default)]
    pub route: String,

    /// Handler-defined payload.
    #[serde(default)]
    pub content: Value,
}

impl Request {
    pub fn new(route: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            route: route.into(),
            content: content.into(),
        }
    }
}

/// Exactly one of these is written for every decoded request.
///
/// Serialized as `{"status":"ok","message":...}` or `{"status":"nok","error":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok { message: String },

    #[serde(rename = "nok")]
    Nok { error: String },
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Response::Ok {
            message: message.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Response::Nok {
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }

    /// Status label as it appears on the wire.
    pub fn status(&self) -> &'static str {
        match self {
            Response::Ok { .. } => "ok",
            Response::Nok { .. } => "nok",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_wire_shapes() {
        let ok = serde_json::to_string(&Response::ok("hi")).unwrap();
        assert_eq!(ok, r#"{"status":"ok","message":"hi"}"#);

        let nok = serde_json::to_string(&Response::failure("missing content")).unwrap();
        assert_eq!(nok, r#"{"status":"nok","error":"missing content"}"#);
    }

    #[test]
    fn request_fields_default_when_missing() {
        let req: Request = serde_json::from_str(r#"{"content": 5}"#).unwrap();
        assert_eq!(req.route, "");
        assert_eq!(req.content, json!(5));

        let req: Request = serde_json::from_str(r#"{"route": "echo"}"#).unwrap();
        assert_eq!(req.route, "echo");
        assert!(req.content.is_null());
    }

    #[test]
    fn request_with_nested_content_survives_roundtrip() {
        let req = Request::new("books", json!({"id": 7, "tags": ["a", "b"], "meta": null}));
        let text = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&text).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn status_labels() {
        assert_eq!(Response::ok("x").status(), "ok");
        assert_eq!(Response::failure("x").status(), "nok");
        assert!(Response::ok("x").is_ok());
        assert!(!Response::failure("x").is_ok());
    }
}
