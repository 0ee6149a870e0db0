//! Response envelopes and terminal failure rendering.
//!
//! Success and failure both leave the gateway in one envelope shape. The
//! `IntoResponse` impl on `ApiError` is the single point where a raised
//! failure becomes an HTTP response; it cannot itself fail (serialization
//! falls back to a static body). `log_failures` emits the one diagnostic
//! line per failed request.

use crate::error::ApiError;
use axum::body::Body;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::error;

const FALLBACK_BODY: &str = r#"{"success":false,"error":{"code":"GENERAL_ERROR","message":"An unexpected error occurred"}}"#;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wrap successful data in the response envelope. Extra metadata entries are
/// merged alongside the timestamp.
pub fn success_envelope<T: Serialize>(data: T, metadata: Option<JsonValue>) -> JsonValue {
    let mut meta = match metadata {
        Some(JsonValue::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    meta.insert("timestamp".to_string(), json!(timestamp()));

    json!({
        "success": true,
        "data": data,
        "metadata": meta,
    })
}

/// Wrap a failure message in the response envelope.
pub fn error_envelope(message: &str, code: Option<&str>) -> JsonValue {
    json!({
        "success": false,
        "error": {
            "code": code.unwrap_or("ERROR"),
            "message": message,
        },
        "timestamp": timestamp(),
    })
}

/// Machine code of the error a response was rendered from, stashed in
/// response extensions for the failure logger.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorCode(pub &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let mut error = serde_json::Map::new();
        error.insert("code".to_string(), json!(code));
        error.insert("message".to_string(), json!(self.to_string()));
        if let Some(details) = self.details() {
            error.insert("details".to_string(), details);
        }
        let body = json!({
            "success": false,
            "error": error,
            "timestamp": timestamp(),
        });
        let body = serde_json::to_string(&body).unwrap_or_else(|_| FALLBACK_BODY.to_string());

        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response();
        response.extensions_mut().insert(ErrorCode(code));
        response
    }
}

/// Middleware logging one structured diagnostic line per failed request.
pub async fn log_failures(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let code = response
            .extensions()
            .get::<ErrorCode>()
            .map(|c| c.0)
            .unwrap_or("ERROR");
        error!(
            status = %status,
            code = %code,
            method = %method,
            path = %path,
            "Request failed"
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = success_envelope(json!({"id": 7}), None);
        assert_eq!(envelope["success"], json!(true));
        assert_eq!(envelope["data"]["id"], json!(7));
        assert!(envelope["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn test_success_envelope_merges_metadata() {
        let envelope = success_envelope(json!([]), Some(json!({"total": 3})));
        assert_eq!(envelope["metadata"]["total"], json!(3));
        assert!(envelope["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = error_envelope("boom", None);
        assert_eq!(envelope["success"], json!(false));
        assert_eq!(envelope["error"]["code"], json!("ERROR"));
        assert_eq!(envelope["error"]["message"], json!("boom"));
        assert!(envelope["timestamp"].is_string());

        let envelope = error_envelope("gone", Some("NOT_FOUND"));
        assert_eq!(envelope["error"]["code"], json!("NOT_FOUND"));
    }

    #[test]
    fn test_timestamp_is_iso8601_utc() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_api_error_renders_with_status_and_code() {
        let response = ApiError::permission_denied("DELETE", "not declared").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.extensions().get::<ErrorCode>().map(|c| c.0),
            Some("PERMISSION_DENIED")
        );
    }

    #[test]
    fn test_fallback_body_is_valid_json() {
        let value: JsonValue = serde_json::from_str(FALLBACK_BODY).unwrap();
        assert_eq!(value["success"], json!(false));
    }
}
