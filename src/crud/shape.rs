//! Request shape capability.
//!
//! A shape is an externally supplied declarative description of the input a
//! controller accepts: give it a candidate value, get back either a typed
//! value or a list of field errors. Parsing is async so shapes backed by
//! external lookups fit the same seam.
//!
//! [`JsonShape`] is the default adapter: serde deserialization for typing
//! and coercion, garde for declarative field validation.

use crate::error::FieldError;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::marker::PhantomData;

/// Parse untrusted input against a declared shape.
pub trait Shape: Send + Sync {
    type Output;

    /// Returns the typed value, or the field-level errors that reject the
    /// candidate. Must not panic.
    fn parse(
        &self,
        candidate: &JsonValue,
    ) -> impl Future<Output = Result<Self::Output, Vec<FieldError>>> + Send;
}

/// Shape adapter for any deserializable, garde-validated type.
pub struct JsonShape<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonShape<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Shape for JsonShape<T>
where
    T: DeserializeOwned + garde::Validate + Send + Sync,
    T::Context: Default,
{
    type Output = T;

    async fn parse(&self, candidate: &JsonValue) -> Result<T, Vec<FieldError>> {
        let value: T = serde_json::from_value(candidate.clone())
            .map_err(|e| vec![FieldError::new("value", e.to_string())])?;

        value
            .validate()
            .map_err(|report| convert_garde_report(&report))?;

        Ok(value)
    }
}

fn convert_garde_report(report: &garde::Report) -> Vec<FieldError> {
    report
        .iter()
        .map(|(path, error)| {
            let field = {
                let s = path.to_string();
                if s.is_empty() { "value".to_string() } else { s }
            };
            FieldError::new(field, error.message().to_string())
        })
        .collect()
}

/// Deserializer helpers for coercing stringly route and query parameters,
/// for use with `#[serde(deserialize_with = "...")]` in shape types.
pub mod coerce {
    use serde::{Deserialize, Deserializer, de::Error};
    use serde_json::Value as JsonValue;

    /// Accept a JSON integer or a numeric string.
    pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Number(n) => n.as_i64().ok_or_else(|| Error::custom("expected an integer")),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::custom(format!("invalid integer: '{s}'"))),
            _ => Err(Error::custom("expected an integer")),
        }
    }

    /// Accept a JSON number or a numeric string.
    pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Number(n) => n.as_f64().ok_or_else(|| Error::custom("expected a number")),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::custom(format!("invalid number: '{s}'"))),
            _ => Err(Error::custom("expected a number")),
        }
    }

    /// Accept a JSON boolean or "true"/"false"/"1"/"0".
    pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::Bool(b) => Ok(b),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(Error::custom(format!("invalid boolean: '{other}'"))),
            },
            _ => Err(Error::custom("expected a boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, garde::Validate)]
    struct Probe {
        #[serde(deserialize_with = "coerce::lenient_i64")]
        #[garde(range(min = 1))]
        id: i64,
        #[garde(length(min = 1))]
        name: String,
    }

    #[tokio::test]
    async fn test_json_shape_accepts_and_coerces() {
        let shape = JsonShape::<Probe>::new();
        let parsed = shape
            .parse(&json!({"id": "7", "name": "Ann"}))
            .await
            .unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.name, "Ann");
    }

    #[tokio::test]
    async fn test_json_shape_rejects_missing_field() {
        let shape = JsonShape::<Probe>::new();
        let errors = shape.parse(&json!({"id": 7})).await.unwrap_err();
        assert!(!errors.is_empty());
        assert!(errors[0].message.contains("name"));
    }

    #[tokio::test]
    async fn test_json_shape_reports_garde_path() {
        let shape = JsonShape::<Probe>::new();
        let errors = shape
            .parse(&json!({"id": 0, "name": ""}))
            .await
            .unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"id"));
        assert!(fields.contains(&"name"));
    }

    #[test]
    fn test_lenient_i64() {
        #[derive(Deserialize)]
        struct W(#[serde(deserialize_with = "coerce::lenient_i64")] i64);

        let w: W = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(w.0, 5);
        let w: W = serde_json::from_value(json!("5")).unwrap();
        assert_eq!(w.0, 5);
        assert!(serde_json::from_value::<W>(json!("abc")).is_err());
        assert!(serde_json::from_value::<W>(json!(true)).is_err());
    }

    #[test]
    fn test_lenient_bool() {
        #[derive(Deserialize)]
        struct W(#[serde(deserialize_with = "coerce::lenient_bool")] bool);

        let w: W = serde_json::from_value(json!(true)).unwrap();
        assert!(w.0);
        let w: W = serde_json::from_value(json!("0")).unwrap();
        assert!(!w.0);
        assert!(serde_json::from_value::<W>(json!("yep")).is_err());
    }
}
