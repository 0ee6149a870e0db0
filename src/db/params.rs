//! Parameter mapping for stored-procedure calls.
//!
//! Procedures take named input values. The gateway collects them in a
//! `ParamMap`, which keeps insertion order (routine signatures are
//! positional underneath) and guarantees each name appears once: inserting
//! an existing name replaces the previous value, the same overwrite
//! semantics the merged request candidate uses.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres};

/// A scalar value bound to a routine parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Structured value bound as JSON
    Json(JsonValue),
}

impl ProcParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type name of this parameter for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }

    /// Map a JSON value onto the closest parameter scalar.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

/// An ordered mapping of unique parameter names to values.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    entries: Vec<(String, ProcParam)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named parameter. An existing name is replaced in place, so
    /// every name is bound exactly once at execution time.
    pub fn insert(&mut self, name: impl Into<String>, value: ProcParam) -> &mut Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: ProcParam) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ProcParam> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProcParam)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Build a mapping from a JSON object, e.g. validated request params.
    /// Non-object values produce an empty mapping.
    pub fn from_object(value: &JsonValue) -> Self {
        let mut map = Self::new();
        if let JsonValue::Object(obj) = value {
            for (name, value) in obj {
                map.insert(name.clone(), ProcParam::from_json(value));
            }
        }
        map
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_pg_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q ProcParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        ProcParam::Null => query.bind(None::<String>),
        ProcParam::Bool(v) => query.bind(*v),
        ProcParam::Int(v) => query.bind(*v),
        ProcParam::Float(v) => query.bind(*v),
        ProcParam::String(v) => query.bind(v.as_str()),
        ProcParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q ProcParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        ProcParam::Null => query.bind(None::<String>),
        ProcParam::Bool(v) => query.bind(*v),
        ProcParam::Int(v) => query.bind(*v),
        ProcParam::Float(v) => query.bind(*v),
        ProcParam::String(v) => query.bind(v.as_str()),
        ProcParam::Json(v) => query.bind(Json(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_types() {
        assert!(ProcParam::Null.is_null());
        assert!(!ProcParam::Bool(true).is_null());
        assert_eq!(ProcParam::Int(42).type_name(), "int");
        assert_eq!(ProcParam::Json(json!({"a": 1})).type_name(), "json");
    }

    #[test]
    fn test_param_from_json() {
        assert_eq!(ProcParam::from_json(&json!(null)), ProcParam::Null);
        assert_eq!(ProcParam::from_json(&json!(7)), ProcParam::Int(7));
        assert_eq!(ProcParam::from_json(&json!(1.5)), ProcParam::Float(1.5));
        assert_eq!(
            ProcParam::from_json(&json!("Ann")),
            ProcParam::String("Ann".to_string())
        );
        assert_eq!(
            ProcParam::from_json(&json!([1, 2])),
            ProcParam::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let map = ParamMap::new()
            .with("b", ProcParam::Int(2))
            .with("a", ProcParam::Int(1))
            .with("c", ProcParam::Int(3));
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_map_insert_replaces_existing_name() {
        let mut map = ParamMap::new();
        map.insert("id", ProcParam::Int(1));
        map.insert("name", ProcParam::String("x".to_string()));
        map.insert("id", ProcParam::Int(9));

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id"), Some(&ProcParam::Int(9)));
        // Replacement keeps the original position.
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_map_from_object() {
        let map = ParamMap::from_object(&json!({"id": 7, "name": "Ann"}));
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("id"), Some(&ProcParam::Int(7)));

        let empty = ParamMap::from_object(&json!("not an object"));
        assert!(empty.is_empty());
    }
}
