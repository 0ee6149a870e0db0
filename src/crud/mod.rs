//! Validation & permission pipeline.
//!
//! A controller declares which {securable, operation} pairs it may exercise,
//! then feeds each inbound request through `validate`: merge the raw input
//! sources into one candidate, check the declared permissions, parse the
//! candidate against a caller-supplied shape, and attach the resolved
//! credential. The result is a typed, credentialed request, or an
//! `ApiError` the caller must branch on before any execution is attempted.

pub mod credential;
pub mod shape;

use crate::error::{ApiError, ApiResult};
use credential::{Credential, CredentialResolver, PlaceholderResolver};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use shape::Shape;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Raw request input as handed over by the routing framework.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub body: JsonValue,
}

impl RawRequest {
    pub fn new() -> Self {
        Self {
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            body: JsonValue::Null,
        }
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }
}

/// Merge path, query, and body input into one candidate object.
///
/// Precedence on key collision, highest to lowest: body > query > path.
/// Later merges overwrite earlier ones; callers rely on the body overriding
/// route parameters. A non-object body contributes nothing.
pub fn merge_candidate(request: &RawRequest) -> JsonValue {
    let mut candidate = JsonMap::new();
    for (key, value) in &request.path_params {
        candidate.insert(key.clone(), JsonValue::String(value.clone()));
    }
    for (key, value) in &request.query_params {
        candidate.insert(key.clone(), JsonValue::String(value.clone()));
    }
    if let JsonValue::Object(body) = &request.body {
        for (key, value) in body {
            candidate.insert(key.clone(), value.clone());
        }
    }
    JsonValue::Object(candidate)
}

/// The kind of operation a request intends against a securable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// One {securable resource, operation kind} pair a controller may exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudPermission {
    pub securable: String,
    pub operation: Operation,
}

impl CrudPermission {
    pub fn new(securable: impl Into<String>, operation: Operation) -> Self {
        Self {
            securable: securable.into(),
            operation,
        }
    }
}

/// The pipeline's output: a resolved credential plus typed parameters.
/// Constructed per request and discarded when the request completes.
#[derive(Debug, Clone)]
pub struct ValidatedRequest<T> {
    pub credential: Credential,
    pub params: T,
}

/// Validates inbound requests against declared permissions and a shape.
pub struct CrudController {
    permissions: Vec<CrudPermission>,
    resolver: Arc<dyn CredentialResolver>,
}

impl CrudController {
    /// Create a controller with the placeholder credential resolver.
    pub fn new(permissions: Vec<CrudPermission>) -> Self {
        Self::with_resolver(permissions, Arc::new(PlaceholderResolver))
    }

    /// Create a controller with a custom credential resolver.
    pub fn with_resolver(
        permissions: Vec<CrudPermission>,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            permissions,
            resolver,
        }
    }

    pub async fn create<S: Shape>(
        &self,
        request: &RawRequest,
        shape: &S,
    ) -> ApiResult<ValidatedRequest<S::Output>> {
        self.validate(request, shape, Operation::Create).await
    }

    pub async fn read<S: Shape>(
        &self,
        request: &RawRequest,
        shape: &S,
    ) -> ApiResult<ValidatedRequest<S::Output>> {
        self.validate(request, shape, Operation::Read).await
    }

    pub async fn update<S: Shape>(
        &self,
        request: &RawRequest,
        shape: &S,
    ) -> ApiResult<ValidatedRequest<S::Output>> {
        self.validate(request, shape, Operation::Update).await
    }

    pub async fn delete<S: Shape>(
        &self,
        request: &RawRequest,
        shape: &S,
    ) -> ApiResult<ValidatedRequest<S::Output>> {
        self.validate(request, shape, Operation::Delete).await
    }

    /// Whether this controller declares the exact {securable, operation}
    /// pair.
    pub fn allows(&self, securable: &str, operation: Operation) -> bool {
        self.permissions
            .iter()
            .any(|p| p.securable == securable && p.operation == operation)
    }

    /// Run the pipeline for one request.
    ///
    /// Failures come back as values, never panics: the caller must handle
    /// the error path explicitly before reaching for the executor.
    async fn validate<S: Shape>(
        &self,
        request: &RawRequest,
        shape: &S,
        operation: Operation,
    ) -> ApiResult<ValidatedRequest<S::Output>> {
        if !self.permissions.iter().any(|p| p.operation == operation) {
            return Err(ApiError::permission_denied(
                operation.to_string(),
                "no declared permission covers this operation",
            ));
        }

        let candidate = merge_candidate(request);
        let params = match shape.parse(&candidate).await {
            Ok(params) => params,
            Err(errors) => {
                debug!(operation = %operation, errors = errors.len(), "Request rejected by shape");
                return Err(ApiError::validation(errors));
            }
        };

        let credential = self.resolver.resolve(request).await?;

        Ok(ValidatedRequest { credential, params })
    }
}
