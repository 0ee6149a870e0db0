//! Credential resolution seam.
//!
//! The pipeline attaches a resolved credential to every validated request.
//! Resolution is behind an object-safe trait so a real authenticator can be
//! substituted without changing the execution contract. Until one exists,
//! [`PlaceholderResolver`] supplies fixed identifiers.

use crate::crud::RawRequest;
use crate::error::ApiResult;
use async_trait::async_trait;
use serde::Serialize;

/// The identity a validated request executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub account_id: i64,
    pub user_id: i64,
}

/// Resolve the credential for an inbound request.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, request: &RawRequest) -> ApiResult<Credential>;
}

/// Fixed credential pending a real authentication collaborator.
#[derive(Debug, Default)]
pub struct PlaceholderResolver;

#[async_trait]
impl CredentialResolver for PlaceholderResolver {
    async fn resolve(&self, _request: &RawRequest) -> ApiResult<Credential> {
        Ok(Credential {
            account_id: 1,
            user_id: 1,
        })
    }
}
