//! Bearer-credential authentication.

use crate::opamp::Principal;
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Credential resolution failure.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing bearer credential")]
    MissingCredential,
    /// The credential is not known.
    #[error("invalid bearer credential")]
    InvalidCredential,
    /// The credential store failed.
    #[error("credential store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

/// Resolves a bearer credential to the agent it was issued to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentAuthenticator: Send + Sync {
    /// Returns the principal the token belongs to.
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Authenticator backed by a fixed token table, as loaded from the
/// enrollment file.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that accepts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.insert(token, principal);
        self
    }

    /// Adds or replaces a credential.
    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    /// Number of known credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` when no credential is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AgentAuthenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}

/// Picks the credential from an `Authorization: Bearer` header, falling
/// back to a `token` query parameter.
#[must_use]
pub fn bearer_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
        })
        .or(query_token.map(str::trim))
        .filter(|token| !token.is_empty())
}
