//! Auth header injection.
//!
//! Token storage belongs to the embedding application. Transports only ask a
//! provider for the current token right before each request.

use std::sync::Arc;

/// Source of the current auth token.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Header name plus the provider that fills it.
#[derive(Clone)]
pub struct AuthHeader {
    name: String,
    provider: Arc<dyn TokenProvider>,
}

impl AuthHeader {
    pub fn new(name: impl Into<String>, provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    /// `(name, value)` to set on the request, if a non-empty token exists.
    pub fn header(&self) -> Option<(&str, String)> {
        self.provider
            .token()
            .filter(|token| !token.is_empty())
            .map(|token| (self.name.as_str(), token))
    }
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token itself.
        f.debug_struct("AuthHeader").field("name", &self.name).finish()
    }
}
