//! Bearer token credentials.
//!
//! Token acquisition happens outside this crate (for example
//! `az account get-access-token`); credentials only hand out what they were given.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Fallback variable consulted for every scope.
pub const SHARED_TOKEN_VAR: &str = "AZURE_ACCESS_TOKEN";

/// Errors that can occur while obtaining a token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// No token is configured for the scope.
    #[error("no access token for {scope}; set {var} or {SHARED_TOKEN_VAR}")]
    Missing {
        /// Requested scope.
        scope: TokenScope,
        /// Scope-specific variable.
        var: &'static str,
    },
}

/// Audience a token is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    /// Log Analytics query API.
    LogAnalytics,
    /// Azure Resource Manager.
    Management,
}

impl TokenScope {
    /// Returns the OAuth scope string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogAnalytics => "https://api.loganalytics.io/.default",
            Self::Management => "https://management.azure.com/.default",
        }
    }

    /// Returns the scope-specific environment variable.
    #[must_use]
    pub fn env_var(self) -> &'static str {
        match self {
            Self::LogAnalytics => "MUST_GATHER_LOGS_TOKEN",
            Self::Management => "MUST_GATHER_MANAGEMENT_TOKEN",
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for token providers.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a bearer token for the scope.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is available.
    async fn token(&self, scope: TokenScope) -> Result<String, CredentialError>;
}

/// Credential holding fixed tokens.
#[derive(Clone, Default)]
pub struct StaticTokenCredential {
    tokens: HashMap<TokenScope, String>,
    fallback: Option<String>,
}

impl StaticTokenCredential {
    /// Creates a credential without tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads tokens from the environment.
    ///
    /// Each scope uses its own variable (`MUST_GATHER_LOGS_TOKEN`,
    /// `MUST_GATHER_MANAGEMENT_TOKEN`) and falls back to `AZURE_ACCESS_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut credential = Self {
            tokens: HashMap::new(),
            fallback: read(SHARED_TOKEN_VAR),
        };
        for scope in [TokenScope::LogAnalytics, TokenScope::Management] {
            if let Some(token) = read(scope.env_var()) {
                credential.tokens.insert(scope, token);
            }
        }
        credential
    }

    /// Sets the token of one scope.
    #[must_use]
    pub fn with_token(mut self, scope: TokenScope, token: impl Into<String>) -> Self {
        self.tokens.insert(scope, token.into());
        self
    }

    /// Sets the token used for scopes without their own.
    #[must_use]
    pub fn with_fallback(mut self, token: impl Into<String>) -> Self {
        self.fallback = Some(token.into());
        self
    }
}

impl std::fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("scopes", &self.tokens.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self, scope: TokenScope) -> Result<String, CredentialError> {
        self.tokens
            .get(&scope)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or(CredentialError::Missing {
                scope,
                var: scope.env_var(),
            })
    }
}
