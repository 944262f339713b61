//! Error types for authorization

use crate::store::GrantSource;
use thiserror::Error;

/// Authorization result type
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Authorization errors
///
/// Only [`AuthzError::InvalidRequest`], [`AuthzError::OrganizationMismatch`] and
/// [`AuthzError::Cancelled`] ever escape [`crate::Authorizer::authorize`]. The
/// storage and policy variants are absorbed by the engine and audited.
#[derive(Error, Debug)]
pub enum AuthzError {
    /// Malformed principal, action or resource
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request names a resource owned by a different organization
    #[error("Organization mismatch: request scoped to {expected}, resource belongs to {actual}")]
    OrganizationMismatch { expected: String, actual: String },

    /// Caller cancelled or timed out the check
    #[error("Authorization cancelled")]
    Cancelled,

    /// A grant source could not be read
    #[error("Grant source unavailable: {grant_source}: {reason}")]
    StorageUnavailable {
        grant_source: GrantSource,
        reason: String,
    },

    /// A stored policy document failed to parse or validate
    #[error("Malformed policy {policy_id}: {reason}")]
    MalformedPolicy { policy_id: String, reason: String },

    /// Policy document rejected before it was attached to a stored policy
    #[error("Invalid policy document: {0}")]
    InvalidPolicy(String),

    /// Wildcard pattern rejected at compile time
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration failed to load or validate
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Whether this error is the caller's fault (bad input) rather than ours
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            AuthzError::InvalidRequest(_) | AuthzError::OrganizationMismatch { .. }
        )
    }
}
