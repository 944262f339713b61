//! Authorizer configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! There is deliberately no default organization: callers always name one.
//!
//! ```toml
//! group_traversal = "direct"
//! fetch_timeout_ms = 2000
//!
//! [cache]
//! enabled = true
//! capacity = 1024
//!
//! [audit]
//! queue_capacity = 4096
//! batch_size = 256
//! ```

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// How far group membership is followed when collecting policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupTraversal {
    /// Only groups the principal is a direct member of
    #[default]
    Direct,
    /// Direct groups and all of their ancestors
    Inherited,
}

/// Grant cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            capacity: 1024,
        }
    }
}

/// Audit queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Bounded queue size; events beyond it are dropped
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
    /// Maximum records handed to the sink at once
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            queue_capacity: 4096,
            batch_size: 256,
        }
    }
}

/// Top-level authorizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AuthzConfig {
    pub group_traversal: GroupTraversal,
    /// Per grant-source read timeout
    #[validate(range(min = 1, max = 60000))]
    pub fetch_timeout_ms: u64,
    #[validate(nested)]
    pub cache: CacheConfig,
    #[validate(nested)]
    pub audit: AuditConfig,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        AuthzConfig {
            group_traversal: GroupTraversal::Direct,
            fetch_timeout_ms: 2000,
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl AuthzConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AuthzConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Run field validation, mapping failures into [`AuthzError::Config`]
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AuthzError::Config(e.to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
