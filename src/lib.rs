//! # iam-authz - Multi-Tenant Authorization Core
//!
//! `iam-authz` answers one question: may this principal perform this action on
//! this resource? It combines three independent grant sources:
//!
//! - **Policies** (PBAC): JSON documents with wildcard actions/resources and
//!   conditions over request context
//! - **Resource permissions**: per-resource allow/deny rows
//! - **Resource shares** (ReBAC): owner / editor / viewer relationships
//!
//! An explicit Deny anywhere wins, Allows are additive, and no applicable
//! Allow means Deny. Every grant is scoped to one organization; a grant from
//! another tenant never counts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iam_authz::{AuthorizationRequest, Authorizer, AuthzConfig, MemoryStore, PrincipalRef, Result};
//! use iam_authz::model::StoredPolicy;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let alice = PrincipalRef::user("org-a", "alice");
//!
//! store.insert_policy(StoredPolicy::new(
//!     "blog-readers",
//!     "org-a",
//!     r#"{"Version":"2012-10-17","Statement":[
//!         {"Effect":"Allow","Action":"blog:read","Resource":"blog/*"}]}"#,
//! ));
//! store.attach_policy(&alice, "blog-readers");
//!
//! let config = AuthzConfig::from_file("authz.toml")?;
//! let authorizer = Authorizer::new(store, &config)?;
//!
//! let request = AuthorizationRequest::new(alice, "blog:read", "blog/42");
//! let decision = authorizer.authorize(&request, &CancellationToken::new()).await?;
//! println!("{}", decision.public_message());
//! # Ok(())
//! # }
//! ```
//!
//! ## Auditing
//!
//! ```rust,no_run
//! use iam_authz::audit::{AuditLogger, TracingAuditSink};
//! use iam_authz::{Authorizer, AuthzConfig, MemoryStore};
//! use std::sync::Arc;
//!
//! # fn main() -> iam_authz::Result<()> {
//! let config = AuthzConfig::default();
//! let audit = Arc::new(AuditLogger::new(&config.audit));
//! audit.start(Arc::new(TracingAuditSink));
//!
//! let authorizer = Authorizer::new(Arc::new(MemoryStore::new()), &config)?
//!     .with_audit(Arc::clone(&audit));
//!
//! // ... serve requests ...
//!
//! audit.stop(); // drains whatever is still queued
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod audit;
pub mod cache;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod iam;
pub mod model;
pub mod store;

pub use crate::{
    config::{AuthzConfig, GroupTraversal},
    decision::{Decision, DecisionEffect, DecisionReason},
    engine::Authorizer,
    error::{AuthzError, Result},
    model::{
        AuthorizationRequest, OrganizationId, PrincipalId, PrincipalRef, PrincipalType,
        ResourceAction,
    },
    store::{GrantSource, GrantStore, MemoryStore},
};
