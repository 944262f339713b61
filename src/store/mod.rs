//! Read contracts the storage layer must expose
//!
//! Every read is strictly scoped by the principal's organization. Persistence
//! (schemas, CRUD) lives outside this crate; [`MemoryStore`] is an in-process
//! implementation for embedding and tests.

mod memory;

pub use memory::MemoryStore;

use crate::config::GroupTraversal;
use crate::error::Result;
use crate::model::{PrincipalRef, ResourcePermission, ResourceShare, StoredPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The three independent grant sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Policies,
    ResourcePermissions,
    ResourceShares,
}

impl GrantSource {
    pub const ALL: [GrantSource; 3] = [
        GrantSource::Policies,
        GrantSource::ResourcePermissions,
        GrantSource::ResourceShares,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GrantSource::Policies => "policies",
            GrantSource::ResourcePermissions => "resource_permissions",
            GrantSource::ResourceShares => "resource_shares",
        }
    }
}

impl fmt::Display for GrantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization-scoped reads of a principal's grants
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Policies attached to the principal directly, through its roles, and
    /// through the roles and attachments of its groups
    async fn principal_policies(
        &self,
        principal: &PrincipalRef,
        traversal: GroupTraversal,
    ) -> Result<Vec<StoredPolicy>>;

    /// Resource permission rows naming the principal
    async fn principal_resource_permissions(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourcePermission>>;

    /// Resource share rows naming the principal
    async fn principal_resource_shares(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourceShare>>;
}

#[async_trait]
impl<T: GrantStore + ?Sized> GrantStore for Arc<T> {
    async fn principal_policies(
        &self,
        principal: &PrincipalRef,
        traversal: GroupTraversal,
    ) -> Result<Vec<StoredPolicy>> {
        (**self).principal_policies(principal, traversal).await
    }

    async fn principal_resource_permissions(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourcePermission>> {
        (**self).principal_resource_permissions(principal).await
    }

    async fn principal_resource_shares(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourceShare>> {
        (**self).principal_resource_shares(principal).await
    }
}
