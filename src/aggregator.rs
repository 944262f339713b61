//! Principal grant aggregation
//!
//! Collects the three grant sources for one principal concurrently. Each
//! source fails on its own: a failed or timed-out read is logged, recorded in
//! the snapshot and treated as empty, so the others still count.
//!
//! Rows belonging to another organization, or naming another principal, are
//! discarded here even if the store returned them.

use crate::config::GroupTraversal;
use crate::error::{AuthzError, Result};
use crate::iam::{Pattern, PolicyDocument, PolicyEvaluator};
use crate::model::{OrganizationScoped, PrincipalRef, ResourcePermission, ResourceShare, StoredPolicy};
use crate::store::{GrantSource, GrantStore};
use ahash::AHashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// A grant source that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: GrantSource,
    pub reason: String,
}

/// Rows dropped because they crossed a tenant or principal boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedRows {
    pub source: GrantSource,
    pub count: usize,
}

/// Raw grants for one principal
#[derive(Debug, Clone, Default)]
pub struct GrantSnapshot {
    pub policies: Vec<StoredPolicy>,
    pub resource_permissions: Vec<ResourcePermission>,
    pub resource_shares: Vec<ResourceShare>,
    pub failures: Vec<SourceFailure>,
    pub discarded: Vec<DiscardedRows>,
}

impl GrantSnapshot {
    /// Every source was read successfully
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
            && self.resource_permissions.is_empty()
            && self.resource_shares.is_empty()
    }

    /// Compile policy documents and permission patterns once
    pub fn prepare(self, evaluator: &PolicyEvaluator) -> PreparedGrants {
        let policies = self
            .policies
            .into_iter()
            .map(|policy| {
                let document = evaluator.parse(&policy.document).map_err(|e| e.to_string());
                PreparedPolicy {
                    id: policy.id,
                    document,
                }
            })
            .collect();

        let resource_permissions = self
            .resource_permissions
            .into_iter()
            .map(|permission| {
                let pattern = Pattern::compile(&permission.permission).map_err(|e| e.to_string());
                PreparedPermission {
                    permission,
                    pattern,
                }
            })
            .collect();

        PreparedGrants {
            policies,
            resource_permissions,
            resource_shares: self.resource_shares,
            failures: self.failures,
            discarded: self.discarded,
        }
    }
}

/// A policy whose document has been parsed, or the reason it could not be
#[derive(Debug, Clone)]
pub struct PreparedPolicy {
    pub id: String,
    pub document: std::result::Result<PolicyDocument, String>,
}

/// A resource permission with its action pattern compiled
#[derive(Debug, Clone)]
pub struct PreparedPermission {
    pub permission: ResourcePermission,
    pub pattern: std::result::Result<Pattern, String>,
}

/// Grants ready for evaluation; what the cache stores
#[derive(Debug, Clone, Default)]
pub struct PreparedGrants {
    pub policies: Vec<PreparedPolicy>,
    pub resource_permissions: Vec<PreparedPermission>,
    pub resource_shares: Vec<ResourceShare>,
    pub failures: Vec<SourceFailure>,
    pub discarded: Vec<DiscardedRows>,
}

impl PreparedGrants {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Collects grants from a [`GrantStore`]
#[derive(Clone)]
pub struct GrantAggregator {
    store: Arc<dyn GrantStore>,
    traversal: GroupTraversal,
    fetch_timeout: Duration,
}

impl GrantAggregator {
    pub fn new(store: Arc<dyn GrantStore>, traversal: GroupTraversal, fetch_timeout: Duration) -> Self {
        GrantAggregator {
            store,
            traversal,
            fetch_timeout,
        }
    }

    pub fn traversal(&self) -> GroupTraversal {
        self.traversal
    }

    /// Fetch all three sources in parallel and wait for each to finish or fail
    pub async fn collect(&self, principal: &PrincipalRef) -> GrantSnapshot {
        let (policies, permissions, shares) = tokio::join!(
            self.fetch(
                GrantSource::Policies,
                self.store.principal_policies(principal, self.traversal)
            ),
            self.fetch(
                GrantSource::ResourcePermissions,
                self.store.principal_resource_permissions(principal)
            ),
            self.fetch(
                GrantSource::ResourceShares,
                self.store.principal_resource_shares(principal)
            ),
        );

        let mut snapshot = GrantSnapshot::default();

        if let Some(rows) = Self::accept(&mut snapshot, GrantSource::Policies, policies) {
            let rows = Self::scoped(&mut snapshot, GrantSource::Policies, principal, rows, |_| true);
            let mut seen = AHashSet::new();
            snapshot.policies = rows.into_iter().filter(|p| seen.insert(p.id.clone())).collect();
        }

        if let Some(rows) = Self::accept(&mut snapshot, GrantSource::ResourcePermissions, permissions) {
            snapshot.resource_permissions = Self::scoped(
                &mut snapshot,
                GrantSource::ResourcePermissions,
                principal,
                rows,
                |row: &ResourcePermission| principal.is(&row.principal_id, row.principal_type),
            );
        }

        if let Some(rows) = Self::accept(&mut snapshot, GrantSource::ResourceShares, shares) {
            snapshot.resource_shares = Self::scoped(
                &mut snapshot,
                GrantSource::ResourceShares,
                principal,
                rows,
                |row: &ResourceShare| principal.is(&row.principal_id, row.principal_type),
            );
        }

        debug!(
            principal = %principal,
            policies = snapshot.policies.len(),
            resource_permissions = snapshot.resource_permissions.len(),
            resource_shares = snapshot.resource_shares.len(),
            failed_sources = snapshot.failures.len(),
            "Collected grants"
        );

        snapshot
    }

    /// Run one read under the per-source timeout
    async fn fetch<T, F>(&self, source: GrantSource, read: F) -> Result<Vec<T>>
    where
        F: Future<Output = Result<Vec<T>>>,
    {
        match tokio::time::timeout(self.fetch_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(AuthzError::StorageUnavailable {
                grant_source: source,
                reason: format!("timed out after {:?}", self.fetch_timeout),
            }),
        }
    }

    /// Record a failed read; pass successful rows through
    fn accept<T>(snapshot: &mut GrantSnapshot, source: GrantSource, result: Result<Vec<T>>) -> Option<Vec<T>> {
        match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(source = %source, error = %e, "Grant source unavailable, continuing without it");
                snapshot.failures.push(SourceFailure {
                    source,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Keep rows from the principal's organization that also pass `names_principal`
    fn scoped<T, P>(
        snapshot: &mut GrantSnapshot,
        source: GrantSource,
        principal: &PrincipalRef,
        rows: Vec<T>,
        names_principal: P,
    ) -> Vec<T>
    where
        T: OrganizationScoped,
        P: Fn(&T) -> bool,
    {
        let total = rows.len();
        let kept: Vec<T> = rows
            .into_iter()
            .filter(|row| row.organization_id() == &principal.organization_id && names_principal(row))
            .collect();

        let dropped = total - kept.len();
        if dropped > 0 {
            error!(
                source = %source,
                principal = %principal,
                dropped,
                "Store returned grants outside the principal's scope; discarded"
            );
            snapshot.discarded.push(DiscardedRows {
                source,
                count: dropped,
            });
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::{AccessLevel, Effect};
    use crate::model::{OrganizationId, PrincipalType};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn alice() -> PrincipalRef {
        PrincipalRef::user("org-a", "alice")
    }

    fn share(id: &str, org: &str, principal: &str) -> ResourceShare {
        ResourceShare {
            id: id.to_string(),
            organization_id: OrganizationId::new(org),
            principal_id: principal.into(),
            principal_type: PrincipalType::User,
            resource_id: "blog/1".to_string(),
            access_level: AccessLevel::Viewer,
        }
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_policy(StoredPolicy::new("p1", "org-a", "{}"));
        store.attach_policy(&alice(), "p1");
        store.add_resource_permission(ResourcePermission {
            id: "rp1".to_string(),
            organization_id: OrganizationId::new("org-a"),
            principal_id: "alice".into(),
            principal_type: PrincipalType::User,
            resource_id: "blog/1".to_string(),
            permission: "blog:*".to_string(),
            effect: Effect::Allow,
        });
        store.add_resource_share(share("s1", "org-a", "alice"));
        store
    }

    fn aggregator(store: Arc<dyn GrantStore>, timeout: Duration) -> GrantAggregator {
        GrantAggregator::new(store, GroupTraversal::Direct, timeout)
    }

    #[tokio::test]
    async fn test_collects_all_sources() {
        let agg = aggregator(seeded_store(), Duration::from_secs(1));
        let snapshot = agg.collect(&alice()).await;

        assert!(snapshot.is_complete());
        assert_eq!(snapshot.policies.len(), 1);
        assert_eq!(snapshot.resource_permissions.len(), 1);
        assert_eq!(snapshot.resource_shares.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_source_degrades_gracefully() {
        let store = seeded_store();
        store.fail_source(GrantSource::ResourceShares, "replica down");
        let agg = aggregator(store, Duration::from_secs(1));

        let snapshot = agg.collect(&alice()).await;
        assert!(!snapshot.is_complete());
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].source, GrantSource::ResourceShares);
        assert!(snapshot.resource_shares.is_empty());
        assert_eq!(snapshot.policies.len(), 1);
        assert_eq!(snapshot.resource_permissions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out_independently() {
        let store = seeded_store();
        store.delay_source(GrantSource::Policies, Duration::from_secs(30));
        let agg = aggregator(store, Duration::from_millis(200));

        let snapshot = agg.collect(&alice()).await;
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].source, GrantSource::Policies);
        assert!(snapshot.failures[0].reason.contains("timed out"));
        assert_eq!(snapshot.resource_shares.len(), 1);
    }

    /// Store that ignores scoping entirely
    struct LeakyStore;

    #[async_trait]
    impl GrantStore for LeakyStore {
        async fn principal_policies(
            &self,
            _principal: &PrincipalRef,
            _traversal: GroupTraversal,
        ) -> Result<Vec<StoredPolicy>> {
            Ok(vec![
                StoredPolicy::new("mine", "org-a", "{}"),
                StoredPolicy::new("theirs", "org-b", "{}"),
                StoredPolicy::new("mine", "org-a", "{}"),
            ])
        }

        async fn principal_resource_permissions(
            &self,
            _principal: &PrincipalRef,
        ) -> Result<Vec<ResourcePermission>> {
            Ok(Vec::new())
        }

        async fn principal_resource_shares(
            &self,
            _principal: &PrincipalRef,
        ) -> Result<Vec<ResourceShare>> {
            Ok(vec![
                share("s1", "org-a", "alice"),
                share("s2", "org-b", "alice"),
                share("s3", "org-a", "mallory"),
            ])
        }
    }

    #[tokio::test]
    async fn test_foreign_rows_are_discarded() {
        let agg = aggregator(Arc::new(LeakyStore), Duration::from_secs(1));
        let snapshot = agg.collect(&alice()).await;

        let policy_ids: Vec<&str> = snapshot.policies.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(policy_ids, vec!["mine"]);
        assert_eq!(snapshot.resource_shares.len(), 1);
        assert_eq!(snapshot.resource_shares[0].id, "s1");
        assert_eq!(
            snapshot.discarded,
            vec![
                DiscardedRows {
                    source: GrantSource::Policies,
                    count: 1
                },
                DiscardedRows {
                    source: GrantSource::ResourceShares,
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_prepare_keeps_malformed_policies_as_errors() {
        let snapshot = GrantSnapshot {
            policies: vec![
                StoredPolicy::new("bad", "org-a", "not json"),
                StoredPolicy::new(
                    "good",
                    "org-a",
                    r#"{"Version":"1","Statement":[{"Effect":"Allow","Action":"a:b","Resource":"*"}]}"#,
                ),
            ],
            ..GrantSnapshot::default()
        };

        let prepared = snapshot.prepare(&PolicyEvaluator::default());
        assert!(prepared.policies[0].document.is_err());
        assert!(prepared.policies[1].document.is_ok());
        assert!(prepared.is_complete());
    }
}
