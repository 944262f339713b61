//! In-memory grant store
//!
//! Holds policies, roles, groups and resource grants per organization, and
//! supports injecting failures or latency per grant source.

use super::{GrantSource, GrantStore};
use crate::config::GroupTraversal;
use crate::error::{AuthzError, Result};
use crate::model::{OrganizationId, PrincipalRef, ResourcePermission, ResourceShare, StoredPolicy};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;

type ScopedKey = (OrganizationId, String);

#[derive(Debug, Clone)]
enum Fault {
    Fail(String),
    Delay(Duration),
}

#[derive(Debug, Default)]
struct Role {
    policy_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct Group {
    parent: Option<String>,
    role_ids: Vec<String>,
    policy_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    policies: AHashMap<ScopedKey, StoredPolicy>,
    roles: AHashMap<ScopedKey, Role>,
    groups: AHashMap<ScopedKey, Group>,
    principal_roles: AHashMap<PrincipalRef, Vec<String>>,
    principal_groups: AHashMap<PrincipalRef, Vec<String>>,
    principal_policies: AHashMap<PrincipalRef, Vec<String>>,
    resource_permissions: Vec<ResourcePermission>,
    resource_shares: Vec<ResourceShare>,
    faults: AHashMap<GrantSource, Fault>,
}

impl Inner {
    /// Groups to read, in discovery order
    fn groups_for(&self, principal: &PrincipalRef, traversal: GroupTraversal) -> Vec<String> {
        let org = &principal.organization_id;
        let direct = self
            .principal_groups
            .get(principal)
            .cloned()
            .unwrap_or_default();

        if traversal == GroupTraversal::Direct {
            return direct;
        }

        let mut seen: AHashSet<String> = AHashSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<String> = direct.into();

        while let Some(group_id) = queue.pop_front() {
            // Visited set keeps parent cycles from looping forever
            if !seen.insert(group_id.clone()) {
                continue;
            }
            if let Some(parent) = self
                .groups
                .get(&(org.clone(), group_id.clone()))
                .and_then(|g| g.parent.clone())
            {
                queue.push_back(parent);
            }
            ordered.push(group_id);
        }

        ordered
    }

    fn role_policy_ids<'a>(&'a self, org: &OrganizationId, role_id: &str) -> &'a [String] {
        self.roles
            .get(&(org.clone(), role_id.to_string()))
            .map(|role| role.policy_ids.as_slice())
            .unwrap_or(&[])
    }

    fn policies_for(&self, principal: &PrincipalRef, traversal: GroupTraversal) -> Vec<StoredPolicy> {
        let org = &principal.organization_id;
        let mut policy_ids: Vec<String> = Vec::new();

        if let Some(ids) = self.principal_policies.get(principal) {
            policy_ids.extend(ids.iter().cloned());
        }

        for role_id in self.principal_roles.get(principal).into_iter().flatten() {
            policy_ids.extend(self.role_policy_ids(org, role_id).iter().cloned());
        }

        for group_id in self.groups_for(principal, traversal) {
            let Some(group) = self.groups.get(&(org.clone(), group_id)) else {
                continue;
            };
            policy_ids.extend(group.policy_ids.iter().cloned());
            for role_id in &group.role_ids {
                policy_ids.extend(self.role_policy_ids(org, role_id).iter().cloned());
            }
        }

        let mut seen = AHashSet::new();
        policy_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .filter_map(|id| self.policies.get(&(org.clone(), id)).cloned())
            .collect()
    }
}

/// Grant store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a policy
    pub fn insert_policy(&self, policy: StoredPolicy) {
        let key = (policy.organization_id.clone(), policy.id.clone());
        self.inner.write().policies.insert(key, policy);
    }

    pub fn remove_policy(&self, organization_id: &OrganizationId, policy_id: &str) {
        self.inner
            .write()
            .policies
            .remove(&(organization_id.clone(), policy_id.to_string()));
    }

    /// Create a role bundling the given policies
    pub fn create_role(&self, organization_id: &OrganizationId, role_id: &str, policy_ids: &[&str]) {
        let role = Role {
            policy_ids: policy_ids.iter().map(|id| id.to_string()).collect(),
        };
        self.inner
            .write()
            .roles
            .insert((organization_id.clone(), role_id.to_string()), role);
    }

    /// Create a group, optionally nested under a parent group
    pub fn create_group(&self, organization_id: &OrganizationId, group_id: &str, parent: Option<&str>) {
        let group = Group {
            parent: parent.map(str::to_string),
            ..Group::default()
        };
        self.inner
            .write()
            .groups
            .insert((organization_id.clone(), group_id.to_string()), group);
    }

    pub fn assign_role_to_group(&self, organization_id: &OrganizationId, group_id: &str, role_id: &str) {
        let mut inner = self.inner.write();
        if let Some(group) = inner
            .groups
            .get_mut(&(organization_id.clone(), group_id.to_string()))
        {
            group.role_ids.push(role_id.to_string());
        }
    }

    pub fn attach_policy_to_group(&self, organization_id: &OrganizationId, group_id: &str, policy_id: &str) {
        let mut inner = self.inner.write();
        if let Some(group) = inner
            .groups
            .get_mut(&(organization_id.clone(), group_id.to_string()))
        {
            group.policy_ids.push(policy_id.to_string());
        }
    }

    pub fn assign_role(&self, principal: &PrincipalRef, role_id: &str) {
        self.inner
            .write()
            .principal_roles
            .entry(principal.clone())
            .or_default()
            .push(role_id.to_string());
    }

    pub fn add_to_group(&self, principal: &PrincipalRef, group_id: &str) {
        self.inner
            .write()
            .principal_groups
            .entry(principal.clone())
            .or_default()
            .push(group_id.to_string());
    }

    /// Attach a policy directly to a principal
    pub fn attach_policy(&self, principal: &PrincipalRef, policy_id: &str) {
        self.inner
            .write()
            .principal_policies
            .entry(principal.clone())
            .or_default()
            .push(policy_id.to_string());
    }

    pub fn add_resource_permission(&self, permission: ResourcePermission) {
        self.inner.write().resource_permissions.push(permission);
    }

    pub fn add_resource_share(&self, share: ResourceShare) {
        self.inner.write().resource_shares.push(share);
    }

    pub fn remove_resource_share(&self, share_id: &str) {
        self.inner
            .write()
            .resource_shares
            .retain(|share| share.id != share_id);
    }

    /// Make every read of `source` fail until [`MemoryStore::clear_faults`]
    pub fn fail_source(&self, source: GrantSource, reason: impl Into<String>) {
        self.inner
            .write()
            .faults
            .insert(source, Fault::Fail(reason.into()));
    }

    /// Delay every read of `source`
    pub fn delay_source(&self, source: GrantSource, delay: Duration) {
        self.inner.write().faults.insert(source, Fault::Delay(delay));
    }

    pub fn clear_faults(&self) {
        self.inner.write().faults.clear();
    }

    /// Apply the injected fault for a source; the lock is never held across the sleep
    async fn apply_fault(&self, source: GrantSource) -> Result<()> {
        let fault = self.inner.read().faults.get(&source).cloned();
        match fault {
            Some(Fault::Fail(reason)) => Err(AuthzError::StorageUnavailable {
                grant_source: source,
                reason,
            }),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn principal_policies(
        &self,
        principal: &PrincipalRef,
        traversal: GroupTraversal,
    ) -> Result<Vec<StoredPolicy>> {
        self.apply_fault(GrantSource::Policies).await?;
        Ok(self.inner.read().policies_for(principal, traversal))
    }

    async fn principal_resource_permissions(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourcePermission>> {
        self.apply_fault(GrantSource::ResourcePermissions).await?;
        Ok(self
            .inner
            .read()
            .resource_permissions
            .iter()
            .filter(|row| {
                row.organization_id == principal.organization_id
                    && principal.is(&row.principal_id, row.principal_type)
            })
            .cloned()
            .collect())
    }

    async fn principal_resource_shares(
        &self,
        principal: &PrincipalRef,
    ) -> Result<Vec<ResourceShare>> {
        self.apply_fault(GrantSource::ResourceShares).await?;
        Ok(self
            .inner
            .read()
            .resource_shares
            .iter()
            .filter(|row| {
                row.organization_id == principal.organization_id
                    && principal.is(&row.principal_id, row.principal_type)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::AccessLevel;
    use crate::model::PrincipalType;

    fn org(id: &str) -> OrganizationId {
        OrganizationId::new(id)
    }

    fn policy(id: &str, org_id: &str) -> StoredPolicy {
        StoredPolicy::new(id, org_id, "{}")
    }

    fn ids(policies: &[StoredPolicy]) -> Vec<&str> {
        let mut ids: Vec<&str> = policies.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids
    }

    fn seeded() -> (MemoryStore, PrincipalRef) {
        let store = MemoryStore::new();
        let a = org("org-a");
        let alice = PrincipalRef::user("org-a", "alice");

        for id in ["direct", "role-p", "team-p", "team-role-p", "dept-p"] {
            store.insert_policy(policy(id, "org-a"));
        }
        store.attach_policy(&alice, "direct");
        store.create_role(&a, "writer", &["role-p"]);
        store.create_role(&a, "team-role", &["team-role-p"]);
        store.assign_role(&alice, "writer");

        store.create_group(&a, "dept", None);
        store.create_group(&a, "team", Some("dept"));
        store.attach_policy_to_group(&a, "team", "team-p");
        store.assign_role_to_group(&a, "team", "team-role");
        store.attach_policy_to_group(&a, "dept", "dept-p");
        store.add_to_group(&alice, "team");

        (store, alice)
    }

    #[tokio::test]
    async fn test_direct_group_membership_only() {
        let (store, alice) = seeded();
        let policies = store
            .principal_policies(&alice, GroupTraversal::Direct)
            .await
            .unwrap();
        assert_eq!(ids(&policies), vec!["direct", "role-p", "team-p", "team-role-p"]);
    }

    #[tokio::test]
    async fn test_inherited_group_membership() {
        let (store, alice) = seeded();
        let policies = store
            .principal_policies(&alice, GroupTraversal::Inherited)
            .await
            .unwrap();
        assert_eq!(
            ids(&policies),
            vec!["dept-p", "direct", "role-p", "team-p", "team-role-p"]
        );
    }

    #[tokio::test]
    async fn test_group_cycle_terminates() {
        let store = MemoryStore::new();
        let a = org("org-a");
        let bob = PrincipalRef::user("org-a", "bob");
        store.insert_policy(policy("p1", "org-a"));
        store.create_group(&a, "g1", Some("g2"));
        store.create_group(&a, "g2", Some("g1"));
        store.attach_policy_to_group(&a, "g2", "p1");
        store.add_to_group(&bob, "g1");

        let policies = store
            .principal_policies(&bob, GroupTraversal::Inherited)
            .await
            .unwrap();
        assert_eq!(ids(&policies), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_policies_are_deduplicated() {
        let store = MemoryStore::new();
        let a = org("org-a");
        let carol = PrincipalRef::user("org-a", "carol");
        store.insert_policy(policy("shared", "org-a"));
        store.create_role(&a, "r1", &["shared"]);
        store.create_role(&a, "r2", &["shared"]);
        store.assign_role(&carol, "r1");
        store.assign_role(&carol, "r2");
        store.attach_policy(&carol, "shared");

        let policies = store
            .principal_policies(&carol, GroupTraversal::Direct)
            .await
            .unwrap();
        assert_eq!(policies.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_are_organization_scoped() {
        let store = MemoryStore::new();
        let alice_a = PrincipalRef::user("org-a", "alice");
        let alice_b = PrincipalRef::user("org-b", "alice");

        store.insert_policy(policy("p", "org-b"));
        store.attach_policy(&alice_b, "p");
        // A dangling attachment in org-a naming org-b's policy id resolves to nothing
        store.attach_policy(&alice_a, "p");
        store.add_resource_share(ResourceShare {
            id: "s1".to_string(),
            organization_id: org("org-b"),
            principal_id: "alice".into(),
            principal_type: PrincipalType::User,
            resource_id: "blog/1".to_string(),
            access_level: AccessLevel::Owner,
        });

        assert!(store
            .principal_policies(&alice_a, GroupTraversal::Direct)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .principal_resource_shares(&alice_a)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.principal_resource_shares(&alice_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_principal_type_must_match() {
        let store = MemoryStore::new();
        store.add_resource_share(ResourceShare {
            id: "s1".to_string(),
            organization_id: org("org-a"),
            principal_id: "ci".into(),
            principal_type: PrincipalType::ServiceAccount,
            resource_id: "repo/1".to_string(),
            access_level: AccessLevel::Viewer,
        });

        let as_user = PrincipalRef::user("org-a", "ci");
        let as_service = PrincipalRef::service_account("org-a", "ci");
        assert!(store.principal_resource_shares(&as_user).await.unwrap().is_empty());
        assert_eq!(store.principal_resource_shares(&as_service).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (store, alice) = seeded();
        store.fail_source(GrantSource::ResourceShares, "connection refused");

        let err = store.principal_resource_shares(&alice).await.unwrap_err();
        assert!(matches!(
            err,
            AuthzError::StorageUnavailable {
                grant_source: GrantSource::ResourceShares,
                ..
            }
        ));
        assert!(store
            .principal_policies(&alice, GroupTraversal::Direct)
            .await
            .is_ok());

        store.clear_faults();
        assert!(store.principal_resource_shares(&alice).await.is_ok());
    }
}
