//! LRU cache for prepared grants
//!
//! Read-through cache keyed by (organization, principal type, principal id).
//! Entries never expire on their own: whoever mutates grants must invalidate
//! the affected principal or organization. Snapshots with a failed source are
//! never stored.
//!
//! Every invalidation bumps a generation counter. A fetch reads the counter
//! before going to the store and hands it back to [`GrantCache::put`], which
//! refuses the write if the counter moved in between.

use crate::aggregator::PreparedGrants;
use crate::model::{OrganizationId, PrincipalId, PrincipalRef, PrincipalType};
use ahash::AHashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key for prepared grants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    organization_id: OrganizationId,
    principal_type: PrincipalType,
    principal_id: PrincipalId,
}

impl From<&PrincipalRef> for CacheKey {
    fn from(principal: &PrincipalRef) -> Self {
        CacheKey {
            organization_id: principal.organization_id.clone(),
            principal_type: principal.principal_type,
            principal_id: principal.id.clone(),
        }
    }
}

struct CacheState {
    entries: LruCache<CacheKey, Arc<PreparedGrants>>,
    /// Bumped by `clear`
    epoch: u64,
    /// Bumped by invalidations inside one organization
    organizations: AHashMap<OrganizationId, u64>,
}

impl CacheState {
    fn generation(&self, organization_id: &OrganizationId) -> u64 {
        // Both terms only grow, so any bump changes the sum
        self.epoch + self.organizations.get(organization_id).copied().unwrap_or(0)
    }

    fn bump(&mut self, organization_id: &OrganizationId) {
        *self.organizations.entry(organization_id.clone()).or_insert(0) += 1;
    }
}

/// LRU cache for prepared grants
pub struct GrantCache {
    state: Mutex<CacheState>,
}

impl GrantCache {
    /// Create a new grant cache with given capacity (zero is treated as one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        GrantCache {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                epoch: 0,
                organizations: AHashMap::new(),
            }),
        }
    }

    /// Get cached grants
    pub fn get(&self, principal: &PrincipalRef) -> Option<Arc<PreparedGrants>> {
        self.state
            .lock()
            .entries
            .get(&CacheKey::from(principal))
            .cloned()
    }

    /// Current generation for a principal; read it before fetching grants
    pub fn generation(&self, principal: &PrincipalRef) -> u64 {
        self.state.lock().generation(&principal.organization_id)
    }

    /// Store grants fetched at `generation`
    ///
    /// Incomplete snapshots are ignored, and so is a snapshot whose
    /// organization was invalidated after the fetch began. Returns whether
    /// the entry was stored.
    pub fn put(&self, principal: &PrincipalRef, grants: Arc<PreparedGrants>, generation: u64) -> bool {
        if !grants.is_complete() {
            return false;
        }
        let mut state = self.state.lock();
        if state.generation(&principal.organization_id) != generation {
            return false;
        }
        state.entries.put(CacheKey::from(principal), grants);
        true
    }

    /// Drop one principal's entry
    pub fn invalidate_principal(&self, principal: &PrincipalRef) {
        let mut state = self.state.lock();
        state.bump(&principal.organization_id);
        state.entries.pop(&CacheKey::from(principal));
    }

    /// Drop every entry of an organization
    pub fn invalidate_organization(&self, organization_id: &OrganizationId) {
        let mut state = self.state.lock();
        state.bump(organization_id);
        let stale: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, _)| &key.organization_id == organization_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            state.entries.pop(&key);
        }
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
