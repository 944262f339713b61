//! Authorization decision engine with deny precedence
//!
//! Combines the three grant sources of a principal into one decision:
//! - An explicit Deny anywhere is final
//! - Allows from any source are additive
//! - No applicable Allow means Deny
//!
//! Storage failures and malformed policies never turn into errors. They shrink
//! the set of grants considered and leave an audit record behind.

use crate::aggregator::{GrantAggregator, GrantSnapshot, PreparedGrants};
use crate::audit::{AuditEvent, AuditLogger, AuditRecord};
use crate::cache::GrantCache;
use crate::config::AuthzConfig;
use crate::decision::{Decision, DecisionReason};
use crate::error::{AuthzError, Result};
use crate::iam::{Effect, Evaluation, OperatorRegistry, PolicyEvaluator, RequestContext};
use crate::model::{AuthorizationRequest, OrganizationId, PrincipalRef, ResourceAction};
use crate::store::GrantStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Multi-tenant authorizer
///
/// Safe to share between tasks; the only mutable state is the optional grant
/// cache and the audit queue, both internally synchronized.
///
/// # Examples
///
/// ```
/// use iam_authz::{Authorizer, AuthorizationRequest, AuthzConfig, MemoryStore, PrincipalRef};
/// use iam_authz::model::ResourceShare;
/// use iam_authz::iam::AccessLevel;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(MemoryStore::new());
/// let alice = PrincipalRef::user("org-a", "alice");
/// store.add_resource_share(ResourceShare::new("s1", &alice, "blog/123", AccessLevel::Editor));
///
/// let authorizer = Authorizer::new(store, &AuthzConfig::default()).unwrap();
/// let cancel = CancellationToken::new();
///
/// let update = AuthorizationRequest::new(alice.clone(), "blog:update", "blog/123");
/// assert!(authorizer.authorize(&update, &cancel).await.unwrap().is_allowed());
///
/// let delete = AuthorizationRequest::new(alice, "blog:delete", "blog/123");
/// assert!(!authorizer.authorize(&delete, &cancel).await.unwrap().is_allowed());
/// # }
/// ```
pub struct Authorizer {
    aggregator: GrantAggregator,
    evaluator: PolicyEvaluator,
    cache: Option<GrantCache>,
    audit: Option<Arc<AuditLogger>>,
}

impl Authorizer {
    /// Create an authorizer over a grant store
    ///
    /// The configuration is validated here; there are no implicit defaults
    /// beyond what `config` carries.
    pub fn new(store: Arc<dyn GrantStore>, config: &AuthzConfig) -> Result<Self> {
        config.check()?;

        let cache = config
            .cache
            .enabled
            .then(|| GrantCache::new(config.cache.capacity));

        Ok(Authorizer {
            aggregator: GrantAggregator::new(store, config.group_traversal, config.fetch_timeout()),
            evaluator: PolicyEvaluator::default(),
            cache,
            audit: None,
        })
    }

    /// Emit audit records through `logger`
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Compile policy conditions against a custom operator set
    pub fn with_operators(mut self, registry: OperatorRegistry) -> Self {
        self.evaluator = PolicyEvaluator::new(registry);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        self
    }

    /// Check a single (principal, action, resource) request
    ///
    /// Returns an error only for invalid requests and cancellation; a Deny is
    /// always an `Ok` decision.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        cancel: &CancellationToken,
    ) -> Result<Decision> {
        if let Err(e) = request.validate() {
            warn!(principal = %request.principal, error = %e, "Rejected authorization request");
            return Err(e);
        }

        let grants = self.grants(&request.principal, cancel).await?;
        let decision = decide(
            &grants,
            &self.evaluator,
            &request.action,
            &request.resource,
            &request.context,
        );
        self.record_decision(&request.principal, &request.action, &request.resource, &decision);

        Ok(decision)
    }

    /// Check many (action, resource) pairs for one principal with a single fetch
    ///
    /// Every pair is validated before anything is fetched; one invalid pair
    /// fails the whole batch. Decisions come back in input order.
    pub async fn authorize_batch(
        &self,
        principal: &PrincipalRef,
        checks: &[ResourceAction],
        context: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Decision>> {
        principal.validate()?;
        for check in checks {
            check.validate()?;
        }

        if checks.is_empty() {
            return Ok(Vec::new());
        }

        let grants = self.grants(principal, cancel).await?;

        Ok(checks
            .iter()
            .map(|check| {
                let decision = decide(&grants, &self.evaluator, &check.action, &check.resource, context);
                self.record_decision(principal, &check.action, &check.resource, &decision);
                decision
            })
            .collect())
    }

    /// Forget cached grants of one principal
    pub fn invalidate_principal(&self, principal: &PrincipalRef) {
        if let Some(cache) = &self.cache {
            cache.invalidate_principal(principal);
        }
    }

    /// Forget cached grants of every principal in an organization
    pub fn invalidate_organization(&self, organization_id: &OrganizationId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_organization(organization_id);
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Prepared grants for a principal, from the cache or the store
    async fn grants(
        &self,
        principal: &PrincipalRef,
        cancel: &CancellationToken,
    ) -> Result<Arc<PreparedGrants>> {
        if cancel.is_cancelled() {
            return Err(AuthzError::Cancelled);
        }

        if let Some(grants) = self.cache.as_ref().and_then(|cache| cache.get(principal)) {
            debug!(principal = %principal, "Grant cache hit");
            return Ok(grants);
        }
        let generation = self.cache.as_ref().map(|cache| cache.generation(principal));

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(principal = %principal, "Authorization cancelled during grant fetch");
                return Err(AuthzError::Cancelled);
            }
            snapshot = self.aggregator.collect(principal) => snapshot,
        };

        self.record_snapshot(principal, &snapshot);
        let grants = Arc::new(snapshot.prepare(&self.evaluator));
        self.record_prepared(principal, &grants);

        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            if !cache.put(principal, Arc::clone(&grants), generation) && grants.is_complete() {
                debug!(principal = %principal, "Grants changed during fetch, not caching");
            }
        }

        Ok(grants)
    }

    fn audit(&self, principal: &PrincipalRef, event: AuditEvent) {
        if let Some(logger) = &self.audit {
            logger.log(AuditRecord::new(principal, event));
        }
    }

    fn record_snapshot(&self, principal: &PrincipalRef, snapshot: &GrantSnapshot) {
        if snapshot.is_empty() {
            debug!(principal = %principal, complete = snapshot.is_complete(), "No grants found");
        }

        for failure in &snapshot.failures {
            self.audit(
                principal,
                AuditEvent::GrantSourceUnavailable {
                    source: failure.source,
                    reason: failure.reason.clone(),
                },
            );
        }

        for discarded in &snapshot.discarded {
            self.audit(
                principal,
                AuditEvent::ForeignGrantsDiscarded {
                    source: discarded.source,
                    count: discarded.count,
                },
            );
        }
    }

    fn record_prepared(&self, principal: &PrincipalRef, grants: &PreparedGrants) {
        for policy in &grants.policies {
            if let Err(reason) = &policy.document {
                let err = AuthzError::MalformedPolicy {
                    policy_id: policy.id.clone(),
                    reason: reason.clone(),
                };
                error!(principal = %principal, error = %err, "Skipping malformed policy");
                self.audit(
                    principal,
                    AuditEvent::MalformedPolicy {
                        policy_id: policy.id.clone(),
                        reason: reason.clone(),
                    },
                );
            }
        }

        for prepared in &grants.resource_permissions {
            if let Err(reason) = &prepared.pattern {
                error!(
                    principal = %principal,
                    permission_id = %prepared.permission.id,
                    reason = %reason,
                    "Skipping resource permission with invalid pattern"
                );
                self.audit(
                    principal,
                    AuditEvent::MalformedResourcePermission {
                        permission_id: prepared.permission.id.clone(),
                        reason: reason.clone(),
                    },
                );
            }
        }
    }

    fn record_decision(
        &self,
        principal: &PrincipalRef,
        action: &str,
        resource: &str,
        decision: &Decision,
    ) {
        debug!(
            principal = %principal,
            action,
            resource,
            allowed = decision.is_allowed(),
            reason = %decision.reason,
            "Authorization decided"
        );

        let reason = decision.reason.to_string();
        self.audit(
            principal,
            AuditEvent::AccessCheck {
                action: action.to_string(),
                resource: resource.to_string(),
                allowed: decision.is_allowed(),
                reason: reason.clone(),
            },
        );

        if decision.is_denied() {
            self.audit(
                principal,
                AuditEvent::AccessDenied {
                    action: action.to_string(),
                    resource: resource.to_string(),
                    reason,
                },
            );
        }
    }
}

/// Reduce prepared grants to a decision
///
/// Policies first, then resource permissions, then shares. The first Deny
/// returns immediately; otherwise the first Allow found is the reason.
pub(crate) fn decide(
    grants: &PreparedGrants,
    evaluator: &PolicyEvaluator,
    action: &str,
    resource: &str,
    context: &RequestContext,
) -> Decision {
    let mut verdict = Verdict::default();

    for policy in &grants.policies {
        let document = match &policy.document {
            Ok(document) => document,
            Err(_) => continue,
        };

        let outcome = evaluator.evaluate(document, action, resource, context);
        let reason = || match outcome.evaluation {
            Evaluation::Deny => DecisionReason::ExplicitPolicyDeny {
                policy_id: policy.id.clone(),
                sid: outcome.sid.clone(),
            },
            _ => DecisionReason::PolicyAllow {
                policy_id: policy.id.clone(),
                sid: outcome.sid.clone(),
            },
        };
        verdict.absorb(outcome.evaluation, reason);
        if verdict.is_final() {
            return verdict.into_decision();
        }
    }

    for prepared in &grants.resource_permissions {
        let permission = &prepared.permission;
        if permission.resource_id != resource {
            continue;
        }

        let matches = match &prepared.pattern {
            Ok(pattern) => pattern.matches(action),
            Err(_) => false,
        };
        if !matches {
            continue;
        }

        let reason = || match permission.effect {
            Effect::Deny => DecisionReason::ResourcePermissionDeny {
                permission_id: permission.id.clone(),
            },
            Effect::Allow => DecisionReason::ResourcePermissionAllow {
                permission_id: permission.id.clone(),
            },
        };
        verdict.absorb(Evaluation::from(permission.effect), reason);
        if verdict.is_final() {
            return verdict.into_decision();
        }
    }

    // Shares only ever grant
    if let Some(share) = grants
        .resource_shares
        .iter()
        .find(|share| share.resource_id == resource && share.access_level.permits(action))
    {
        verdict.absorb(Evaluation::Allow, || DecisionReason::ShareAllow {
            share_id: share.id.clone(),
            access_level: share.access_level,
        });
    }

    verdict.into_decision()
}

/// Deny-overrides reduction across grant sources
///
/// Keeps the reason of the first outcome that raised the combined
/// evaluation, so the earliest Allow or the first Deny is reported.
#[derive(Debug, Default)]
struct Verdict {
    evaluation: Evaluation,
    reason: Option<DecisionReason>,
}

impl Verdict {
    fn absorb(&mut self, evaluation: Evaluation, reason: impl FnOnce() -> DecisionReason) {
        let combined = self.evaluation.combine(evaluation);
        if combined != self.evaluation {
            self.evaluation = combined;
            self.reason = Some(reason());
        }
    }

    /// Nothing can override a Deny
    fn is_final(&self) -> bool {
        self.evaluation.is_deny()
    }

    fn into_decision(self) -> Decision {
        match (self.evaluation, self.reason) {
            (Evaluation::Deny, Some(reason)) => Decision::deny(reason),
            (Evaluation::Allow, Some(reason)) => Decision::allow(reason),
            _ => Decision::default_deny(),
        }
    }
}
