//! Tenant-scoped entities read by the authorization core
//!
//! Every stored entity carries the organization it belongs to. Requests name
//! the organization they are scoped to and the core never honours a grant
//! from another one.

use crate::error::{AuthzError, Result};
use crate::iam::{AccessLevel, ConditionValue, Effect, RequestContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Empty or whitespace-only identifiers are never valid
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

string_id!(
    /// Tenant isolation boundary
    OrganizationId
);

string_id!(
    /// User or service account identifier, unique within an organization
    PrincipalId
);

/// Kind of principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    User,
    ServiceAccount,
}

impl PrincipalType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalType::User => "user",
            PrincipalType::ServiceAccount => "service_account",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(PrincipalType::User),
            "service_account" => Ok(PrincipalType::ServiceAccount),
            other => Err(AuthzError::InvalidRequest(format!(
                "unknown principal type: {}",
                other
            ))),
        }
    }
}

/// An authenticated principal and the organization it acts in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub organization_id: OrganizationId,
    pub principal_type: PrincipalType,
    pub id: PrincipalId,
}

impl PrincipalRef {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        principal_type: PrincipalType,
        id: impl Into<PrincipalId>,
    ) -> Self {
        PrincipalRef {
            organization_id: organization_id.into(),
            principal_type,
            id: id.into(),
        }
    }

    pub fn user(organization_id: impl Into<OrganizationId>, id: impl Into<PrincipalId>) -> Self {
        Self::new(organization_id, PrincipalType::User, id)
    }

    pub fn service_account(
        organization_id: impl Into<OrganizationId>,
        id: impl Into<PrincipalId>,
    ) -> Self {
        Self::new(organization_id, PrincipalType::ServiceAccount, id)
    }

    /// Whether a row naming (id, type) refers to this principal
    pub fn is(&self, id: &PrincipalId, principal_type: PrincipalType) -> bool {
        &self.id == id && self.principal_type == principal_type
    }

    pub fn validate(&self) -> Result<()> {
        if self.organization_id.is_blank() {
            return Err(AuthzError::InvalidRequest(
                "organization id cannot be empty".to_string(),
            ));
        }
        if self.id.is_blank() {
            return Err(AuthzError::InvalidRequest(
                "principal id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}",
            self.organization_id, self.principal_type, self.id
        )
    }
}

/// Rows that belong to exactly one organization
pub trait OrganizationScoped {
    fn organization_id(&self) -> &OrganizationId;
}

/// A stored policy; the document stays raw until the engine compiles it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPolicy {
    pub id: String,
    pub organization_id: OrganizationId,
    /// JSON policy document
    pub document: String,
}

impl StoredPolicy {
    pub fn new(
        id: impl Into<String>,
        organization_id: impl Into<OrganizationId>,
        document: impl Into<String>,
    ) -> Self {
        StoredPolicy {
            id: id.into(),
            organization_id: organization_id.into(),
            document: document.into(),
        }
    }
}

/// Resource-scoped allow/deny, independent of policy documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub id: String,
    pub organization_id: OrganizationId,
    pub principal_id: PrincipalId,
    pub principal_type: PrincipalType,
    pub resource_id: String,
    /// Action pattern, wildcards allowed (e.g., `blog:*`)
    pub permission: String,
    pub effect: Effect,
}

/// Relationship between a principal and one resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceShare {
    pub id: String,
    pub organization_id: OrganizationId,
    pub principal_id: PrincipalId,
    pub principal_type: PrincipalType,
    pub resource_id: String,
    pub access_level: AccessLevel,
}

impl ResourcePermission {
    /// Permission row scoped to the principal's organization
    pub fn new(
        id: impl Into<String>,
        principal: &PrincipalRef,
        resource_id: impl Into<String>,
        permission: impl Into<String>,
        effect: Effect,
    ) -> Self {
        ResourcePermission {
            id: id.into(),
            organization_id: principal.organization_id.clone(),
            principal_id: principal.id.clone(),
            principal_type: principal.principal_type,
            resource_id: resource_id.into(),
            permission: permission.into(),
            effect,
        }
    }
}

impl ResourceShare {
    /// Share row scoped to the principal's organization
    pub fn new(
        id: impl Into<String>,
        principal: &PrincipalRef,
        resource_id: impl Into<String>,
        access_level: AccessLevel,
    ) -> Self {
        ResourceShare {
            id: id.into(),
            organization_id: principal.organization_id.clone(),
            principal_id: principal.id.clone(),
            principal_type: principal.principal_type,
            resource_id: resource_id.into(),
            access_level,
        }
    }
}

impl OrganizationScoped for StoredPolicy {
    fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }
}

impl OrganizationScoped for ResourcePermission {
    fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }
}

impl OrganizationScoped for ResourceShare {
    fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }
}

/// One (action, resource) pair of a batch check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAction {
    pub action: String,
    pub resource: String,
}

impl ResourceAction {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        ResourceAction {
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// Actions are `service:verb`; neither side may carry wildcards
    pub fn validate(&self) -> Result<()> {
        if self.action.contains('*') || self.resource.contains('*') {
            return Err(AuthzError::InvalidRequest(
                "wildcards are only allowed in grants, not in requests".to_string(),
            ));
        }

        match self.action.split_once(':') {
            Some((service, verb))
                if !service.trim().is_empty() && !verb.trim().is_empty() => {}
            _ => {
                return Err(AuthzError::InvalidRequest(format!(
                    "action must look like service:verb, got {:?}",
                    self.action
                )))
            }
        }

        if self.resource.trim().is_empty() {
            return Err(AuthzError::InvalidRequest(
                "resource cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// A single authorization check
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub principal: PrincipalRef,
    pub action: String,
    pub resource: String,
    pub context: RequestContext,
    /// Organization that owns the resource, when the caller knows it
    pub resource_organization: Option<OrganizationId>,
}

impl AuthorizationRequest {
    pub fn new(
        principal: PrincipalRef,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        AuthorizationRequest {
            principal,
            action: action.into(),
            resource: resource.into(),
            context: RequestContext::new(),
            resource_organization: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_organization(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.resource_organization = Some(organization_id.into());
        self
    }

    /// Reject malformed input before any grant is fetched
    pub fn validate(&self) -> Result<()> {
        self.principal.validate()?;
        ResourceAction::new(self.action.as_str(), self.resource.as_str()).validate()?;

        if let Some(owner) = &self.resource_organization {
            if owner != &self.principal.organization_id {
                return Err(AuthzError::OrganizationMismatch {
                    expected: self.principal.organization_id.to_string(),
                    actual: owner.to_string(),
                });
            }
        }

        Ok(())
    }
}
