//! Authorization decisions and the reasons behind them

use crate::iam::AccessLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final effect of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionEffect {
    Allow,
    Deny,
}

/// Which grant decided the outcome
///
/// Reasons are for audit records and operator logs. Callers render a denial
/// with [`Decision::public_message`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    ExplicitPolicyDeny {
        policy_id: String,
        sid: Option<String>,
    },
    ResourcePermissionDeny {
        permission_id: String,
    },
    PolicyAllow {
        policy_id: String,
        sid: Option<String>,
    },
    ResourcePermissionAllow {
        permission_id: String,
    },
    ShareAllow {
        share_id: String,
        access_level: AccessLevel,
    },
    /// Nothing applicable allowed the action
    DefaultDeny,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::ExplicitPolicyDeny { policy_id, sid } => {
                write!(f, "explicit policy deny ({}", policy_id)?;
                if let Some(sid) = sid {
                    write!(f, "/{}", sid)?;
                }
                f.write_str(")")
            }
            DecisionReason::ResourcePermissionDeny { permission_id } => {
                write!(f, "resource permission deny ({})", permission_id)
            }
            DecisionReason::PolicyAllow { policy_id, sid } => {
                write!(f, "policy allow ({}", policy_id)?;
                if let Some(sid) = sid {
                    write!(f, "/{}", sid)?;
                }
                f.write_str(")")
            }
            DecisionReason::ResourcePermissionAllow { permission_id } => {
                write!(f, "resource permission allow ({})", permission_id)
            }
            DecisionReason::ShareAllow {
                share_id,
                access_level,
            } => write!(f, "{} share ({})", access_level, share_id),
            DecisionReason::DefaultDeny => f.write_str("default deny"),
        }
    }
}

/// Outcome of one authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub effect: DecisionEffect,
    pub reason: DecisionReason,
}

impl Decision {
    pub fn allow(reason: DecisionReason) -> Self {
        Decision {
            effect: DecisionEffect::Allow,
            reason,
        }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Decision {
            effect: DecisionEffect::Deny,
            reason,
        }
    }

    pub fn default_deny() -> Self {
        Self::deny(DecisionReason::DefaultDeny)
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == DecisionEffect::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.effect == DecisionEffect::Deny
    }

    /// Caller-facing text; never includes the reason
    pub fn public_message(&self) -> &'static str {
        match self.effect {
            DecisionEffect::Allow => "allowed",
            DecisionEffect::Deny => "forbidden",
        }
    }
}
