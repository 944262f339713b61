//! Policy document evaluation with deny precedence
//!
//! Within one document an applicable Deny statement ends evaluation at once,
//! an applicable Allow is remembered while the remaining statements are
//! scanned, and a document where nothing applied is `NotApplicable`.

use super::condition::{OperatorRegistry, RequestContext};
use super::policy::{Effect, PolicyDocument};
use crate::error::Result;
use std::sync::Arc;

/// Outcome of evaluating one grant source
///
/// Ordered by precedence: `Deny` beats `Allow` beats `NotApplicable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Evaluation {
    #[default]
    NotApplicable,
    Allow,
    Deny,
}

impl Evaluation {
    /// Combine two outcomes; `Deny` is absorbing
    pub fn combine(self, other: Evaluation) -> Evaluation {
        self.max(other)
    }

    pub fn is_deny(self) -> bool {
        self == Evaluation::Deny
    }
}

impl From<Effect> for Evaluation {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => Evaluation::Allow,
            Effect::Deny => Evaluation::Deny,
        }
    }
}

/// Evaluation result plus the statement that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub evaluation: Evaluation,
    /// Sid of the deciding statement, when it has one
    pub sid: Option<String>,
}

impl PolicyOutcome {
    fn not_applicable() -> Self {
        PolicyOutcome {
            evaluation: Evaluation::NotApplicable,
            sid: None,
        }
    }
}

/// Policy document evaluator
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    registry: Arc<OperatorRegistry>,
}

impl PolicyEvaluator {
    pub fn new(registry: OperatorRegistry) -> Self {
        PolicyEvaluator {
            registry: Arc::new(registry),
        }
    }

    /// Operators used when compiling conditions
    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Parse and compile a document against this evaluator's operators
    pub fn parse(&self, json: &str) -> Result<PolicyDocument> {
        PolicyDocument::parse(json, &self.registry)
    }

    /// Evaluate a compiled document
    ///
    /// # Examples
    ///
    /// ```
    /// use iam_authz::iam::{Evaluation, PolicyEvaluator};
    /// use std::collections::HashMap;
    ///
    /// let evaluator = PolicyEvaluator::default();
    /// let doc = evaluator
    ///     .parse(r#"{"Version":"2012-10-17","Statement":[
    ///         {"Effect":"Allow","Action":"blog:*","Resource":"arn:app:blog/*"}]}"#)
    ///     .unwrap();
    ///
    /// let ctx = HashMap::new();
    /// let outcome = evaluator.evaluate(&doc, "blog:read", "arn:app:blog/1", &ctx);
    /// assert_eq!(outcome.evaluation, Evaluation::Allow);
    /// ```
    pub fn evaluate(
        &self,
        document: &PolicyDocument,
        action: &str,
        resource: &str,
        context: &RequestContext,
    ) -> PolicyOutcome {
        let mut outcome = PolicyOutcome::not_applicable();

        for statement in document.statements() {
            if !statement.applies_to(action, resource, context) {
                continue;
            }

            match statement.effect() {
                Effect::Deny => {
                    // Explicit deny - nothing later in the document can undo it
                    return PolicyOutcome {
                        evaluation: Evaluation::Deny,
                        sid: statement.sid().map(str::to_string),
                    };
                }
                Effect::Allow => {
                    if outcome.evaluation == Evaluation::NotApplicable {
                        outcome = PolicyOutcome {
                            evaluation: Evaluation::Allow,
                            sid: statement.sid().map(str::to_string),
                        };
                    }
                }
            }
        }

        outcome
    }

    /// Parse then evaluate; a parse error means the caller should skip this document
    pub fn evaluate_json(
        &self,
        json: &str,
        action: &str,
        resource: &str,
        context: &RequestContext,
    ) -> Result<PolicyOutcome> {
        let document = self.parse(json)?;
        Ok(self.evaluate(&document, action, resource, context))
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::new(OperatorRegistry::default())
    }
}
