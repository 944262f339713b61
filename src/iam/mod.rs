//! Policy language for tenant authorization
//!
//! Provides:
//! - JSON-based policy documents (`Version` / `Statement`)
//! - Allow/Deny statements with explicit deny precedence
//! - Wildcard matching for segmented action and resource identifiers
//! - Condition evaluation through a pluggable operator registry
//! - The access-level capability table for resource shares

mod condition;
mod evaluator;
mod pattern;
mod policy;
mod share;

pub use condition::{
    BuiltinOperator, Condition, ConditionOperator, ConditionValue, OperatorRegistry,
    RawCondition, RequestContext,
};
pub use evaluator::{Evaluation, PolicyEvaluator, PolicyOutcome};
pub use pattern::{Pattern, PatternMatcher};
pub use policy::{CompiledStatement, Effect, OneOrMany, Policy, PolicyDocument, Statement};
pub use share::{AccessLevel, ActionClass};
