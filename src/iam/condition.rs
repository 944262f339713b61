//! Condition evaluation for IAM policies
//!
//! A condition block maps an operator name to a set of context keys and the
//! values expected for them:
//!
//! ```json
//! { "StringEquals": { "resource:env": "prod" }, "Bool": { "mfa": true } }
//! ```
//!
//! Every operator must hold and every key inside an operator must hold.
//! Several expected values for one key mean "any of". A key missing from the
//! request context fails its operator.
//!
//! Operators are resolved through an [`OperatorRegistry`], so new operators
//! can be registered without touching statement evaluation.

use super::pattern::PatternMatcher;
use super::policy::OneOrMany;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Runtime context supplied with a request
pub type RequestContext = HashMap<String, ConditionValue>;

/// Condition block as written in a policy document
pub type RawCondition = BTreeMap<String, BTreeMap<String, OneOrMany<ConditionValue>>>;

/// Condition value (can be string, number, or boolean)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ConditionValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConditionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            ConditionValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Booleans are often written as `"true"`/`"false"` strings in documents
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConditionValue::Bool(b) => Some(*b),
            ConditionValue::String(s) if s == "true" => Some(true),
            ConditionValue::String(s) if s == "false" => Some(false),
            _ => None,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::String(value)
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Bool(value)
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

/// A named comparison between an expected and an actual value
pub trait ConditionOperator: Send + Sync + fmt::Debug {
    /// Operator name as it appears in policy documents
    fn name(&self) -> &str;

    /// Compare one expected value with the value found in the context
    fn check(&self, expected: &ConditionValue, actual: &ConditionValue) -> bool;
}

/// Operators available without registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOperator {
    /// String equals (case-sensitive)
    StringEquals,
    /// String not equals
    StringNotEquals,
    /// String matches pattern (same wildcard rules as actions and resources)
    StringLike,
    /// Boolean equality
    Bool,
    /// Numeric equals
    NumericEquals,
    /// Numeric less than
    NumericLessThan,
    /// Numeric greater than
    NumericGreaterThan,
}

impl BuiltinOperator {
    pub const ALL: [BuiltinOperator; 7] = [
        BuiltinOperator::StringEquals,
        BuiltinOperator::StringNotEquals,
        BuiltinOperator::StringLike,
        BuiltinOperator::Bool,
        BuiltinOperator::NumericEquals,
        BuiltinOperator::NumericLessThan,
        BuiltinOperator::NumericGreaterThan,
    ];
}

impl ConditionOperator for BuiltinOperator {
    fn name(&self) -> &str {
        match self {
            BuiltinOperator::StringEquals => "StringEquals",
            BuiltinOperator::StringNotEquals => "StringNotEquals",
            BuiltinOperator::StringLike => "StringLike",
            BuiltinOperator::Bool => "Bool",
            BuiltinOperator::NumericEquals => "NumericEquals",
            BuiltinOperator::NumericLessThan => "NumericLessThan",
            BuiltinOperator::NumericGreaterThan => "NumericGreaterThan",
        }
    }

    fn check(&self, expected: &ConditionValue, actual: &ConditionValue) -> bool {
        match self {
            BuiltinOperator::StringEquals => match (expected.as_string(), actual.as_string()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => false,
            },
            BuiltinOperator::StringNotEquals => {
                match (expected.as_string(), actual.as_string()) {
                    (Some(expected), Some(actual)) => expected != actual,
                    _ => false,
                }
            }
            BuiltinOperator::StringLike => match (expected.as_string(), actual.as_string()) {
                (Some(pattern), Some(actual)) => PatternMatcher::matches(pattern, actual),
                _ => false,
            },
            BuiltinOperator::Bool => match (expected.as_bool(), actual.as_bool()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => false,
            },
            BuiltinOperator::NumericEquals => match (expected.as_number(), actual.as_number()) {
                (Some(expected), Some(actual)) => (expected - actual).abs() < f64::EPSILON,
                _ => false,
            },
            BuiltinOperator::NumericLessThan => {
                match (expected.as_number(), actual.as_number()) {
                    (Some(expected), Some(actual)) => actual < expected,
                    _ => false,
                }
            }
            BuiltinOperator::NumericGreaterThan => {
                match (expected.as_number(), actual.as_number()) {
                    (Some(expected), Some(actual)) => actual > expected,
                    _ => false,
                }
            }
        }
    }
}

/// Name-indexed set of condition operators
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn ConditionOperator>>,
}

impl OperatorRegistry {
    /// Registry with no operators at all
    pub fn empty() -> Self {
        OperatorRegistry {
            operators: HashMap::new(),
        }
    }

    /// Registry with every [`BuiltinOperator`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for op in BuiltinOperator::ALL {
            registry.register(Arc::new(op));
        }
        registry
    }

    /// Register an operator, replacing any existing one with the same name
    pub fn register(&mut self, operator: Arc<dyn ConditionOperator>) {
        self.operators.insert(operator.name().to_string(), operator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ConditionOperator>> {
        self.operators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// One (operator, key) pair of a compiled condition
#[derive(Debug, Clone)]
struct Clause {
    operator: Arc<dyn ConditionOperator>,
    key: String,
    expected: Vec<ConditionValue>,
}

impl Clause {
    fn holds(&self, context: &RequestContext) -> bool {
        let actual = match context.get(&self.key) {
            Some(v) => v,
            None => return false, // Key not in context - condition fails
        };

        self.expected
            .iter()
            .any(|expected| self.operator.check(expected, actual))
    }
}

/// A condition block resolved against an operator registry
#[derive(Debug, Clone, Default)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// Resolve a raw condition block
    ///
    /// Unknown operators, empty operator blocks and empty value lists are
    /// rejected so that a typo can never widen a statement.
    pub fn compile(raw: &RawCondition, registry: &OperatorRegistry) -> Result<Self, String> {
        let mut clauses = Vec::new();

        for (operator_name, keys) in raw {
            let operator = registry
                .get(operator_name)
                .ok_or_else(|| format!("unknown condition operator {}", operator_name))?;

            if keys.is_empty() {
                return Err(format!("condition operator {} has no keys", operator_name));
            }

            for (key, values) in keys {
                let expected = values.to_vec();
                if expected.is_empty() {
                    return Err(format!(
                        "condition {} on key {} has no values",
                        operator_name, key
                    ));
                }
                clauses.push(Clause {
                    operator: Arc::clone(&operator),
                    key: key.clone(),
                    expected,
                });
            }
        }

        Ok(Condition { clauses })
    }

    /// Evaluate against a request context (all clauses must hold)
    pub fn evaluate(&self, context: &RequestContext) -> bool {
        self.clauses.iter().all(|clause| clause.holds(context))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
