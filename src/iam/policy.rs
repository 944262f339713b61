//! IAM Policy document structure
//!
//! Wire format (JSON):
//!
//! ```json
//! {
//!   "Version": "2012-10-17",
//!   "Statement": [
//!     {
//!       "Sid": "ReadBlogs",
//!       "Effect": "Allow",
//!       "Action": ["blog:read", "blog:list"],
//!       "Resource": "arn:app:blog/*",
//!       "Condition": { "StringEquals": { "resource:env": "prod" } }
//!     }
//!   ]
//! }
//! ```
//!
//! `Action` and `Resource` accept a single string or an array. Documents are
//! parsed once into a [`PolicyDocument`] whose patterns and conditions are
//! already compiled.

use super::condition::{Condition, OperatorRegistry, RawCondition, RequestContext};
use super::pattern::Pattern;
use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};

/// Effect of a policy statement or resource permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

/// A single value or a list of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value).iter(),
            OneOrMany::Many(values) => values.iter(),
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// A single policy statement (wire form)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Statement {
    /// Statement ID (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Action patterns this statement applies to
    pub action: OneOrMany<String>,

    /// Resource patterns this statement applies to
    pub resource: OneOrMany<String>,

    /// Optional conditions for when this statement applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RawCondition>,
}

impl Statement {
    /// Create a new statement
    pub fn new(effect: Effect, action: Vec<String>, resource: Vec<String>) -> Self {
        Statement {
            sid: None,
            effect,
            action: action.into(),
            resource: resource.into(),
            condition: None,
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_condition(mut self, condition: RawCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Complete IAM policy document (wire form)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Policy {
    /// Policy format version
    pub version: String,

    /// List of policy statements
    pub statement: Vec<Statement>,
}

impl Policy {
    /// Create a new empty policy
    pub fn new() -> Self {
        Policy {
            version: "2012-10-17".to_string(),
            statement: Vec::new(),
        }
    }

    /// Add a statement to this policy
    pub fn add_statement(&mut self, statement: Statement) {
        self.statement.push(statement);
    }

    /// Parse policy from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize policy to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validate policy structure
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("Policy must declare a version".to_string());
        }

        if self.statement.is_empty() {
            return Err("Policy must have at least one statement".to_string());
        }

        for (i, stmt) in self.statement.iter().enumerate() {
            if stmt.action.is_empty() {
                return Err(format!("Statement {} has no actions", i));
            }
            if stmt.resource.is_empty() {
                return Err(format!("Statement {} has no resources", i));
            }
        }

        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

/// A statement with compiled patterns and condition
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    sid: Option<String>,
    effect: Effect,
    actions: Vec<Pattern>,
    resources: Vec<Pattern>,
    condition: Option<Condition>,
}

impl CompiledStatement {
    fn compile(index: usize, statement: &Statement, registry: &OperatorRegistry) -> Result<Self> {
        let compile_all = |patterns: &OneOrMany<String>| -> Result<Vec<Pattern>> {
            patterns.iter().map(|p| Pattern::compile(p)).collect()
        };

        let actions = compile_all(&statement.action)
            .map_err(|e| AuthzError::InvalidPolicy(format!("Statement {}: {}", index, e)))?;
        let resources = compile_all(&statement.resource)
            .map_err(|e| AuthzError::InvalidPolicy(format!("Statement {}: {}", index, e)))?;

        let condition = match &statement.condition {
            Some(raw) => Some(
                Condition::compile(raw, registry)
                    .map_err(|e| AuthzError::InvalidPolicy(format!("Statement {}: {}", index, e)))?,
            ),
            None => None,
        };

        Ok(CompiledStatement {
            sid: statement.sid.clone(),
            effect: statement.effect,
            actions,
            resources,
            condition,
        })
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn action_matches(&self, action: &str) -> bool {
        self.actions.iter().any(|pattern| pattern.matches(action))
    }

    pub fn resource_matches(&self, resource: &str) -> bool {
        self.resources.iter().any(|pattern| pattern.matches(resource))
    }

    /// A statement without a condition always holds
    pub fn condition_holds(&self, context: &RequestContext) -> bool {
        match &self.condition {
            Some(condition) => condition.evaluate(context),
            None => true,
        }
    }

    /// Check if this statement applies to the given action, resource and context
    pub fn applies_to(&self, action: &str, resource: &str, context: &RequestContext) -> bool {
        self.action_matches(action)
            && self.resource_matches(resource)
            && self.condition_holds(context)
    }
}

/// Validated, compiled policy document
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    version: String,
    statements: Vec<CompiledStatement>,
}

impl PolicyDocument {
    /// Parse and compile a JSON policy document
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` when the JSON does not follow the wire format,
    /// fails validation, or uses an unknown condition operator.
    pub fn parse(json: &str, registry: &OperatorRegistry) -> Result<Self> {
        let policy: Policy =
            serde_json::from_str(json).map_err(|e| AuthzError::InvalidPolicy(e.to_string()))?;
        Self::compile(&policy, registry)
    }

    /// Compile an already-deserialized policy
    pub fn compile(policy: &Policy, registry: &OperatorRegistry) -> Result<Self> {
        policy.validate().map_err(AuthzError::InvalidPolicy)?;

        let statements = policy
            .statement
            .iter()
            .enumerate()
            .map(|(i, stmt)| CompiledStatement::compile(i, stmt, registry))
            .collect::<Result<Vec<_>>>()?;

        Ok(PolicyDocument {
            version: policy.version.clone(),
            statements,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn statements(&self) -> &[CompiledStatement] {
        &self.statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn registry() -> OperatorRegistry {
        OperatorRegistry::default()
    }

    #[test]
    fn test_parse_wire_format_string_and_array() {
        let json = r#"{
            "Version": "2012-10-17",
            "Statement": [
                { "Sid": "One", "Effect": "Allow", "Action": "blog:read", "Resource": "arn:app:blog/*" },
                { "Effect": "Deny", "Action": ["blog:delete", "blog:share"], "Resource": ["arn:app:blog/1", "arn:app:blog/2"] }
            ]
        }"#;

        let doc = PolicyDocument::parse(json, &registry()).unwrap();
        assert_eq!(doc.version(), "2012-10-17");
        assert_eq!(doc.statements().len(), 2);
        assert_eq!(doc.statements()[0].sid(), Some("One"));
        assert_eq!(doc.statements()[1].effect(), Effect::Deny);
        assert!(doc.statements()[1].action_matches("blog:share"));
        assert!(doc.statements()[1].resource_matches("arn:app:blog/2"));
    }

    #[test]
    fn test_json_roundtrip_preserves_wire_names() {
        let mut policy = Policy::new();
        policy.add_statement(
            Statement::new(
                Effect::Allow,
                vec!["blog:read".to_string()],
                vec!["arn:app:blog/*".to_string()],
            )
            .with_sid("ReadBlogs"),
        );

        let json = policy.to_json().unwrap();
        assert!(json.contains("\"Version\""));
        assert!(json.contains("\"Statement\""));
        assert!(json.contains("\"Sid\":\"ReadBlogs\""));
        assert!(json.contains("\"Effect\":\"Allow\""));

        let parsed = Policy::from_json(&json).unwrap();
        assert_eq!(parsed.statement.len(), 1);
        assert_eq!(parsed.statement[0].effect, Effect::Allow);
    }

    #[test]
    fn test_malformed_documents() {
        let bad = [
            "not json",
            r#"{ "Version": "2012-10-17" }"#,
            r#"{ "Version": "2012-10-17", "Statement": [] }"#,
            r#"{ "Version": "", "Statement": [{ "Effect": "Allow", "Action": "a:b", "Resource": "*" }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Maybe", "Action": "a:b", "Resource": "*" }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Allow", "Action": [], "Resource": "*" }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Allow", "Action": "a:b", "Resource": [] }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Allow", "Action": "", "Resource": "*" }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Allow", "NotAction": "a:b", "Action": "a:c", "Resource": "*" }] }"#,
            r#"{ "Version": "1", "Statement": [{ "Effect": "Allow", "Action": "a:b", "Resource": "*", "Condition": { "Nope": { "k": "v" } } }] }"#,
        ];

        for json in bad {
            let result = PolicyDocument::parse(json, &registry());
            assert!(
                matches!(result, Err(AuthzError::InvalidPolicy(_))),
                "expected rejection of {}",
                json
            );
        }
    }

    #[test]
    fn test_statement_applies_to() {
        let json = r#"{
            "Version": "1",
            "Statement": [{
                "Effect": "Allow",
                "Action": "blog:*",
                "Resource": "arn:app:blog/*",
                "Condition": { "StringEquals": { "resource:env": "prod" } }
            }]
        }"#;
        let doc = PolicyDocument::parse(json, &registry()).unwrap();
        let stmt = &doc.statements()[0];

        let mut ctx = HashMap::new();
        assert!(!stmt.applies_to("blog:read", "arn:app:blog/1", &ctx));

        ctx.insert("resource:env".to_string(), "prod".into());
        assert!(stmt.applies_to("blog:read", "arn:app:blog/1", &ctx));
        assert!(!stmt.applies_to("photo:read", "arn:app:blog/1", &ctx));
        assert!(!stmt.applies_to("blog:read", "arn:app:photo/1", &ctx));
    }

    #[test]
    fn test_policy_validation() {
        let empty_policy = Policy::new();
        assert!(empty_policy.validate().is_err());

        let mut valid_policy = Policy::new();
        valid_policy.add_statement(Statement::new(
            Effect::Allow,
            vec!["blog:read".to_string()],
            vec!["*".to_string()],
        ));
        assert!(valid_policy.validate().is_ok());
    }
}
