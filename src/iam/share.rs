//! Capability table for relationship-based resource shares
//!
//! An action's verb (the segment after the last `:`) is classified by exact
//! lookup, never by substring, and each access level grants a fixed set of
//! classes. Shares can only grant; they never deny.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Class of an action for share purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// `read`, `list`, `view`
    Read,
    /// Every verb not listed elsewhere (`update`, `create`, `comment`, ...)
    Write,
    /// `delete`
    Delete,
    /// `share`
    Share,
}

impl ActionClass {
    /// Classify an action such as `blog:update`
    pub fn classify(action: &str) -> Self {
        let verb = action.rsplit(':').next().unwrap_or(action);
        match verb {
            "read" | "list" | "view" => ActionClass::Read,
            "delete" => ActionClass::Delete,
            "share" => ActionClass::Share,
            _ => ActionClass::Write,
        }
    }
}

/// Relationship a principal has with a shared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Owner,
    Editor,
    Viewer,
}

impl AccessLevel {
    /// Action classes granted by this access level
    pub fn capabilities(self) -> &'static [ActionClass] {
        match self {
            AccessLevel::Owner => &[
                ActionClass::Read,
                ActionClass::Write,
                ActionClass::Delete,
                ActionClass::Share,
            ],
            AccessLevel::Editor => &[ActionClass::Read, ActionClass::Write],
            AccessLevel::Viewer => &[ActionClass::Read],
        }
    }

    /// Whether this access level authorizes the action
    pub fn permits(self, action: &str) -> bool {
        self.capabilities().contains(&ActionClass::classify(action))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Owner => "owner",
            AccessLevel::Editor => "editor",
            AccessLevel::Viewer => "viewer",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(AccessLevel::Owner),
            "editor" => Ok(AccessLevel::Editor),
            "viewer" => Ok(AccessLevel::Viewer),
            other => Err(format!("unknown access level: {}", other)),
        }
    }
}
