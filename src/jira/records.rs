use serde::{Deserialize, Serialize};

// Plain snapshots handed back to callers. None of them hold a handle to the
// client that produced them.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub key: String,
    pub name: String,
    pub lead: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub key: String,
    pub summary: String,
    /// Empty when the issue has no description
    pub description: String,
    pub status: String,
    pub issue_type: String,
    /// Project key
    pub project: String,
    pub created: String,
    pub updated: String,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub created: String,
    pub updated: String,
}

/// A workflow transition currently available on an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub name: String,
    pub to_status: String,
}

/// One status change taken from an issue's changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRecord {
    pub timestamp: String,
    pub author: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}
