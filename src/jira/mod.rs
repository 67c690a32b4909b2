/// Jira tracker access
///
/// `Tracker` is the seam between the tool layer and the issue tracker. The
/// production implementation is [`client::JiraClient`]; tests substitute an
/// in-memory stub.
pub mod client;
pub mod records;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

pub use self::client::JiraClient;
pub use self::records::{
    CommentRecord, IssueRecord, ProjectRecord, StatusChangeRecord, TransitionRecord,
};
pub use self::summary::{EventKind, Role, RoleMap, TicketSummarizer, TicketSummary, TimelineEvent};

use async_trait::async_trait;

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Failures talking to the tracker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected response from Jira: {0}")]
    UnexpectedResponse(String),
}

/// Operations the tool layer needs from an issue tracker.
///
/// Implementations hold a single logical session that is created once and
/// reused for every call.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// All projects visible to the configured account, in tracker order
    async fn list_projects(&self) -> TrackerResult<Vec<ProjectRecord>>;

    async fn get_issue(&self, key: &str) -> TrackerResult<IssueRecord>;

    /// Comments oldest first
    async fn get_comments(&self, key: &str) -> TrackerResult<Vec<CommentRecord>>;

    async fn get_transitions(&self, _key: &str) -> TrackerResult<Vec<TransitionRecord>> {
        Ok(Vec::new())
    }

    /// Status changes from the issue history, oldest first
    async fn get_status_history(&self, _key: &str) -> TrackerResult<Vec<StatusChangeRecord>> {
        Ok(Vec::new())
    }
}
