//! In-memory tracker used by unit tests across the crate

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::jira::records::{
    CommentRecord, IssueRecord, ProjectRecord, StatusChangeRecord, TransitionRecord,
};
use crate::jira::{Tracker, TrackerError, TrackerResult};

#[derive(Default)]
pub struct StubTracker {
    projects: Vec<ProjectRecord>,
    issues: HashMap<String, IssueRecord>,
    comments: HashMap<String, Vec<CommentRecord>>,
    transitions: HashMap<String, Vec<TransitionRecord>>,
    history: HashMap<String, Vec<StatusChangeRecord>>,
    comments_error: Option<TrackerError>,
    projects_error: Option<TrackerError>,
    transitions_error: Option<TrackerError>,
    history_error: Option<TrackerError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, key: &str, name: &str) -> Self {
        self.projects.push(ProjectRecord {
            id: (self.projects.len() + 1).to_string(),
            key: key.to_string(),
            name: name.to_string(),
            lead: None,
            url: format!("https://jira.example/browse/{}", key),
        });
        self
    }

    pub fn with_issue(mut self, issue: IssueRecord) -> Self {
        self.issues.insert(issue.key.clone(), issue);
        self
    }

    pub fn with_comment(mut self, key: &str, comment: CommentRecord) -> Self {
        self.comments.entry(key.to_string()).or_default().push(comment);
        self
    }

    pub fn with_transition(mut self, key: &str, name: &str, to_status: &str) -> Self {
        let transitions = self.transitions.entry(key.to_string()).or_default();
        transitions.push(TransitionRecord {
            id: (transitions.len() + 11).to_string(),
            name: name.to_string(),
            to_status: to_status.to_string(),
        });
        self
    }

    pub fn with_status_change(
        mut self,
        key: &str,
        timestamp: &str,
        author: Option<&str>,
        from: &str,
        to: &str,
    ) -> Self {
        self.history
            .entry(key.to_string())
            .or_default()
            .push(StatusChangeRecord {
                timestamp: timestamp.to_string(),
                author: author.map(str::to_string),
                from: Some(from.to_string()),
                to: Some(to.to_string()),
            });
        self
    }

    pub fn failing_comments(mut self, error: TrackerError) -> Self {
        self.comments_error = Some(error);
        self
    }

    pub fn failing_projects(mut self, error: TrackerError) -> Self {
        self.projects_error = Some(error);
        self
    }

    pub fn failing_transitions(mut self, error: TrackerError) -> Self {
        self.transitions_error = Some(error);
        self
    }

    pub fn failing_history(mut self, error: TrackerError) -> Self {
        self.history_error = Some(error);
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of tracker calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Tracker for StubTracker {
    async fn list_projects(&self) -> TrackerResult<Vec<ProjectRecord>> {
        self.enter().await;
        match &self.projects_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.projects.clone()),
        }
    }

    async fn get_issue(&self, key: &str) -> TrackerResult<IssueRecord> {
        self.enter().await;
        self.issues
            .get(key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }

    async fn get_comments(&self, key: &str) -> TrackerResult<Vec<CommentRecord>> {
        self.enter().await;
        if let Some(e) = &self.comments_error {
            return Err(e.clone());
        }
        if !self.issues.contains_key(key) {
            return Err(TrackerError::NotFound(key.to_string()));
        }
        Ok(self.comments.get(key).cloned().unwrap_or_default())
    }

    async fn get_transitions(&self, key: &str) -> TrackerResult<Vec<TransitionRecord>> {
        self.enter().await;
        match &self.transitions_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.transitions.get(key).cloned().unwrap_or_default()),
        }
    }

    async fn get_status_history(&self, key: &str) -> TrackerResult<Vec<StatusChangeRecord>> {
        self.enter().await;
        match &self.history_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.history.get(key).cloned().unwrap_or_default()),
        }
    }
}

pub fn issue(key: &str, reporter: Option<&str>, assignee: Option<&str>) -> IssueRecord {
    let project = key.split('-').next().unwrap_or(key).to_string();
    IssueRecord {
        id: "10001".to_string(),
        key: key.to_string(),
        summary: format!("Summary of {}", key),
        description: "Steps to reproduce".to_string(),
        status: "In Progress".to_string(),
        issue_type: "Bug".to_string(),
        project,
        created: "2024-01-15T10:30:00.000+0000".to_string(),
        updated: "2024-01-16T08:00:00.000+0000".to_string(),
        reporter: reporter.map(str::to_string),
        assignee: assignee.map(str::to_string),
        priority: Some("Medium".to_string()),
        url: format!("https://jira.example/browse/{}", key),
    }
}

pub fn comment(id: &str, author: Option<&str>, created: &str) -> CommentRecord {
    CommentRecord {
        id: id.to_string(),
        author: author.map(str::to_string),
        body: format!("comment {}", id),
        created: created.to_string(),
        updated: created.to_string(),
    }
}
