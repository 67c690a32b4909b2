use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::jira::records::{CommentRecord, IssueRecord, StatusChangeRecord, TransitionRecord};
use crate::jira::{Tracker, TrackerResult};

/// Kind of a timeline entry. Declaration order is the tie-break order for
/// events sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    StatusChanged,
    Updated,
    Comment,
    CommentEdited,
    CommentsUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub kind: EventKind,
    pub description: String,
    pub actor: Option<String>,
}

impl TimelineEvent {
    fn new(timestamp: &str, kind: EventKind, description: String, actor: Option<String>) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            kind,
            description,
            actor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reporter,
    Assignee,
    Commenter,
}

/// Account name to every role it holds on a ticket
pub type RoleMap = BTreeMap<String, BTreeSet<Role>>;

/// Composite view of one ticket, built fresh per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub ticket_key: String,
    pub issue: IssueRecord,
    pub comments: Vec<CommentRecord>,
    /// False when the comment list could not be fetched and is left empty
    pub comments_complete: bool,
    pub timeline: Vec<TimelineEvent>,
    pub roles: RoleMap,
    pub possible_transitions: Vec<TransitionRecord>,
    pub web_url: String,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Sort events by time, then kind. Events whose timestamps cannot be parsed
/// go last, keeping their relative order. The sort is stable so equal
/// comments stay in the order the tracker returned them.
pub fn sort_timeline(events: &mut Vec<TimelineEvent>) {
    let mut keyed: Vec<(Option<DateTime<FixedOffset>>, TimelineEvent)> = events
        .drain(..)
        .map(|event| (parse_timestamp(&event.timestamp), event))
        .collect();

    keyed.sort_by(|(a_time, a), (b_time, b)| match (a_time, b_time) {
        (Some(x), Some(y)) => x.cmp(y).then(a.kind.cmp(&b.kind)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    events.extend(keyed.into_iter().map(|(_, event)| event));
}

/// Merge issue lifecycle, status history and comments into one ordered timeline
pub fn build_timeline(
    issue: &IssueRecord,
    comments: &[CommentRecord],
    history: &[StatusChangeRecord],
    comments_failure: Option<&str>,
) -> Vec<TimelineEvent> {
    let mut events = Vec::with_capacity(comments.len() * 2 + history.len() + 2);

    events.push(TimelineEvent::new(
        &issue.created,
        EventKind::Created,
        format!("Issue {} created", issue.key),
        issue.reporter.clone(),
    ));

    for change in history {
        let from = change.from.as_deref().unwrap_or("none");
        let to = change.to.as_deref().unwrap_or("none");
        events.push(TimelineEvent::new(
            &change.timestamp,
            EventKind::StatusChanged,
            format!("Status changed from {} to {}", from, to),
            change.author.clone(),
        ));
    }

    events.push(TimelineEvent::new(
        &issue.updated,
        EventKind::Updated,
        format!("Issue {} last updated", issue.key),
        None,
    ));

    for comment in comments {
        let author = comment.author.as_deref().unwrap_or("unknown");
        events.push(TimelineEvent::new(
            &comment.created,
            EventKind::Comment,
            format!("Comment added by {}", author),
            comment.author.clone(),
        ));

        if !comment.updated.is_empty() && comment.updated != comment.created {
            events.push(TimelineEvent::new(
                &comment.updated,
                EventKind::CommentEdited,
                format!("Comment edited by {}", author),
                comment.author.clone(),
            ));
        }
    }

    if let Some(reason) = comments_failure {
        events.push(TimelineEvent::new(
            &issue.updated,
            EventKind::CommentsUnavailable,
            format!("Comments could not be retrieved: {}", reason),
            None,
        ));
    }

    sort_timeline(&mut events);
    events
}

/// Collect reporter, assignee and comment authors. Missing accounts are skipped.
pub fn identify_roles(issue: &IssueRecord, comments: &[CommentRecord]) -> RoleMap {
    let mut roles = RoleMap::new();
    let mut grant = |account: Option<&String>, role: Role| {
        if let Some(account) = account {
            roles.entry(account.clone()).or_default().insert(role);
        }
    };

    grant(issue.reporter.as_ref(), Role::Reporter);
    grant(issue.assignee.as_ref(), Role::Assignee);
    for comment in comments {
        grant(comment.author.as_ref(), Role::Commenter);
    }

    roles
}

/// Builds [`TicketSummary`] values from several tracker calls.
///
/// The calls are independent reads with no consistency guarantee across
/// them. Only the issue lookup is fatal; the other halves degrade.
pub struct TicketSummarizer {
    tracker: Arc<dyn Tracker>,
}

impl TicketSummarizer {
    pub fn new(tracker: Arc<dyn Tracker>) -> Self {
        Self { tracker }
    }

    pub async fn get_ticket_summary(&self, key: &str) -> TrackerResult<TicketSummary> {
        let issue = self.tracker.get_issue(key).await?;

        let (comments, comments_failure) = match self.tracker.get_comments(key).await {
            Ok(comments) => (comments, None),
            Err(e) => {
                warn!("Comments for {} unavailable, continuing without them: {}", key, e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let possible_transitions = self.tracker.get_transitions(key).await.unwrap_or_else(|e| {
            debug!("Transitions for {} unavailable: {}", key, e);
            Vec::new()
        });

        let history = self.tracker.get_status_history(key).await.unwrap_or_else(|e| {
            debug!("Status history for {} unavailable: {}", key, e);
            Vec::new()
        });

        let timeline = build_timeline(&issue, &comments, &history, comments_failure.as_deref());
        let roles = identify_roles(&issue, &comments);

        Ok(TicketSummary {
            ticket_key: issue.key.clone(),
            web_url: issue.url.clone(),
            comments_complete: comments_failure.is_none(),
            issue,
            comments,
            timeline,
            roles,
            possible_transitions,
        })
    }
}
