/// REST client for the Jira API
///
/// Wraps direct calls to the tracker and normalizes the raw payloads into the
/// plain records in [`crate::jira::records`].
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::{AuthMode, JiraConfig};
use crate::jira::records::{
    CommentRecord, IssueRecord, ProjectRecord, StatusChangeRecord, TransitionRecord,
};
use crate::jira::{Tracker, TrackerError, TrackerResult};

const API_PREFIX: &str = "/rest/api/2";
const COMMENT_PAGE_SIZE: u32 = 100;

lazy_static! {
    static ref ISSUE_KEY: Regex = Regex::new(r"^(?:[A-Za-z][A-Za-z0-9_]*-[0-9]+|[0-9]+)$")
        .expect("issue key pattern is valid");
}

/// Whether `key` looks like an issue key (`PROJ-123`) or a numeric issue id
pub fn is_valid_issue_key(key: &str) -> bool {
    ISSUE_KEY.is_match(key)
}

/// Client for one Jira site. Holds a single HTTP session reused for every call.
pub struct JiraClient {
    http: Client,
    server: String,
    auth: AuthMode,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self, TrackerError> {
        Self::with_timeout(&config.server, config.auth.clone(), config.timeout)
    }

    pub fn with_timeout(server: &str, auth: AuthMode, timeout: Duration) -> Result<Self, TrackerError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jira-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            server: server.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}{}", self.server, API_PREFIX, path);
        let builder = self.http.get(url).header("Accept", "application/json");
        match &self.auth {
            AuthMode::Basic { email, api_token } => builder.basic_auth(email, Some(api_token)),
            AuthMode::OAuth { access_token, .. } => builder.bearer_auth(access_token),
        }
    }

    /// Send a GET and decode the JSON body. A 404 maps to `NotFound(missing)`
    /// when `missing` is given.
    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        missing: Option<&str>,
    ) -> TrackerResult<T> {
        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, missing));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TrackerError::UnexpectedResponse(format!("Failed to decode response: {}", e)))
    }

    fn check_key(key: &str) -> TrackerResult<()> {
        if is_valid_issue_key(key) {
            Ok(())
        } else {
            Err(TrackerError::NotFound(key.to_string()))
        }
    }
}

#[async_trait]
impl Tracker for JiraClient {
    async fn list_projects(&self) -> TrackerResult<Vec<ProjectRecord>> {
        debug!("Listing Jira projects");
        let projects: Vec<RawProject> = self
            .fetch(self.request("/project").query(&[("expand", "lead")]), None)
            .await?;

        Ok(projects
            .into_iter()
            .map(|p| p.into_record(&self.server))
            .collect())
    }

    async fn get_issue(&self, key: &str) -> TrackerResult<IssueRecord> {
        Self::check_key(key)?;
        debug!("Getting Jira issue {}", key);

        let issue: RawIssue = self
            .fetch(self.request(&format!("/issue/{}", key)), Some(key))
            .await?;
        Ok(issue.into_record(&self.server))
    }

    async fn get_comments(&self, key: &str) -> TrackerResult<Vec<CommentRecord>> {
        Self::check_key(key)?;
        debug!("Getting comments for {}", key);

        let mut comments = Vec::new();
        let mut start_at: u32 = 0;

        loop {
            let page: RawCommentPage = self
                .fetch(
                    self.request(&format!("/issue/{}/comment", key)).query(&[
                        ("startAt", start_at.to_string()),
                        ("maxResults", COMMENT_PAGE_SIZE.to_string()),
                    ]),
                    Some(key),
                )
                .await?;

            let fetched = page.comments.len() as u32;
            comments.extend(page.comments.into_iter().map(RawComment::into_record));
            start_at += fetched;

            if fetched == 0 || page.total.map_or(true, |total| start_at >= total) {
                break;
            }
        }

        Ok(comments)
    }

    async fn get_transitions(&self, key: &str) -> TrackerResult<Vec<TransitionRecord>> {
        Self::check_key(key)?;
        debug!("Getting transitions for {}", key);

        let response: RawTransitions = self
            .fetch(self.request(&format!("/issue/{}/transitions", key)), Some(key))
            .await?;

        Ok(response
            .transitions
            .into_iter()
            .map(|t| TransitionRecord {
                id: t.id,
                name: t.name,
                to_status: t.to.map(|s| s.name).unwrap_or_default(),
            })
            .collect())
    }

    async fn get_status_history(&self, key: &str) -> TrackerResult<Vec<StatusChangeRecord>> {
        Self::check_key(key)?;
        debug!("Getting status history for {}", key);

        let response: RawChangelogIssue = self
            .fetch(
                self.request(&format!("/issue/{}", key))
                    .query(&[("expand", "changelog"), ("fields", "created")]),
                Some(key),
            )
            .await?;

        Ok(response.status_changes())
    }
}

fn map_send_error(error: reqwest::Error) -> TrackerError {
    if error.is_timeout() {
        TrackerError::Timeout(error.to_string())
    } else {
        TrackerError::Connection(error.to_string())
    }
}

fn map_status(status: StatusCode, body: &str, missing: Option<&str>) -> TrackerError {
    match (status, missing) {
        (StatusCode::NOT_FOUND, Some(key)) => TrackerError::NotFound(key.to_string()),
        (StatusCode::UNAUTHORIZED, _) | (StatusCode::FORBIDDEN, _) => {
            TrackerError::Unauthorized(format!("Jira returned {}", status))
        }
        _ => {
            let snippet: String = body.chars().take(200).collect();
            debug!("Jira returned {}: {}", status, snippet);
            TrackerError::UnexpectedResponse(format!("HTTP {}: {}", status.as_u16(), snippet))
        }
    }
}

fn browse_url(server: &str, key: &str) -> String {
    format!("{}/browse/{}", server, key)
}

// Wire types for the v2 REST API. Only the fields we read are declared.

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRef {
    display_name: Option<String>,
    name: Option<String>,
}

impl UserRef {
    fn label(self) -> Option<String> {
        self.display_name.or(self.name)
    }
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    id: String,
    key: String,
    name: String,
    lead: Option<UserRef>,
}

impl RawProject {
    fn into_record(self, server: &str) -> ProjectRecord {
        ProjectRecord {
            url: browse_url(server, &self.key),
            id: self.id,
            key: self.key,
            name: self.name,
            lead: self.lead.and_then(UserRef::label),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    id: String,
    key: String,
    fields: RawIssueFields,
}

#[derive(Debug, Deserialize)]
struct RawIssueFields {
    #[serde(default)]
    summary: String,
    description: Option<String>,
    status: Option<NamedRef>,
    issuetype: Option<NamedRef>,
    project: Option<ProjectRef>,
    #[serde(default)]
    created: String,
    #[serde(default)]
    updated: String,
    reporter: Option<UserRef>,
    assignee: Option<UserRef>,
    priority: Option<NamedRef>,
}

impl RawIssue {
    fn into_record(self, server: &str) -> IssueRecord {
        let fields = self.fields;
        IssueRecord {
            url: browse_url(server, &self.key),
            id: self.id,
            key: self.key,
            summary: fields.summary,
            description: fields.description.unwrap_or_default(),
            status: fields.status.map(|s| s.name).unwrap_or_default(),
            issue_type: fields.issuetype.map(|t| t.name).unwrap_or_default(),
            project: fields.project.map(|p| p.key).unwrap_or_default(),
            created: fields.created,
            updated: fields.updated,
            reporter: fields.reporter.and_then(UserRef::label),
            assignee: fields.assignee.and_then(UserRef::label),
            priority: fields.priority.map(|p| p.name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
    total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    author: Option<UserRef>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created: String,
    #[serde(default)]
    updated: String,
}

impl RawComment {
    fn into_record(self) -> CommentRecord {
        CommentRecord {
            id: self.id,
            author: self.author.and_then(UserRef::label),
            body: self.body,
            created: self.created,
            updated: self.updated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTransitions {
    #[serde(default)]
    transitions: Vec<RawTransition>,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    id: String,
    name: String,
    to: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
struct RawChangelogIssue {
    changelog: Option<RawChangelog>,
}

#[derive(Debug, Deserialize)]
struct RawChangelog {
    #[serde(default)]
    histories: Vec<RawHistory>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    author: Option<UserRef>,
    created: String,
    #[serde(default)]
    items: Vec<RawHistoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistoryItem {
    field: String,
    from_string: Option<String>,
    to_string: Option<String>,
}

impl RawChangelogIssue {
    fn status_changes(self) -> Vec<StatusChangeRecord> {
        let histories = self.changelog.map(|c| c.histories).unwrap_or_default();
        let mut changes = Vec::new();

        for history in histories {
            let author = history.author.and_then(UserRef::label);
            for item in history.items.into_iter().filter(|i| i.field == "status") {
                changes.push(StatusChangeRecord {
                    timestamp: history.created.clone(),
                    author: author.clone(),
                    from: item.from_string,
                    to: item.to_string,
                });
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP responder keyed by request target (path + query)
    async fn fixture_server(routes: HashMap<String, (u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buffer = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buffer).to_string();
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (code, body) = routes
                        .get(&target)
                        .cloned()
                        .unwrap_or((404, r#"{"errorMessages":["missing"]}"#.to_string()));
                    let response = format!(
                        "HTTP/1.1 {} Fixture\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        code,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    fn basic_auth() -> AuthMode {
        AuthMode::Basic {
            email: "dev@example.com".to_string(),
            api_token: "token".to_string(),
        }
    }

    fn client_for(server: &str) -> JiraClient {
        JiraClient::with_timeout(server, basic_auth(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_issue_key_validation() {
        assert!(is_valid_issue_key("FORGE-1"));
        assert!(is_valid_issue_key("my_proj2-4031"));
        assert!(is_valid_issue_key("10042"));
        assert!(!is_valid_issue_key(""));
        assert!(!is_valid_issue_key("FORGE"));
        assert!(!is_valid_issue_key("FORGE-1/../../admin"));
        assert!(!is_valid_issue_key("-1"));
    }

    #[test]
    fn test_issue_mapping_with_missing_people() {
        let raw: RawIssue = serde_json::from_value(json!({
            "id": "10001",
            "key": "FORGE-1",
            "fields": {
                "summary": "Crash on start",
                "description": null,
                "status": {"name": "In Progress"},
                "issuetype": {"name": "Bug"},
                "project": {"key": "FORGE"},
                "created": "2024-01-15T10:30:00.000+0000",
                "updated": "2024-01-16T08:00:00.000+0000",
                "reporter": {"displayName": "alice"},
                "assignee": null,
                "priority": null
            }
        }))
        .unwrap();

        let record = raw.into_record("https://jira.example");
        assert_eq!(record.description, "");
        assert_eq!(record.status, "In Progress");
        assert_eq!(record.project, "FORGE");
        assert_eq!(record.reporter.as_deref(), Some("alice"));
        assert!(record.assignee.is_none());
        assert!(record.priority.is_none());
        assert_eq!(record.url, "https://jira.example/browse/FORGE-1");
    }

    #[test]
    fn test_changelog_keeps_only_status_items() {
        let raw: RawChangelogIssue = serde_json::from_value(json!({
            "changelog": {
                "histories": [
                    {
                        "author": {"displayName": "bob"},
                        "created": "2024-01-15T11:00:00.000+0000",
                        "items": [
                            {"field": "assignee", "fromString": null, "toString": "bob"},
                            {"field": "status", "fromString": "To Do", "toString": "In Progress"}
                        ]
                    }
                ]
            }
        }))
        .unwrap();

        let changes = raw.status_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].author.as_deref(), Some("bob"));
        assert_eq!(changes[0].from.as_deref(), Some("To Do"));
        assert_eq!(changes[0].to.as_deref(), Some("In Progress"));
    }

    #[tokio::test]
    async fn test_invalid_key_fails_without_request() {
        // Nothing listens on this port; a request would surface as Connection
        let client = client_for("http://127.0.0.1:9");
        let err = client.get_issue("not a key").await.unwrap_err();
        assert_eq!(err, TrackerError::NotFound("not a key".to_string()));
    }

    #[tokio::test]
    async fn test_list_projects_over_http() {
        let mut routes = HashMap::new();
        routes.insert(
            "/rest/api/2/project?expand=lead".to_string(),
            (
                200,
                json!([
                    {"id": "1", "key": "FORGE", "name": "ForgeMaker", "lead": {"displayName": "alice"}},
                    {"id": "2", "key": "MDP", "name": "My discovery project"}
                ])
                .to_string(),
            ),
        );
        let server = fixture_server(routes).await;
        let client = client_for(&server);

        let projects = client.list_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].key, "FORGE");
        assert_eq!(projects[0].lead.as_deref(), Some("alice"));
        assert_eq!(projects[1].lead, None);
        assert_eq!(projects[1].url, format!("{}/browse/MDP", server));
    }

    #[tokio::test]
    async fn test_missing_issue_maps_to_not_found() {
        let server = fixture_server(HashMap::new()).await;
        let client = client_for(&server);

        let err = client.get_issue("FORGE-999").await.unwrap_err();
        assert_eq!(err, TrackerError::NotFound("FORGE-999".to_string()));
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let mut routes = HashMap::new();
        routes.insert(
            "/rest/api/2/issue/FORGE-1".to_string(),
            (401, "{}".to_string()),
        );
        let server = fixture_server(routes).await;
        let client = client_for(&server);

        let err = client.get_issue("FORGE-1").await.unwrap_err();
        assert!(matches!(err, TrackerError::Unauthorized(_)));
    }

    #[test]
    fn test_unexpected_status_keeps_body_snippet() {
        let body = "x".repeat(500);
        let err = map_status(StatusCode::INTERNAL_SERVER_ERROR, &body, Some("FORGE-1"));
        match err {
            TrackerError::UnexpectedResponse(message) => {
                assert!(message.starts_with("HTTP 500: "));
                assert_eq!(message.len(), "HTTP 500: ".len() + 200);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Without a key a 404 is not an issue lookup
        let err = map_status(StatusCode::NOT_FOUND, "gone", None);
        assert_eq!(err, TrackerError::UnexpectedResponse("HTTP 404: gone".to_string()));
    }

    #[tokio::test]
    async fn test_comments_are_paged_in_order() {
        let page = |ids: &[&str], start: u32| {
            json!({
                "startAt": start,
                "maxResults": 100,
                "total": 3,
                "comments": ids.iter().map(|id| json!({
                    "id": id,
                    "author": {"displayName": format!("user-{}", id)},
                    "body": format!("comment {}", id),
                    "created": "2024-01-15T10:30:00.000+0000",
                    "updated": "2024-01-15T10:30:00.000+0000"
                })).collect::<Vec<_>>()
            })
            .to_string()
        };

        let mut routes = HashMap::new();
        routes.insert(
            "/rest/api/2/issue/FORGE-1/comment?startAt=0&maxResults=100".to_string(),
            (200, page(&["1", "2"], 0)),
        );
        routes.insert(
            "/rest/api/2/issue/FORGE-1/comment?startAt=2&maxResults=100".to_string(),
            (200, page(&["3"], 2)),
        );
        let server = fixture_server(routes).await;
        let client = client_for(&server);

        let comments = client.get_comments("FORGE-1").await.unwrap();
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(comments[2].author.as_deref(), Some("user-3"));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{}", addr));
        let err = client.list_projects().await.unwrap_err();
        assert!(matches!(err, TrackerError::Connection(_)));
    }
}
