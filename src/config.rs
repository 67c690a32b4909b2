use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_ENV_FILE: &str = "jira_mcp.env";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors raised while resolving the connection configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JIRA_SERVER environment variable is required")]
    MissingServer,

    #[error("Invalid Jira server URL: {0}")]
    InvalidServer(String),

    #[error("Invalid Jira configuration. Either JIRA_EMAIL and JIRA_API_TOKEN or JIRA_OAUTH_ACCESS_TOKEN must be provided")]
    MissingCredentials,

    #[error("Invalid JIRA_TIMEOUT value: {0}")]
    InvalidTimeout(String),

    #[error("Failed to read environment file {path}: {reason}")]
    EnvFile { path: String, reason: String },
}

/// How requests to the tracker authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Email + API token, sent as HTTP basic auth
    Basic { email: String, api_token: String },

    /// OAuth token set. The access token is sent as a bearer token; the
    /// companion values are carried through unchanged.
    OAuth {
        access_token: String,
        access_token_secret: Option<String>,
        consumer_key: Option<String>,
        key_cert_path: Option<String>,
    },
}

impl AuthMode {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::Basic { .. } => "basic",
            AuthMode::OAuth { .. } => "oauth",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .field("api_token", &"***")
                .finish(),
            AuthMode::OAuth { consumer_key, .. } => f
                .debug_struct("OAuth")
                .field("access_token", &"***")
                .field("consumer_key", consumer_key)
                .finish_non_exhaustive(),
        }
    }
}

/// Fully resolved configuration consumed by the rest of the crate
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Tracker base URL without a trailing slash
    pub server: String,
    pub auth: AuthMode,
    /// Per-request timeout, also applied to each tool call
    pub timeout: Duration,
}

/// Values that take precedence over anything found in the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub timeout_secs: Option<u64>,
}

impl JiraConfig {
    /// Resolve configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F, overrides: &ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server = normalize_server(&get("JIRA_SERVER").ok_or(ConfigError::MissingServer)?)?;

        let auth = match (get("JIRA_EMAIL"), get("JIRA_API_TOKEN"), get("JIRA_OAUTH_ACCESS_TOKEN")) {
            (Some(email), Some(api_token), _) => AuthMode::Basic { email, api_token },
            (_, _, Some(access_token)) => AuthMode::OAuth {
                access_token,
                access_token_secret: get("JIRA_OAUTH_ACCESS_TOKEN_SECRET"),
                consumer_key: get("JIRA_CONSUMER_KEY"),
                key_cert_path: get("JIRA_KEY_CERT"),
            },
            _ => return Err(ConfigError::MissingCredentials),
        };

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match get("JIRA_TIMEOUT") {
                Some(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }

        Ok(Self {
            server,
            auth,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Resolve configuration from the process environment layered over the
    /// values of an env file. Process variables win.
    pub fn from_env(env_file: &EnvFile, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|name| env_file.lookup(name), overrides)?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

/// Key/value pairs read from an env file without touching the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    path: Option<PathBuf>,
    values: HashMap<String, String>,
}

impl EnvFile {
    /// Load `path` if it exists. A missing file yields an empty set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let env_err = |reason: String| ConfigError::EnvFile {
            path: path.display().to_string(),
            reason,
        };

        let mut values = HashMap::new();
        for item in dotenv::from_path_iter(path).map_err(|e| env_err(e.to_string()))? {
            let (key, value) = item.map_err(|e| env_err(e.to_string()))?;
            values.insert(key, value);
        }

        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
        })
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    /// Process environment first, then the file
    pub fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().or_else(|| self.get(name))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Env file location: explicit path, then `JIRA_MCP_ENV_PATH`, then the default
pub fn env_file_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("JIRA_MCP_ENV_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE))
}

fn normalize_server(raw: &str) -> Result<String, ConfigError> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::InvalidServer(raw.to_string()));
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.ends_with("://") {
        return Err(ConfigError::InvalidServer(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
