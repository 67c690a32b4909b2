use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILE: &str = "jira_mcp.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Where and how verbosely to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub file: PathBuf,
}

impl LogSettings {
    /// Resolve from `LOG_LEVEL` / `JIRA_MCP_LOG_FILE`, explicit values winning
    pub fn from_lookup<F>(lookup: F, level: Option<&str>, file: Option<&Path>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = level
            .map(str::to_string)
            .or_else(|| lookup("LOG_LEVEL"))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let file = file
            .map(Path::to_path_buf)
            .or_else(|| lookup("JIRA_MCP_LOG_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Self {
            level: normalize_level(&level),
            file,
        }
    }
}

/// Map level names used by other logging stacks onto tracing's
fn normalize_level(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => DEFAULT_LOG_LEVEL.to_string(),
        other => other.to_string(),
    }
}

/// Install the global subscriber: stderr plus an append-only log file.
///
/// Stdout is reserved for protocol traffic. The returned guard flushes the
/// file writer on drop and must live as long as the process.
pub fn init(settings: &LogSettings) -> Result<WorkerGuard, LoggingError> {
    let directory = settings
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = settings
        .file
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(settings.file.display().to_string()))?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LogSettings::from_lookup(|_| None, None, None);
        assert_eq!(settings.level, "info");
        assert_eq!(settings.file, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn test_environment_and_explicit_values() {
        let lookup = |name: &str| match name {
            "LOG_LEVEL" => Some("WARNING".to_string()),
            "JIRA_MCP_LOG_FILE" => Some("/var/tmp/jira.log".to_string()),
            _ => None,
        };

        let settings = LogSettings::from_lookup(lookup, None, None);
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.file, PathBuf::from("/var/tmp/jira.log"));

        let settings = LogSettings::from_lookup(lookup, Some("DEBUG"), Some(Path::new("local.log")));
        assert_eq!(settings.level, "debug");
        assert_eq!(settings.file, PathBuf::from("local.log"));
    }

    #[test]
    fn test_path_without_file_name_is_rejected() {
        let settings = LogSettings {
            level: "info".to_string(),
            file: PathBuf::from("/"),
        };

        match init(&settings) {
            Err(LoggingError::InvalidPath(path)) => assert_eq!(path, "/"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("a directory is not a log file"),
        }
    }
}
