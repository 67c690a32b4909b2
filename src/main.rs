use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use jira_mcp::config::{self, ConfigOverrides, EnvFile, JiraConfig};
use jira_mcp::jira::{JiraClient, Tracker};
use jira_mcp::logging::{self, LogSettings};
use jira_mcp::mcp::tools::registry::catalog;
use jira_mcp::mcp::transport::LineTransport;
use jira_mcp::mcp::{MCPServer, ToolRegistry};

type RunResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "jira-mcp", version)]
#[command(about = "MCP server exposing Jira projects, issues and comments as tools")]
struct Args {
    /// Environment file with Jira settings (default: $JIRA_MCP_ENV_PATH or ./jira_mcp.env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log level, overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Log file, overrides JIRA_MCP_LOG_FILE
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Per-request timeout in seconds, overrides JIRA_TIMEOUT
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the MCP server on stdin/stdout (default)
    Serve,
    /// Print the tool catalog and exit
    Tools,
    /// Connect to Jira and list a few projects
    Check,
}

/// Commands that talk to Jira. `tools` needs neither config nor logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Serve,
    Check,
}

impl Command {
    fn session(self) -> Option<Session> {
        match self {
            Command::Serve => Some(Session::Serve),
            Command::Check => Some(Session::Check),
            Command::Tools => None,
        }
    }
}

fn print_catalog() -> ExitCode {
    match serde_json::to_string_pretty(catalog()) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render tool catalog: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let Some(session) = args.command.unwrap_or(Command::Serve).session() else {
        return print_catalog();
    };

    let env_path = config::env_file_path(args.env_file.as_deref());
    let env_file = match EnvFile::load(&env_path) {
        Ok(env_file) => env_file,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = LogSettings::from_lookup(
        |name| env_file.lookup(name),
        args.log_level.as_deref(),
        args.log_file.as_deref(),
    );
    let _guard = match logging::init(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match env_file.path() {
        Some(path) => info!("Loaded {} settings from {}", env_file.len(), path.display()),
        None => warn!(
            "Environment file {} not found, using process environment only",
            env_path.display()
        ),
    }

    let overrides = ConfigOverrides {
        timeout_secs: args.timeout,
    };

    match run(session, &env_file, &overrides).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(session: Session, env_file: &EnvFile, overrides: &ConfigOverrides) -> RunResult {
    let config = JiraConfig::from_env(env_file, overrides)?;
    info!(
        "Using Jira at {} with {} auth, timeout {:?}",
        config.server,
        config.auth.label(),
        config.timeout
    );
    let client = Arc::new(JiraClient::new(&config)?);

    match session {
        Session::Serve => {
            let server = MCPServer::new(ToolRegistry::new(client, config.timeout));
            let mut transport = LineTransport::stdio();
            server.serve(&mut transport).await?;
        }
        Session::Check => {
            let projects = client.list_projects().await?;
            println!("Connected to {}: {} projects visible", config.server, projects.len());
            for project in projects.iter().take(3) {
                println!("  {}  {}", project.key, project.name);
            }
        }
    }

    Ok(())
}
