#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use clap::{Arg, Command};

mod mcp_server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let matches = Command::new("research-orchestrator")
        .version(VERSION)
        .about("Research orchestration MCP server: Graph-of-Thoughts session graphs, extraction/validation operators, and the decision engine driving a multi-agent research loop")
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("Path to the SQLite state database (default: ~/.claude/mcp-server/research_state.db)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("PATH")
                .help("Redirect tracing output to a file instead of stderr"),
        )
        .get_matches();

    let log_path = matches.get_one::<String>("log").map(PathBuf::from);
    init_tracing(log_path.as_deref());

    let mut config = orchestrator_core::ServerConfig::default();
    if let Some(db) = matches.get_one::<String>("db") {
        config = config.with_db_path(PathBuf::from(db));
    }
    config = config.with_log_path(log_path);

    if let Err(err) = mcp_server::start_mcp_server(config).await {
        tracing::error!(error = %err, "research orchestration server exited with an error");
        std::process::exit(1);
    }
}

/// Initialize `tracing`. stdout is reserved for the JSON-RPC transport, so
/// logs go to stderr unless `log_path` redirects them to a file.
fn init_tracing(log_path: Option<&std::path::Path>) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(file)
                        .with_ansi(false)
                        .init();
                }
                Err(e) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::io::stderr)
                        .with_ansi(false)
                        .init();
                    tracing::warn!(error = %e, path = %path.display(), "failed to open log file, falling back to stderr");
                }
            }
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();
        }
    }
}
