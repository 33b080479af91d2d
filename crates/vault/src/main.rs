//! Vault - read-only MCP query server over per-identity data contexts.
//!
//! Main entry point for the vault CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

mod commands;

use commands::{identity, schemas, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Vault - serve read-only queries over your data vault to MCP clients
#[derive(Parser)]
#[command(name = "vault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Additional config file layered over the discovered ones
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to look for a project-local vault.toml in
    #[arg(long, global = true, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdin/stdout
    Serve(serve::ServeArgs),

    /// Print the identity derived from a private key
    Identity(identity::IdentityArgs),

    /// List the schemas exposed as resources
    Schemas(schemas::SchemasArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol, so human-readable logs go to stderr
    let filter = if cli.verbose {
        "vault=debug,vault_mcp=debug,vault_session=debug,vault_client=debug,vault_config=debug,info"
    } else {
        "vault=info,vault_mcp=info,vault_session=info,vault_client=info,warn"
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let log_dir = vault_config::log_dir().unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "vault.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "vault=trace,vault_mcp=trace,vault_session=trace,vault_client=trace,vault_config=trace,info",
                )),
        )
        .init();

    let loaded = vault_config::load_config_with_options(
        cli.project_dir.as_deref(),
        None,
        cli.config.as_deref(),
    )?;
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    let ctx = commands::Context {
        config: loaded.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Identity(args) => identity::run(args, &ctx).await,
        Commands::Schemas(args) => schemas::run(args, &ctx).await,
    }
}
