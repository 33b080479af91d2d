//! `vault serve` - run the MCP server on stdio.

use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::Args;
use tracing::info;
use vault_client::{Account, NetworkClient, VaultSessionFactory};
use vault_mcp::{McpServer, SchemaRegistry, VaultHandler};
use vault_session::SessionCache;

use super::Context;

/// Arguments for `vault serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Hex private key of the account whose data is served
    #[arg(env = "VAULT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Network override (myrtle, banksia, devnet)
    #[arg(long)]
    pub network: Option<String>,

    /// Storage endpoint override
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bearer token for the storage node
    #[arg(long, env = "VAULT_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

/// Run `vault serve`.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let private_key = args
        .private_key
        .ok_or_else(|| anyhow!("Please provide a private key as a command-line argument"))?;

    let network = ctx.network(args.network.as_deref())?;
    let account =
        Account::from_private_key(&private_key, network).context("invalid private key")?;

    let network_cfg = ctx.config.network();
    let endpoint = args.endpoint.unwrap_or(network_cfg.endpoint.clone());
    let mut builder = NetworkClient::builder()
        .network(network)
        .endpoint(endpoint.as_str())
        .timeout(network_cfg.timeout());
    if let Some(token) = args.auth_token.or(network_cfg.auth_token.clone()) {
        builder = builder.auth_token(token);
    }
    let client = builder.build()?;

    let session_cfg = ctx.config.session();
    let cache = SessionCache::new(
        VaultSessionFactory::new(client, network_cfg.context.clone()),
        session_cfg.cache_config()?,
    );
    cache.spawn_sweeper();

    let server_cfg = ctx.config.server();
    let registry = SchemaRegistry::new(ctx.config.schema_registry())?
        .with_timeout(Duration::from_secs(server_cfg.schema_timeout_secs));

    info!(
        did = %account.did(),
        network = %network,
        endpoint = %endpoint,
        context = %network_cfg.context,
        schemas = registry.len(),
        "Starting MCP server"
    );

    let handler = VaultHandler::new(cache, private_key, registry)
        .with_server_info(server_cfg.name, server_cfg.version)
        .with_release_mode(session_cfg.release);
    McpServer::new(handler).serve_stdio().await?;
    Ok(())
}
