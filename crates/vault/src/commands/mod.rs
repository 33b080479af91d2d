//! CLI command handlers.

pub mod identity;
pub mod schemas;
pub mod serve;

use anyhow::Result;
use vault_client::Network;
use vault_config::VaultConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: VaultConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Network to use: the override if given, else the configured one.
    pub fn network(&self, override_name: Option<&str>) -> Result<Network> {
        let configured = self.config.network();
        let name = override_name.unwrap_or(&configured.name);
        Ok(name.parse()?)
    }
}
