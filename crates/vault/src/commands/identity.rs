//! `vault identity` - show the identity a private key maps to.

use anyhow::{Context as _, Result};
use clap::Args;
use vault_client::Account;

use super::Context;

/// Arguments for `vault identity`.
#[derive(Args, Debug)]
pub struct IdentityArgs {
    /// Hex private key (0x prefix optional)
    #[arg(env = "VAULT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Network to derive the identity on (default: from config)
    #[arg(long)]
    pub network: Option<String>,
}

/// Run `vault identity`.
pub async fn run(args: IdentityArgs, ctx: &Context) -> Result<()> {
    let network = ctx.network(args.network.as_deref())?;
    let account =
        Account::from_private_key(&args.private_key, network).context("cannot derive identity")?;

    if ctx.json_output {
        let out = serde_json::json!({
            "did": account.did(),
            "address": account.address(),
            "network": network.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", account.did());
        if ctx.verbose {
            println!("  network: {network}");
            println!("  address: {}", account.address());
        }
    }
    Ok(())
}
