//! `vault schemas` - list the schema registry.

use anyhow::Result;
use clap::Args;
use vault_mcp::SchemaRegistry;

use super::Context;

/// Arguments for `vault schemas`.
#[derive(Args, Debug)]
pub struct SchemasArgs {
    /// Show resource URIs as well
    #[arg(long)]
    pub uris: bool,
}

/// Run `vault schemas`.
pub async fn run(args: SchemasArgs, ctx: &Context) -> Result<()> {
    let registry = ctx.config.schema_registry();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&registry)?);
        return Ok(());
    }

    let width = registry.keys().map(String::len).max().unwrap_or(0);
    for (name, url) in &registry {
        println!("{name:<width$}  {url}");
        if args.uris {
            println!("{:<width$}  {}", "", SchemaRegistry::resource_uri(name));
        }
    }
    Ok(())
}
