//! Client for the vault storage network.
//!
//! Provides the concrete session factory used by the server:
//!
//! - [`Account`] derives an identity from a private key
//! - [`NetworkClient`] talks to a storage node over HTTP
//! - [`Context`] and [`Datastore`] run read-only queries for one identity
//! - [`VaultSessionFactory`] plugs all of that into a `vault_session::SessionCache`
//!
//! # Example
//!
//! ```no_run
//! use vault_client::{NetworkClient, Network, VaultSessionFactory};
//! use vault_session::{CacheConfig, SessionCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NetworkClient::builder()
//!     .network(Network::Myrtle)
//!     .endpoint("http://127.0.0.1:5984")
//!     .build()?;
//! let cache = SessionCache::new(
//!     VaultSessionFactory::new(client, "Verida: Vault"),
//!     CacheConfig::default(),
//! );
//!
//! let session = cache.acquire(&"11".repeat(32), "req-1").await?;
//! let store = session.context().open_datastore("https://example.com/post/schema.json")?;
//! println!("{} rows", store.row_count().await?);
//! cache.detach(session.did(), "req-1");
//! # Ok(())
//! # }
//! ```

mod account;
mod client;
mod context;
mod datastore;
mod error;
mod factory;
mod network;

pub use account::{Account, is_valid_did};
pub use client::{ClientBuilder, NetworkClient, ServerInfo};
pub use context::Context;
pub use datastore::{Datastore, DbInfo, FindOptions, IndexList};
pub use error::{Error, Result};
pub use factory::{VaultSession, VaultSessionFactory};
pub use network::Network;
