//! Identity-keyed session cache.
//!
//! This crate caches expensive network sessions per identity with:
//! - Single-flight establishment so concurrent callers share one connection attempt
//! - Caller-token reference tracking with explicit release
//! - Idle expiry through an opportunistic and a periodic sweep
//! - A [`SessionFactory`] seam so the cache never talks to the network itself
//!
//! # Example
//!
//! ```rust,ignore
//! use vault_session::{CacheConfig, SessionCache};
//!
//! let config = CacheConfig::default().with_idle_timeout(Duration::from_secs(180));
//! let cache = SessionCache::new(factory, config);
//! cache.spawn_sweeper();
//!
//! let session = cache.acquire(&private_key, "req-1").await?;
//! // ... use the session ...
//! cache.release(session.identity(), "req-1").await;
//!
//! cache.shutdown().await;
//! ```

mod cache;
mod config;
mod error;
mod factory;
mod flight;

pub use cache::{CacheStats, EntryInfo, SessionCache};
pub use config::{CacheConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_SWEEP_INTERVAL, EvictionPolicy};
pub use error::{Error, Result};
pub use factory::{FactoryError, Session, SessionFactory};
pub use flight::{Flight, SingleFlight, Ticket};
