//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [network]                # storage network and context
//! [session]                # session cache behaviour
//! [server]                 # advertised server identity
//! [schemas]                # NAME = schema document URL
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vault_session::{CacheConfig, EvictionPolicy};

/// Schema registry shipped with the server.
pub const DEFAULT_SCHEMAS: &[(&str, &str)] = &[
    (
        "DATA_CONNECTIONS",
        "https://vault.schemas.verida.io/data-connections/connection/v0.3.0/schema.json",
    ),
    (
        "SYNC_POSITION",
        "https://vault.schemas.verida.io/data-connections/sync-position/v0.2.0/schema.json",
    ),
    (
        "SYNC_LOG",
        "https://vault.schemas.verida.io/data-connections/activity-log/v0.2.0/schema.json",
    ),
    (
        "FOLLOWING",
        "https://common.schemas.verida.io/social/following/v0.1.0/schema.json",
    ),
    (
        "POST",
        "https://common.schemas.verida.io/social/post/v0.1.0/schema.json",
    ),
    (
        "EMAIL",
        "https://common.schemas.verida.io/social/email/v0.1.0/schema.json",
    ),
    (
        "FAVOURITE",
        "https://common.schemas.verida.io/favourite/v0.1.0/schema.json",
    ),
    (
        "FILE",
        "https://common.schemas.verida.io/file/v0.1.0/schema.json",
    ),
    (
        "CHAT_GROUP",
        "https://common.schemas.verida.io/social/chat/group/v0.1.0/schema.json",
    ),
    (
        "CHAT_MESSAGE",
        "https://common.schemas.verida.io/social/chat/message/v0.1.0/schema.json",
    ),
    (
        "CALENDAR",
        "https://common.schemas.verida.io/social/calendar/v0.1.0/schema.json",
    ),
    (
        "EVENT",
        "https://common.schemas.verida.io/social/event/v0.1.0/schema.json",
    ),
];

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Storage network configuration.
    pub network: Option<NetworkConfig>,

    /// Session cache configuration.
    pub session: Option<SessionConfig>,

    /// Server identity configuration.
    pub server: Option<ServerConfig>,

    /// Schema registry additions and overrides.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, String>,
}

impl VaultConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole; schema names are merged one by one.
    pub fn merge(&mut self, other: VaultConfig) {
        if other.network.is_some() {
            self.network = other.network;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.server.is_some() {
            self.server = other.server;
        }

        self.schemas.extend(other.schemas);
    }

    /// Network settings, defaulted when the section is absent.
    pub fn network(&self) -> NetworkConfig {
        self.network.clone().unwrap_or_default()
    }

    /// Session settings, defaulted when the section is absent.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Server settings, defaulted when the section is absent.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// The effective schema registry: defaults overlaid with `[schemas]`.
    pub fn schema_registry(&self) -> BTreeMap<String, String> {
        let mut registry: BTreeMap<String, String> = DEFAULT_SCHEMAS
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect();
        registry.extend(self.schemas.clone());
        registry
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Storage network configuration.
///
/// ```toml
/// [network]
/// name = "myrtle"
/// endpoint = "http://127.0.0.1:5984/"
/// context = "Verida: Vault"
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name (`myrtle`, `banksia` or `devnet`).
    pub name: String,
    /// Storage node endpoint.
    pub endpoint: String,
    /// Context opened for every identity.
    pub context: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token for the storage node. Prefer an environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "myrtle".to_string(),
            endpoint: "http://127.0.0.1:5984/".to_string(),
            context: "Verida: Vault".to_string(),
            timeout_secs: 30,
            auth_token: None,
        }
    }
}

impl NetworkConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether a bearer token is stored in plain text.
    pub fn has_plaintext_token(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which idle sessions the sweep may evict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eviction {
    /// Only sessions no caller still holds.
    #[default]
    IdleAndUnreferenced,
    /// Any idle session.
    IdleOnly,
}

impl From<Eviction> for EvictionPolicy {
    fn from(e: Eviction) -> Self {
        match e {
            Eviction::IdleAndUnreferenced => EvictionPolicy::IdleAndUnreferenced,
            Eviction::IdleOnly => EvictionPolicy::IdleOnly,
        }
    }
}

/// What a request does with its session once it is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// Drop the caller token and leave the session for the idle sweep.
    #[default]
    Detach,
    /// Close the session as soon as its last caller releases it.
    Eager,
}

/// Session cache configuration.
///
/// ```toml
/// [session]
/// idle_timeout_secs = 180
/// sweep_interval_secs = 60
/// sweep_on_acquire = true
/// eviction = "idle_and_unreferenced"
/// release = "detach"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a session may sit unused before it is reclaimed.
    pub idle_timeout_secs: u64,
    /// Seconds between background sweeps. Zero disables the task.
    pub sweep_interval_secs: u64,
    /// Whether each acquire triggers a sweep.
    pub sweep_on_acquire: bool,
    /// Eviction policy.
    pub eviction: Eviction,
    /// Release behaviour at the end of a request.
    pub release: ReleaseMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 180,
            sweep_interval_secs: 60,
            sweep_on_acquire: true,
            eviction: Eviction::default(),
            release: ReleaseMode::default(),
        }
    }
}

impl SessionConfig {
    /// Build the cache configuration.
    pub fn cache_config(&self) -> crate::Result<CacheConfig> {
        if self.idle_timeout_secs == 0 {
            return Err(crate::ConfigError::InvalidValue {
                field: "session.idle_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(CacheConfig::new()
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_eviction(self.eviction.into())
            .with_sweep_on_acquire(self.sweep_on_acquire)
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Identity the server reports during the protocol handshake.
///
/// ```toml
/// [server]
/// name = "vault/user-data"
/// version = "0.1.0"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
    /// Timeout in seconds when fetching schema documents.
    pub schema_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "vault/user-data".to_string(),
            version: "0.1.0".to_string(),
            schema_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = VaultConfig::from_toml("").unwrap();
        assert!(config.network.is_none());
        assert_eq!(config.network().name, "myrtle");
        assert_eq!(config.session().idle_timeout_secs, 180);
        assert_eq!(config.server().name, "vault/user-data");
        assert_eq!(config.schema_registry().len(), 12);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = VaultConfig::from_toml(
            r#"
[network]
name = "banksia"

[session]
eviction = "idle_only"
release = "eager"
"#,
        )
        .unwrap();

        let network = config.network();
        assert_eq!(network.name, "banksia");
        assert_eq!(network.context, "Verida: Vault");
        assert_eq!(network.timeout(), Duration::from_secs(30));

        let session = config.session();
        assert_eq!(session.eviction, Eviction::IdleOnly);
        assert_eq!(session.release, ReleaseMode::Eager);
        assert_eq!(session.sweep_interval_secs, 60);
    }

    #[test]
    fn test_unknown_eviction_is_rejected() {
        let err = VaultConfig::from_toml("[session]\neviction = \"never\"\n").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }

    #[test]
    fn test_schema_overrides_and_additions() {
        let config = VaultConfig::from_toml(
            r#"
[schemas]
POST = "https://example.com/post.json"
NOTE = "https://example.com/note.json"
"#,
        )
        .unwrap();
        let registry = config.schema_registry();
        assert_eq!(registry.len(), 13);
        assert_eq!(registry["POST"], "https://example.com/post.json");
        assert_eq!(registry["NOTE"], "https://example.com/note.json");
        assert!(registry.contains_key("CHAT_MESSAGE"));
    }

    #[test]
    fn test_merge_replaces_sections_and_extends_schemas() {
        let mut base = VaultConfig::from_toml(
            r#"
[network]
name = "banksia"
endpoint = "http://base:5984"

[schemas]
A = "https://a"
"#,
        )
        .unwrap();
        let overlay = VaultConfig::from_toml(
            r#"
[network]
endpoint = "http://overlay:5984"

[schemas]
B = "https://b"
"#,
        )
        .unwrap();

        base.merge(overlay);
        let network = base.network();
        assert_eq!(network.endpoint, "http://overlay:5984");
        // whole-section replacement
        assert_eq!(network.name, "myrtle");
        assert_eq!(base.schemas.len(), 2);
    }

    #[test]
    fn test_cache_config_conversion() {
        let session = SessionConfig {
            idle_timeout_secs: 5,
            sweep_interval_secs: 0,
            sweep_on_acquire: false,
            eviction: Eviction::IdleOnly,
            release: ReleaseMode::Detach,
        };
        let cache = session.cache_config().unwrap();
        assert_eq!(cache.idle_timeout, Duration::from_secs(5));
        assert_eq!(cache.eviction, EvictionPolicy::IdleOnly);
        assert!(!cache.sweep_on_acquire);
        assert!(!cache.enable_sweep_task);
    }

    #[test]
    fn test_zero_idle_timeout_is_invalid() {
        let session = SessionConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(session.cache_config().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = VaultConfig::new();
        config.network = Some(NetworkConfig {
            name: "devnet".into(),
            ..Default::default()
        });
        config.session = Some(SessionConfig::default());
        let text = config.to_toml().unwrap();
        assert!(text.contains("[network]"));
        assert!(!text.contains("auth_token"));
        assert_eq!(VaultConfig::from_toml(&text).unwrap(), config);
    }
}
