//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `$VAULT_CONFIG_DIR/config.toml`, else the platform config dir `vault/config.toml`
//! 2. `./vault.toml` (project-local)
//! 3. An explicit file passed on the command line

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, VaultConfig};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "vault.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for platform directory resolution.
const APP_NAME: &str = "vault";

/// Environment variable to override the config directory.
pub const CONFIG_DIR_ENV: &str = "VAULT_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: VaultConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext tokens).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None, None)
}

/// Load configuration with explicit control over every layer.
///
/// `config_dir` overrides both `VAULT_CONFIG_DIR` and the platform default.
/// `explicit` is layered last and, unlike the discovered layers, must exist
/// and parse.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = VaultConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    check_plaintext_tokens(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<VaultConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    VaultConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &VaultConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory.
///
/// Checks `VAULT_CONFIG_DIR` first, then falls back to the platform default
/// (`~/.config/vault` on Linux, `~/Library/Application Support/vault` on macOS).
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory for rolling log files.
pub fn log_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("logs"))
}

/// Try to load a config file and merge it into the existing config.
///
/// A missing file is skipped; a broken one is skipped with a warning.
fn load_layer(config: &mut VaultConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

fn check_plaintext_tokens(config: &VaultConfig, warnings: &mut Vec<String>) {
    if config
        .network
        .as_ref()
        .is_some_and(|n| n.has_plaintext_token())
    {
        warnings.push(
            "[network] contains a plaintext auth_token. \
             Consider passing it through the environment instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_shape() {
        if let Some(p) = config_path() {
            assert!(p.ends_with("config.toml"));
        }
        if let (Some(logs), Some(dir)) = (log_dir(), config_dir()) {
            assert_eq!(logs, dir.join("logs"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/vault.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert!(loaded.config.network.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_layers_merge_in_order() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();

        fs::write(
            user.path().join("config.toml"),
            r#"
[network]
name = "banksia"

[session]
idle_timeout_secs = 60

[schemas]
USER_ONLY = "https://user"
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("vault.toml"),
            r#"
[session]
idle_timeout_secs = 90
"#,
        )
        .unwrap();
        let explicit = extra.path().join("override.toml");
        fs::write(&explicit, "[server]\nname = \"custom\"\n").unwrap();

        let loaded = load_config_with_options(
            Some(project.path()),
            Some(user.path()),
            Some(&explicit),
        )
        .unwrap();

        let config = &loaded.config;
        assert_eq!(config.network().name, "banksia");
        assert_eq!(config.session().idle_timeout_secs, 90);
        assert_eq!(config.server().name, "custom");
        assert!(config.schema_registry().contains_key("USER_ONLY"));
        assert_eq!(loaded.loaded_from().len(), 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let missing = project.path().join("missing.toml");
        let err = load_config_with_options(Some(project.path()), Some(user.path()), Some(&missing))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("vault.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_plaintext_token_warning() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("vault.toml"),
            "[network]\nauth_token = \"secret\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = VaultConfig::new();
        config.schemas.insert("NOTE".into(), "https://note".into());

        save_config(&config, &path).unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
