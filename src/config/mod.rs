//! Configuration Management
//!
//! This module handles named instance profiles, so targets can be referred to
//! by a short name instead of a full instance identifier plus login.
//!
//! # Configuration Locations
//! - Local: `.repl-article/config.json` (team-shareable, per-project)
//! - Global: `~/.config/repl-article/instances.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit credential parameters (highest priority)
//! 2. Local config file
//! 3. Global config file
//!
//! Names that match no profile are used verbatim as instance identifiers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::Credential;
use crate::provision::Target;

const APP_DIR: &str = "repl-article";
const LOCAL_DIR: &str = ".repl-article";

/// Configuration errors (file access, format, unresolvable secrets)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not access config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Invalid config file format in {path}: {source}")]
    Format { path: PathBuf, source: serde_json::Error },

    #[error("Environment variable {0} not found for password")]
    MissingPasswordEnv(String),

    #[error("Profile '{0}' names a user but no password or password_env")]
    MissingPassword(String),

    #[error("Could not determine config location: {0}")]
    Location(String),
}

impl ConfigError {
    /// Error code for the JSON error envelope
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        "CONFIG_ERROR"
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Instance profiles keyed by profile name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRegistry {
    #[serde(default)]
    pub instances: BTreeMap<String, StoredInstance>,
}

/// Stored instance profile
///
/// Passwords can be stored directly or referenced through an environment
/// variable that is read at use time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInstance {
    /// Instance identifier (`host`, `host,port`, `host\instance`)
    pub instance: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, prefer `password_env`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name holding the password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredInstance {
    /// Resolve the stored login, reading `password_env` if set
    pub fn credential(&self, profile: &str) -> ConfigResult<Option<Credential>> {
        let Some(user) = &self.user else {
            return Ok(None);
        };

        let password = match (&self.password_env, &self.password) {
            (Some(var), _) => std::env::var(var)
                .map_err(|_| ConfigError::MissingPasswordEnv(var.clone()))?,
            (None, Some(password)) => password.clone(),
            (None, None) => return Err(ConfigError::MissingPassword(profile.to_string())),
        };

        Ok(Some(Credential::new(user.clone(), password)))
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.repl-article/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/repl-article/instances.json` (per-user)
    Global,
}

impl ConfigLocation {
    pub fn path(self) -> ConfigResult<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.repl-article/config.json`)
pub fn local_config_path() -> ConfigResult<PathBuf> {
    let current_dir = std::env::current_dir()
        .map_err(|e| ConfigError::Location(format!("current directory unavailable: {e}")))?;

    Ok(current_dir.join(LOCAL_DIR).join("config.json"))
}

/// Get path to global config file (`~/.config/repl-article/instances.json`)
pub fn global_config_path() -> ConfigResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::Location("user config directory unavailable".to_string()))?;

    Ok(config_dir.join(APP_DIR).join("instances.json"))
}

/// Load a registry from a config file; a missing file is an empty registry
pub fn load_registry(path: &Path) -> ConfigResult<InstanceRegistry> {
    if !path.exists() {
        return Ok(InstanceRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

    serde_json::from_str(&contents)
        .map_err(|source| ConfigError::Format { path: path.to_path_buf(), source })
}

/// Save a registry to a config file, creating parent directories
pub fn save_registry(path: &Path, registry: &InstanceRegistry) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| ConfigError::Io { path: parent.to_path_buf(), source })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|source| ConfigError::Format { path: path.to_path_buf(), source })?;

    fs::write(path, contents).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}

/// Merge two registries; `local` profiles replace `global` ones with the same name
#[must_use]
pub fn merge(global: InstanceRegistry, local: InstanceRegistry) -> InstanceRegistry {
    let mut merged = global;
    merged.instances.extend(local.instances);
    merged
}

/// Load the merged view of the global and local registries
pub fn load_with_precedence() -> ConfigResult<InstanceRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(merge(global, local))
}

/// Turn a CLI instance argument into a target
///
/// `explicit` (credentials given on the command line) wins over anything
/// stored in a matching profile.
pub fn resolve_target(
    registry: &InstanceRegistry,
    name: &str,
    explicit: Option<&Credential>,
) -> ConfigResult<Target> {
    match registry.instances.get(name) {
        Some(stored) => {
            let credential = match explicit {
                Some(credential) => Some(credential.clone()),
                None => stored.credential(name)?,
            };
            Ok(Target { instance: stored.instance.clone(), credential })
        }
        None => Ok(Target { instance: name.to_string(), credential: explicit.cloned() }),
    }
}

/// Save an instance profile
pub fn save_instance(name: &str, stored: StoredInstance, location: ConfigLocation) -> ConfigResult<()> {
    let path = location.path()?;
    let mut registry = load_registry(&path)?;
    registry.instances.insert(name.to_string(), stored);
    save_registry(&path, &registry)
}

/// List all profiles in the merged view
pub fn list_instances() -> ConfigResult<Vec<(String, StoredInstance)>> {
    Ok(load_with_precedence()?.instances.into_iter().collect())
}
