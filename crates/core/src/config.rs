//! TOML-based configuration for uidsync.
//!
//! The API token is never stored in the file. The `api_key_env` field names
//! the environment variable that holds it, resolved at runtime via
//! [`SyncConfig::resolve_env_vars`]. Command-line flags are layered on top by
//! the binary before the config is handed to the pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration, built once per run and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote directory API settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Local account files and scan root.
    #[serde(default)]
    pub local: LocalConfig,

    /// Eligibility filters for reconciliation.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Log retrieval settings.
    #[serde(default)]
    pub logs: LogsConfig,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Remote directory API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL; `users/`, `groups/` and `logs/<source>/` are appended.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Resolved token (populated by `resolve_env_vars` or a CLI flag).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.foxpass.com/v1/".into()
}
fn default_api_key_env() -> String {
    "UIDSYNC_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// What to do with a local record that cannot be parsed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log a warning and continue without the record.
    #[default]
    Skip,
    /// Abort the run.
    Fail,
}

/// Local identity files and the filesystem subtree to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_passwd_path")]
    pub passwd_path: PathBuf,

    #[serde(default = "default_group_path")]
    pub group_path: PathBuf,

    /// Root of the ownership scan.
    #[serde(default = "default_scan_root")]
    pub scan_root: PathBuf,

    #[serde(default)]
    pub malformed_records: MalformedPolicy,

    /// Stay on the scan root's filesystem.
    #[serde(default = "default_true")]
    pub one_file_system: bool,
}

fn default_passwd_path() -> PathBuf {
    PathBuf::from("/etc/passwd")
}
fn default_group_path() -> PathBuf {
    PathBuf::from("/etc/group")
}
fn default_scan_root() -> PathBuf {
    PathBuf::from("/")
}
fn default_true() -> bool {
    true
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            passwd_path: default_passwd_path(),
            group_path: default_group_path(),
            scan_root: default_scan_root(),
            malformed_records: MalformedPolicy::default(),
            one_file_system: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Which local entities take part in reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Lowest UID considered (first non-system account).
    #[serde(default = "default_min_uid")]
    pub min_uid: u32,

    /// Lowest GID considered.
    #[serde(default = "default_min_gid")]
    pub min_gid: u32,

    /// Local usernames that are never remapped.
    #[serde(default)]
    pub ignore_users: BTreeSet<String>,

    /// Local group names that are never remapped.
    #[serde(default)]
    pub ignore_groups: BTreeSet<String>,
}

fn default_min_uid() -> u32 {
    1000
}
fn default_min_gid() -> u32 {
    500
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_uid: default_min_uid(),
            min_gid: default_min_gid(),
            ignore_users: BTreeSet::new(),
            ignore_groups: BTreeSet::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogsConfig {
    /// RADIUS client names mapped to their IP address, for `--location`.
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
}

impl LogsConfig {
    pub fn location_ip(&self, name: &str) -> Result<&str, ConfigError> {
        self.locations
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "logs.locations".into(),
                detail: format!("unknown location '{}'", name),
            })
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Load a [`SyncConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults. Used for
    /// the implicit per-user config location.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the API token from the environment unless one was already set.
    ///
    /// A missing variable only logs a warning; commands that talk to the
    /// remote directory fail later if no token is available.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.directory.api_key.is_none() {
            self.directory.api_key =
                resolve_optional_env(&self.directory.api_key_env, "directory.api_key_env");
        }
        Ok(())
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.directory.api_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "directory.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "directory.api_url".into(),
                detail: "API URL must start with http:// or https://".into(),
            });
        }
        if self.directory.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "directory.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        for (field, path) in [
            ("local.passwd_path", &self.local.passwd_path),
            ("local.group_path", &self.local.group_path),
            ("local.scan_root", &self.local.scan_root),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "path must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

/// Default per-user config location: `~/.config/uidsync/config.toml`.
pub fn default_config_path(config_dir: Option<PathBuf>) -> PathBuf {
    config_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join("uidsync")
        .join("config.toml")
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
            None
        }
    }
}
