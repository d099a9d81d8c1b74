//! Client configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/datameta/cli.toml`
//! - Windows: `%APPDATA%/datameta/cli.toml`
//!
//! The file holds the API token, so it is written with owner-only
//! permissions on Unix.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use datameta_protocol::DEFAULT_API_PREFIX;
use datameta_transfer::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the DataMeta instance, e.g. `https://datameta.example.org`.
    #[serde(default)]
    pub server_url: String,

    /// Path prefix of the REST API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// API key obtained with `datameta login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Block size for hashing and transfer, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Label given to API keys created by `login` (hostname by default).
    #[serde(default = "default_key_label")]
    pub key_label: String,

    /// Account the stored key belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Server-side id of the stored key, revoked by `logout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_key_label() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| format!("datameta-cli@{h}"))
        .unwrap_or_else(|| "datameta-cli".into())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_prefix: default_api_prefix(),
            token: None,
            chunk_size: default_chunk_size(),
            key_label: default_key_label(),
            user_id: None,
            key_id: None,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or the default location.
    /// A missing file yields the defaults without creating it.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = resolve(path)?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Saves the configuration to `path`, or the default location.
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = resolve(path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(path)
    }
}

fn resolve(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => config_path(),
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("datameta").join("cli.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME is not set; pass --config"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("datameta")
            .join("cli.toml"))
    }
}
