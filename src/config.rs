//! Configuration for the server

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::http::HttpConfig;

/// Server configuration
///
/// The config is usually loaded from a file with [`Self::load`].
///
/// The struct also implements [`Default`] which creates a config suitable for
/// local development and testing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Config for the HTTP server.
    pub http: HttpConfig,
    /// Which storage backend to use, and where its database lives.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Config for the auth gate.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Storage backend selection.
///
/// The backend is picked here once at process start; there is no per-call
/// branching anywhere else. When `path` is unset, the database lives in the
/// data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Relational backend over SQLite.
    Sqlite {
        /// Path to the database file.
        path: Option<PathBuf>,
    },
    /// Key-value backend over redb.
    Redb {
        /// Path to the database file.
        path: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite { path: None }
    }
}

/// The config for the auth gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Server-side salt prepended to client credentials before hashing.
    ///
    /// Must be changed for any real deployment.
    pub password_salt: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_salt: "default-salt-change-me".to_string(),
        }
    }
}

impl Config {
    /// Load the config from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
        let s = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("failed to read {}", path.as_ref().to_string_lossy()))?;
        let config: Config = toml::from_str(&s)?;
        Ok(config)
    }

    /// Get the data directory.
    pub fn data_dir() -> Result<PathBuf> {
        let dir = if let Some(val) = env::var_os("READER_SYNC_DATA_DIR") {
            PathBuf::from(val)
        } else {
            let path = dirs_next::data_dir().ok_or_else(|| {
                anyhow!("operating environment provides no directory for application data")
            })?;
            path.join("reader-sync")
        };
        Ok(dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                port: 8080,
                bind_addr: None,
            },
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}
