use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::intake::BaselinePolicy;
use crate::roles::{RoleHierarchy, RoleLevels};
use crate::store::{MemoryStore, SharedStore};

/// Where items and history are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local; contents are lost on restart.
    #[default]
    Memory,
    /// Embedded RocksDB (feature `rocksdb-store`).
    Rocksdb { path: PathBuf },
    /// Shared Postgres database (feature `postgres`).
    Postgres { url: String },
}

/// Top-level moderation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Account level threshold per tier.
    pub roles: RoleLevels,
    /// Starting tier per reason code.
    pub baseline: BaselinePolicy,
    pub store: StoreConfig,
}

impl ModerationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse moderation config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Defaults, then `MODERATION_CONFIG`, then the store overrides.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("MODERATION_CONFIG") {
            Ok(path) => Self::load(&path)?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MODERATION_STORE_PATH` (rocksdb) and `MODERATION_DATABASE_URL`
    /// (postgres). The database URL wins when both are set.
    pub fn with_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = get("MODERATION_STORE_PATH").filter(|p| !p.is_empty()) {
            self.store = StoreConfig::Rocksdb {
                path: PathBuf::from(path),
            };
        }
        if let Some(url) = get("MODERATION_DATABASE_URL").filter(|u| !u.is_empty()) {
            self.store = StoreConfig::Postgres { url };
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.roles
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid [roles] levels")?;
        Ok(())
    }

    pub fn hierarchy(&self) -> Result<RoleHierarchy> {
        RoleHierarchy::new(self.roles).map_err(anyhow::Error::msg)
    }
}

/// Open the configured backend.
pub async fn open_store(config: &StoreConfig) -> Result<SharedStore> {
    match config {
        StoreConfig::Memory => {
            info!(backend = "memory", "Opening moderation store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Rocksdb { path } => open_rocksdb(path),
        StoreConfig::Postgres { url } => open_postgres(url).await,
    }
}

#[cfg(feature = "rocksdb-store")]
fn open_rocksdb(path: &Path) -> Result<SharedStore> {
    info!(backend = "rocksdb", path = %path.display(), "Opening moderation store");
    let store = crate::store::RocksStore::open(path)
        .with_context(|| format!("Failed to open RocksDB at {}", path.display()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb-store"))]
fn open_rocksdb(path: &Path) -> Result<SharedStore> {
    anyhow::bail!(
        "store backend 'rocksdb' ({}) requires the `rocksdb-store` feature",
        path.display()
    )
}

#[cfg(feature = "postgres")]
async fn open_postgres(url: &str) -> Result<SharedStore> {
    info!(backend = "postgres", "Opening moderation store");
    let store = crate::store::PostgresStore::connect(url)
        .await
        .context("Failed to connect to Postgres")?;
    store
        .migrate()
        .await
        .context("Failed to apply moderation schema")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_url: &str) -> Result<SharedStore> {
    anyhow::bail!("store backend 'postgres' requires the `postgres` feature")
}
