//! Durable key-value storage for the session snapshot.
//!
//! The manager is the only writer. Backends: in-memory, JSON file, Redis.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, SnapshotBackend};

pub mod file;
pub mod memory;
pub mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// A string-keyed, string-valued persistence surface.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Builds the store selected by `SNAPSHOT_BACKEND`.
pub async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    let store: Arc<dyn SnapshotStore> = match &config.snapshot_backend {
        SnapshotBackend::Memory => {
            info!("Using in-memory session storage (snapshots do not survive restarts)");
            Arc::new(MemoryStore::default())
        }
        SnapshotBackend::File(path) => {
            info!("Using file session storage at {}", path.display());
            Arc::new(FileStore::new(path.clone()))
        }
        SnapshotBackend::Redis(url) => {
            info!("Connecting to Redis session storage...");
            let store = RedisStore::connect(url).await?;
            info!("Redis session storage ready");
            Arc::new(store)
        }
    };
    Ok(store)
}
