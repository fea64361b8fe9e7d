mod file;
mod memory;
mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::cli::Args;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("redis: {0}")] Redis(#[from] ::redis::RedisError),
    #[error("unsupported store type: {0}")] Unsupported(String),
}

/// String key-value store backing the cache and session records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub fn create_store(args: &Args) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match args.store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "file" => Ok(Arc::new(FileStore::new(&args.store_path))),
        "redis" => {
            let store = RedisStore::new(&args.store_redis_url, &args.store_redis_prefix)?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Unsupported(other.to_string())),
    }
}

pub fn initialize_store(args: &Args) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let location = match args.store_type.to_lowercase().as_str() {
        "file" => args.store_path.clone(),
        "redis" => args.store_redis_url.clone(),
        _ => "process memory".to_string(),
    };
    info!("Cached advisor data will be stored in: {} at {}", args.store_type, location);
    create_store(args)
}
