//! Time-boxed read-through cache over a [`KeyValueStore`].
//!
//! Each key holds one JSON record `{"data": ..., "timestamp": <unix millis>}`.
//! A record is fresh while `now - timestamp < ttl`.

use crate::storage::KeyValueStore;
use chrono::{ DateTime, Utc };
use log::{ debug, info, warn };
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub data: T,
    pub timestamp: i64,
}

impl<T> CacheRecord<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age_ms = now.timestamp_millis().saturating_sub(self.timestamp);
        i128::from(age_ms) < (ttl.as_millis() as i128)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetched<T> {
    pub data: T,
    pub served_from_cache: bool,
}

#[derive(Clone)]
pub struct CacheGate {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl CacheGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reads the stored record for `key` regardless of its age.
    ///
    /// Unreadable or malformed records are logged and reported as absent.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRecord<T>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return None;
            }
            Err(e) => {
                warn!("Cache read for '{}' failed, treating as miss: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<CacheRecord<T>>(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Discarding corrupt cache record '{}': {}", key, e);
                None
            }
        }
    }

    /// Returns the cached payload while it is fresh, otherwise runs `fetch` and
    /// stores its result.
    ///
    /// A failed fetch is returned as-is and leaves the stored record untouched.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        fetch: F
    ) -> Result<Fetched<T>, E>
        where
            T: Serialize + DeserializeOwned,
            F: FnOnce() -> Fut,
            Fut: Future<Output = Result<T, E>>
    {
        if !force_refresh {
            if let Some(record) = self.peek::<T>(key).await {
                if record.is_fresh(self.clock.now(), ttl) {
                    debug!("Cache hit for '{}'", key);
                    return Ok(Fetched { data: record.data, served_from_cache: true });
                }
                debug!("Cache record for '{}' is stale", key);
            }
        } else {
            info!("Forced refresh for '{}'", key);
        }

        let data = fetch().await?;
        self.put(key, &data).await;
        Ok(Fetched { data, served_from_cache: false })
    }

    /// Stores `data` stamped with the current time. Write failures are logged;
    /// the caller already holds the data.
    pub async fn put<T: Serialize>(&self, key: &str, data: &T) {
        let record = CacheRecord {
            data,
            timestamp: self.clock.now().timestamp_millis(),
        };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache record '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json).await {
            warn!("Failed to write cache record '{}': {}", key, e);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!("Failed to remove cache record '{}': {}", key, e);
        }
    }
}
