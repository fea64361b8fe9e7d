use super::{ KeyValueStore, StoreError };
use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use tokio::fs;
use uuid::Uuid;

/// One file per key. File names are the hex encoding of the key, so e-mail
/// addresses and other punctuation never reach the filesystem.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        let path = self.path_for(key);
        // Each writer gets its own temp file; the rename is the only shared step.
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(e) = fs::write(&tmp, value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::rename(&tmp, &path).await?;
        debug!("Stored '{}' at {}", key, path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let key = "recommendations_jane@example.com";

        FileStore::new(dir.path()).set(key, r#"{"data":1}"#).await.unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get(key).await.unwrap().as_deref(), Some(r#"{"data":1}"#));
    }

    #[tokio::test]
    async fn missing_keys_read_as_none_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get("absent").await.unwrap(), None);
        store.remove("absent").await.unwrap();

        store.set("present", "x").await.unwrap();
        store.remove("present").await.unwrap();
        assert_eq!(store.get("present").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_key_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));

        for round in 0..5 {
            let writers: Vec<_> = (0..16)
                .map(|i| {
                    let store = Arc::clone(&store);
                    let value = serde_json::json!({ "round": round, "writer": i, "pad": "x".repeat(200_000) })
                        .to_string();
                    tokio::spawn(async move { store.set("k", &value).await })
                })
                .collect();

            for writer in writers {
                writer.await.unwrap().unwrap();
            }

            let stored = store.get("k").await.unwrap().unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&stored).unwrap();
            assert_eq!(parsed["round"], round);
        }

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn distinct_keys_map_to_distinct_files() {
        let store = FileStore::new("/tmp/unused");
        assert_ne!(store.path_for("a.b"), store.path_for("a_b"));
    }
}
