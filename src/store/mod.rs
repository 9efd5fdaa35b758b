// src/store/mod.rs
//
// Durable object storage as the pipeline sees it: put a file, list by prefix.

use async_trait::async_trait;
use std::{path::Path, sync::Arc};

use crate::config::StorageConfig;
use crate::error::StorageError;

pub mod gcs;
pub mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy the file at `local_path` to `key`, replacing any existing object.
    async fn put_object(&self, local_path: &Path, key: &str) -> Result<(), StorageError>;

    /// Keys of all objects whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Human-readable location of `key`, for logs and reports.
    fn location(&self, key: &str) -> String;
}

/// Open the store a config names.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Gcs {
            bucket,
            prefix,
            credentials_file,
        } => Arc::new(
            GcsStore::connect(bucket.clone(), prefix.as_deref(), credentials_file.as_deref())
                .await?,
        ),
        StorageConfig::Local { root } => Arc::new(LocalStore::new(root)),
    };
    Ok(store)
}

/// Normalize a bucket prefix to either "" or "something/".
pub(crate) fn normalize_prefix(prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or("").trim_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}
