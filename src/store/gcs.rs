use async_trait::async_trait;
use google_cloud_storage::{
    client::{google_cloud_auth::credentials::CredentialsFile, Client, ClientConfig},
    http::objects::{
        list::ListObjectsRequest,
        upload::{Media, UploadObjectRequest, UploadType},
    },
};
use std::path::Path;
use tokio::fs::File;
use tracing::{debug, info};

use super::{normalize_prefix, ObjectStore};
use crate::error::StorageError;

/// Google Cloud Storage bucket, optionally scoped under a prefix.
pub struct GcsStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl GcsStore {
    /// Authenticate and build a client. Without `credentials_file`, Application
    /// Default Credentials are used.
    pub async fn connect(
        bucket: impl Into<String>,
        prefix: Option<&str>,
        credentials_file: Option<&Path>,
    ) -> Result<Self, StorageError> {
        let config = match credentials_file {
            Some(path) => {
                let creds = CredentialsFile::new_from_file(path.display().to_string())
                    .await
                    .map_err(|e| StorageError::Auth(format!("{}: {}", path.display(), e)))?;
                ClientConfig::default().with_credentials(creds).await
            }
            None => ClientConfig::default().with_auth().await,
        }
        .map_err(|e| StorageError::Auth(e.to_string()))?;

        let store = Self {
            client: Client::new(config),
            bucket: bucket.into(),
            prefix: normalize_prefix(prefix),
        };
        info!(bucket = %store.bucket, prefix = %store.prefix, "connected to GCS");
        Ok(store)
    }

    fn object_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put_object(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        let object_name = self.object_name(key);
        let file = File::open(local_path).await?;
        let len = file.metadata().await?.len();

        let mut media = Media::new(object_name.clone());
        media.content_length = Some(len);
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };

        // streaming upload, the file is never buffered whole
        self.client
            .upload_object(&request, file, &UploadType::Simple(media))
            .await?;

        debug!(object = %object_name, bytes = len, "uploaded to GCS");
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: Some(self.object_name(prefix)),
            ..Default::default()
        };
        let response = self.client.list_objects(&request).await?;

        Ok(response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|o| match o.name.strip_prefix(self.prefix.as_str()) {
                Some(rest) => rest.to_string(),
                None => o.name.clone(),
            })
            .collect())
    }

    fn location(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, self.object_name(key))
    }
}
