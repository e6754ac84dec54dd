//! S3/R2-compatible bucket.
//!
//! Requests are SigV4-signed by `object_store`'s Amazon S3 client, addressed
//! path-style (`{endpoint}/{bucket}/{key}`), and never retried. Bodies are
//! exposed as blocking readers: the async byte stream is adapted with
//! `StreamReader` and bridged with `SyncIoBridge`, so reads must happen on a
//! blocking thread.

use std::sync::Arc;

use ::object_store::aws::AmazonS3Builder;
use ::object_store::path::Path;
use ::object_store::{ObjectStore as _, RetryConfig};
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::application::ports::{ObjectReader, ObjectStore, StoreError};
use crate::infrastructure::config::ObjectStoreSettings;

/// Signed bucket client.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Arc<dyn ::object_store::ObjectStore>,
    bucket: String,
}

impl S3ObjectStore {
    /// Client for the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if the endpoint or credentials are
    /// rejected by the client builder.
    pub fn new(settings: &ObjectStoreSettings) -> Result<Self, StoreError> {
        let client = AmazonS3Builder::new()
            .with_endpoint(settings.endpoint.trim_end_matches('/'))
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_access_key_id(settings.credentials.access_key_id())
            .with_secret_access_key(settings.credentials.secret_access_key())
            .with_virtual_hosted_style_request(false)
            .with_allow_http(true)
            .with_retry(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            })
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            bucket: settings.bucket.clone(),
        })
    }
}

fn store_error(key: &str, err: ::object_store::Error) -> StoreError {
    match err {
        ::object_store::Error::NotFound { .. } => StoreError::NotFound(key.to_string()),
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "r2"
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Listing prefixes are whole path segments ("" or "<timeframe>/").
        let prefix = prefix.trim_end_matches('/');
        let location = (!prefix.is_empty()).then(|| Path::from(prefix));

        let mut keys: Vec<String> = self
            .client
            .list(location.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|e| StoreError::Transport(format!("listing {} failed: {e}", self.bucket)))?;

        keys.sort();
        tracing::debug!(prefix, count = keys.len(), "Listed bucket");
        Ok(keys)
    }

    async fn open(&self, key: &str) -> Result<ObjectReader, StoreError> {
        let result = self
            .client
            .get(&Path::from(key))
            .await
            .map_err(|e| store_error(key, e))?;

        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(SyncIoBridge::new(StreamReader::new(stream))))
    }
}
