//! Filesystem-backed object bucket.
//!
//! Objects live under `<root>/<bucket>/<key>`; each one has a JSON sidecar
//! (`<key>.meta.json`) recording its content type and size.  Public URLs are
//! composed from the CDN origin, the storage account and the bucket's CDN path,
//! the way an S3-compatible service fronted by a CDN would expose them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;

const META_SUFFIX: &str = ".meta.json";

/// Metadata stored next to every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub content_type: String,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    bucket_path: PathBuf,
    /// Path segment naming the bucket in public URLs.
    cdn_path: String,
    account: String,
    cdn_origin: String,
    max_size: usize,
}

impl ObjectStore {
    pub async fn new(
        root: &Path,
        bucket: &str,
        cdn_path: &str,
        account: &str,
        cdn_origin: &str,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        let bucket_path = root.join(bucket);
        fs::create_dir_all(&bucket_path).await.map_err(|e| {
            ServerError::ObjectStorage(format!(
                "Failed to create bucket directory '{}': {}",
                bucket_path.display(),
                e
            ))
        })?;

        info!(path = %bucket_path.display(), bucket, "Object store initialized");

        Ok(Self {
            bucket_path,
            cdn_path: cdn_path.to_string(),
            account: account.to_string(),
            cdn_origin: cdn_origin.trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub async fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        Self::new(
            &config.object_store_path,
            &config.bucket,
            &config.cdn_bucket_path,
            &config.storage_account,
            &config.cdn_origin,
            config.max_avatar_size,
        )
        .await
    }

    /// Write an object and its metadata sidecar.
    ///
    /// Both land in temporary files first.  The sidecar is renamed into
    /// place before the object, and any failure removes whatever was
    /// staged, so a failed put leaves no object behind.
    pub async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ObjectMeta, ServerError> {
        if data.is_empty() {
            return Err(ServerError::ObjectStorage("Empty object".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::PayloadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServerError::ObjectStorage(format!("Failed to create prefix for {key}: {e}"))
            })?;
        }

        let meta = ObjectMeta {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: data.len(),
            stored_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| ServerError::Internal(format!("Failed to encode metadata: {e}")))?;

        let staging = Uuid::new_v4();
        let tmp_data = path.with_extension(format!("tmp-{staging}"));
        let tmp_meta = path.with_extension(format!("meta-tmp-{staging}"));
        let final_meta = meta_path(&path);

        let staged: Result<(), ServerError> = async {
            fs::write(&tmp_data, data)
                .await
                .map_err(|e| ServerError::ObjectStorage(format!("Failed to write {key}: {e}")))?;
            fs::write(&tmp_meta, &meta_json).await.map_err(|e| {
                ServerError::ObjectStorage(format!("Failed to write metadata for {key}: {e}"))
            })?;
            fs::rename(&tmp_meta, &final_meta).await.map_err(|e| {
                ServerError::ObjectStorage(format!("Failed to commit metadata for {key}: {e}"))
            })
        }
        .await;
        if let Err(e) = staged {
            discard(&[tmp_data.as_path(), tmp_meta.as_path()]).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_data, &path).await {
            discard(&[tmp_data.as_path(), final_meta.as_path()]).await;
            return Err(ServerError::ObjectStorage(format!(
                "Failed to commit {key}: {e}"
            )));
        }

        debug!(key, size = data.len(), content_type, "Stored object");
        Ok(meta)
    }

    /// Public URL under which the CDN serves `key`.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/projects/{}/{}/{}",
            self.cdn_origin, self.account, self.cdn_path, key
        )
    }

    /// Map a key onto the bucket directory, rejecting anything that could
    /// escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, ServerError> {
        validate_key(key)?;
        Ok(key
            .split('/')
            .fold(self.bucket_path.clone(), |path, segment| path.join(segment)))
    }
}

#[cfg(test)]
impl ObjectStore {
    /// Read an object back, as the CDN would serve it.
    pub async fn get_object(&self, key: &str) -> std::io::Result<Vec<u8>> {
        let path = self.object_path(key).map_err(std::io::Error::other)?;
        fs::read(path).await
    }

    pub async fn head_object(&self, key: &str) -> std::io::Result<ObjectMeta> {
        let path = meta_path(&self.object_path(key).map_err(std::io::Error::other)?);
        let raw = fs::read(path).await?;
        serde_json::from_slice(&raw).map_err(std::io::Error::other)
    }
}

async fn discard(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}

fn meta_path(object_path: &Path) -> PathBuf {
    let mut name = object_path.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

/// Check that every `/`-separated segment of `key` is a plain name.
pub fn validate_key(key: &str) -> Result<(), ServerError> {
    let traversal = || ServerError::validation("Invalid object key");

    if key.is_empty() || key.ends_with(META_SUFFIX) {
        return Err(traversal());
    }
    for segment in key.split('/') {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains('\\')
            || segment.chars().any(char::is_control)
        {
            return Err(traversal());
        }
    }
    Ok(())
}
