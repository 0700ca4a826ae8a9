use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::config::Settings;

const MAX_FILENAME_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub(crate) key: String,
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

impl StoredObject {
    pub(crate) fn describe(key: &str, bytes: &[u8]) -> Self {
        Self { key: key.to_string(), size: bytes.len() as i64, sha256: hex::encode(Sha256::digest(bytes)) }
    }
}

#[async_trait]
pub(crate) trait ObjectStorage: Send + Sync {
    async fn store(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> anyhow::Result<StoredObject>;
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

pub(crate) async fn storage_from_settings(
    settings: &Settings,
) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    if let Some(s3) = S3ObjectStorage::from_settings(settings).await? {
        tracing::info!(bucket = %settings.s3().bucket, "Using S3 object storage");
        return Ok(Arc::new(s3));
    }

    tracing::info!(root = %settings.storage().local_root, "Using local filesystem storage");
    Ok(Arc::new(LocalObjectStorage::new(&settings.storage().local_root)))
}

/// `papers/<owner>/<uuid>_<name>`; the uuid keeps repeated uploads apart.
pub(crate) fn paper_object_key(owner_id: &str, filename: &str) -> String {
    format!("papers/{}/{}_{}", sanitize_segment(owner_id), Uuid::new_v4(), sanitize_filename(filename))
}

pub(crate) fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "upload".to_string();
    }

    let mut truncated: String = cleaned.chars().rev().take(MAX_FILENAME_LEN).collect();
    truncated = truncated.chars().rev().collect();
    truncated
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub(crate) struct S3ObjectStorage {
    client: Client,
    bucket: String,
}

impl S3ObjectStorage {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if !settings.s3().is_configured() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "papercheck-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds);
        if !settings.s3().endpoint.is_empty() {
            loader = loader.endpoint_url(settings.s3().endpoint.clone());
        }
        let config = loader.load().await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn store(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> anyhow::Result<StoredObject> {
        let stored = StoredObject::describe(key, &bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("Failed to upload object {key}"))?;

        Ok(stored)
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download object {key}"))?;

        let data = object.body.collect().await.context("Failed to read object body")?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete object {key}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub(crate) fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative.components().all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !safe {
            anyhow::bail!("Invalid storage key: {key}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn store(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> anyhow::Result<StoredObject> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let stored = StoredObject::describe(key, &bytes);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(stored)
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}
