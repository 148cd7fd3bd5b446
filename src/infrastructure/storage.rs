// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::config::settings::StorageSettings;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};

fn artifact_key(job_id: &str) -> String {
    format!("ceps/{}.zip", job_id)
}

/// S3 产物存储实现
///
/// 上传下载产物并返回限时签名的GET URL作为远端定位符。
pub struct S3ArtifactStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    signed_url_ttl: Duration,
}

impl S3ArtifactStorage {
    pub async fn new(
        region: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        endpoint: Option<String>,
        signed_url_ttl: Duration,
    ) -> Self {
        let credentials =
            aws_sdk_s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut config_builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ep) = endpoint {
            config_builder = config_builder.endpoint_url(ep).force_path_style(true);
        }

        let config = config_builder.build();
        let client = aws_sdk_s3::Client::from_conf(config);

        Self {
            client,
            bucket,
            signed_url_ttl,
        }
    }
}

#[async_trait]
impl StorageRepository for S3ArtifactStorage {
    async fn store_artifact(
        &self,
        local_path: &Path,
        job_id: &str,
    ) -> Result<String, StorageError> {
        let key = artifact_key(job_id);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/zip")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let presigning = PresigningConfig::expires_in(self.signed_url_ttl)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

/// 本地文件系统产物存储实现
///
/// 把产物复制到持久目录，返回落盘后的绝对路径作为定位符。
pub struct LocalArtifactStorage {
    base_path: PathBuf,
}

impl LocalArtifactStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl StorageRepository for LocalArtifactStorage {
    async fn store_artifact(
        &self,
        local_path: &Path,
        job_id: &str,
    ) -> Result<String, StorageError> {
        let dest = self.base_path.join(artifact_key(job_id));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &dest).await?;
        Ok(dest.to_string_lossy().to_string())
    }
}

/// 存储工厂函数
pub async fn create_storage_repository(
    settings: &StorageSettings,
) -> Result<Arc<dyn StorageRepository>, StorageError> {
    match settings.storage_type.as_str() {
        "local" => {
            let base_path = settings
                .local_path
                .as_ref()
                .cloned()
                .unwrap_or_else(|| "./storage".to_string());
            Ok(Arc::new(LocalArtifactStorage::new(base_path)))
        }

        "s3" => {
            let missing = |field: &str| StorageError::Other(format!("missing s3 setting: {}", field));
            Ok(Arc::new(
                S3ArtifactStorage::new(
                    settings
                        .s3_region
                        .as_ref()
                        .cloned()
                        .ok_or_else(|| missing("s3_region"))?,
                    settings
                        .s3_bucket
                        .as_ref()
                        .cloned()
                        .ok_or_else(|| missing("s3_bucket"))?,
                    settings
                        .s3_access_key
                        .as_ref()
                        .cloned()
                        .ok_or_else(|| missing("s3_access_key"))?,
                    settings
                        .s3_secret_key
                        .as_ref()
                        .cloned()
                        .ok_or_else(|| missing("s3_secret_key"))?,
                    settings.s3_endpoint.clone(),
                    Duration::from_secs(settings.signed_url_ttl_secs),
                )
                .await,
            ))
        }

        other => Err(StorageError::Other(format!(
            "Unsupported storage type: {}",
            other
        ))),
    }
}

/// 测试用的内存存储实现（用于单元测试）
pub struct InMemoryStorage {
    data: Arc<tokio::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new())),
        }
    }

    pub async fn stored(&self, job_id: &str) -> Option<Vec<u8>> {
        let map = self.data.read().await;
        map.get(&artifact_key(job_id)).cloned()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageRepository for InMemoryStorage {
    async fn store_artifact(
        &self,
        local_path: &Path,
        job_id: &str,
    ) -> Result<String, StorageError> {
        let bytes = fs::read(local_path).await?;
        let key = artifact_key(job_id);
        let mut map = self.data.write().await;
        map.insert(key.clone(), bytes);
        Ok(format!("memory://{}", key))
    }
}
