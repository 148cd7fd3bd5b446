// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// 存储层错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Other(String),
}

/// 产物存储仓库接口
///
/// 将本地下载产物移交到持久存储，返回远端定位符（如签名URL）。
/// 移交失败时任务整体失败，即使自动化本身已成功（严格策略）。
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 上传本地产物并返回远端定位符
    async fn store_artifact(&self, local_path: &Path, job_id: &str)
        -> Result<String, StorageError>;
}
