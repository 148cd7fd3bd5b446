// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// 本地工作目录布局
///
/// 每个任务在固定的目录结构下拥有确定性的文件路径：
/// 提交文件位于 outputs/，下载产物位于 downloads/，
/// 终态失败时的诊断截图位于 screenshots/。
#[derive(Debug, Clone)]
pub struct FileLayout {
    outputs_dir: PathBuf,
    downloads_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl FileLayout {
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            outputs_dir: base.join("outputs"),
            downloads_dir: base.join("downloads"),
            screenshots_dir: base.join("screenshots"),
        }
    }

    /// 创建工作目录（幂等）
    pub async fn bootstrap(&self) -> io::Result<()> {
        for dir in [&self.outputs_dir, &self.downloads_dir, &self.screenshots_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// 任务提交文件路径
    pub fn submission_path(&self, job_id: &str) -> PathBuf {
        self.outputs_dir.join(format!("{}.txt", job_id))
    }

    /// 任务下载产物的最终路径
    pub fn artifact_path(&self, job_id: &str) -> PathBuf {
        self.downloads_dir.join(format!("{}.zip", job_id))
    }

    /// 诊断截图路径
    pub fn screenshot_path(&self, job_id: &str, name: &str) -> PathBuf {
        self.screenshots_dir.join(format!("{}_{}.png", job_id, name))
    }
}

/// 删除文件（幂等）
///
/// 文件不存在视为成功，删除失败只记录日志，从不向上传播。
pub async fn delete_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// 递归删除目录（幂等，仅记录日志）
pub async fn delete_dir_if_exists(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete directory {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(tmp.path());
        layout.bootstrap().await.unwrap();

        assert!(tmp.path().join("outputs").is_dir());
        assert!(tmp.path().join("downloads").is_dir());
        assert!(tmp.path().join("screenshots").is_dir());

        // Second bootstrap is a no-op
        layout.bootstrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_paths_are_deterministic() {
        let layout = FileLayout::new("/data");
        assert_eq!(
            layout.submission_path("20250101-1200-ABC"),
            PathBuf::from("/data/outputs/20250101-1200-ABC.txt")
        );
        assert_eq!(
            layout.artifact_path("20250101-1200-ABC"),
            PathBuf::from("/data/downloads/20250101-1200-ABC.zip")
        );
        assert_eq!(
            layout.screenshot_path("20250101-1200-ABC", "error_no_token"),
            PathBuf::from("/data/screenshots/20250101-1200-ABC_error_no_token.png")
        );
    }

    #[tokio::test]
    async fn test_delete_if_exists_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("victim.txt");
        tokio::fs::write(&file, b"x").await.unwrap();

        delete_if_exists(&file).await;
        assert!(!file.exists());

        // Deleting an absent file succeeds silently
        delete_if_exists(&file).await;
    }
}
