// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 任务生命周期服务
//!
//! 接收检索请求、生成任务并在后台把任务推进到终态。每个任务
//! 有全局截止时间，处理过程中的panic被捕获并转为失败终态，
//! 本地临时文件在终态后无条件清理。

use chrono::NaiveDate;
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::automation::fallback::AutomationPipeline;
use crate::automation::machine::AutomationError;
use crate::config::settings::AutomationSettings;
use crate::domain::models::job::{DomainError, Job, OutputFormat};
use crate::domain::repositories::record_repository::{RecordRepository, RepositoryError};
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::utils::dates::yesterday;
use crate::utils::files::{delete_if_exists, FileLayout};
use crate::utils::ids::generate_job_id;
use crate::utils::submission::{write_submission_file, SubmissionError};

/// 服务层错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 请求窗口内没有任何支付记录
    #[error("no payment records found for the requested window")]
    NoRecords,

    /// 任务记录在处理开始前从存储中消失
    #[error("job {0} is missing from the store")]
    MissingJob(String),

    #[error("record lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("submission file generation failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("automation failed: {0}")]
    Automation(#[from] AutomationError),

    /// 产物移交失败按严格策略处理：任务整体失败
    #[error("artifact handoff failed: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid job state: {0}")]
    Domain(#[from] DomainError),
}

/// 内存任务存储
///
/// 任务记录的唯一可变入口。更新通过闭包在条目锁内执行，
/// 保证单个任务的状态转换是原子的。
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<DashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.clone())
    }

    /// 按创建时间倒序列出所有任务
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.clone()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// 在条目锁内对任务执行更新闭包
    pub fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        self.jobs.get_mut(id).map(|mut entry| f(entry.value_mut()))
    }
}

/// 任务生命周期服务
pub struct JobService {
    store: JobStore,
    records: Arc<dyn RecordRepository>,
    storage: Arc<dyn StorageRepository>,
    pipeline: Arc<dyn AutomationPipeline>,
    automation: AutomationSettings,
    layout: FileLayout,
}

impl JobService {
    pub fn new(
        store: JobStore,
        records: Arc<dyn RecordRepository>,
        storage: Arc<dyn StorageRepository>,
        pipeline: Arc<dyn AutomationPipeline>,
        automation: AutomationSettings,
        layout: FileLayout,
    ) -> Self {
        Self {
            store,
            records,
            storage,
            pipeline,
            automation,
            layout,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// 接受检索请求并在后台启动处理
    ///
    /// 立即返回Pending任务；处理在独立task中进行，panic被捕获
    /// 并转为失败终态，从不让任务停留在Processing。
    pub fn submit(
        self: &Arc<Self>,
        email: String,
        format: OutputFormat,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Job {
        let job = Job::new(generate_job_id(), email, format, start_date, end_date);
        self.store.insert(job.clone());
        info!(job_id = %job.id, "Job accepted");

        let service = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(service.process(&job_id)).catch_unwind().await;
            if outcome.is_err() {
                error!(job_id = %job_id, "Job processing panicked");
                service.store.update(&job_id, |j| {
                    if !j.status.is_terminal() {
                        let _ = j.fail("job processing panicked");
                    }
                });
            }
        });

        job
    }

    /// 把单个任务推进到终态
    ///
    /// 整个处理受全局截止时间约束；无论结果如何，本地提交文件
    /// 和下载产物在返回前都被清理。
    pub async fn process(&self, job_id: &str) {
        match self.store.update(job_id, |j| j.start()) {
            Some(Ok(())) => {}
            Some(Err(_)) => {
                warn!(job_id, "Job is not pending, refusing to process again");
                return;
            }
            None => {
                warn!(job_id, "Job disappeared before processing");
                return;
            }
        }

        let deadline = self.automation.job_deadline();
        let result = match timeout(deadline, self.run(job_id)).await {
            Ok(result) => result,
            Err(_) => {
                error!(job_id, deadline_secs = deadline.as_secs(), "Job deadline exceeded");
                self.store.update(job_id, |j| {
                    let _ = j.fail(format!(
                        "job exceeded its {}s deadline",
                        deadline.as_secs()
                    ));
                });
                self.cleanup(job_id).await;
                return;
            }
        };

        match result {
            Ok((token, reference)) => {
                self.store.update(job_id, |j| {
                    let _ = j.complete(token, reference);
                });
                info!(job_id, "Job completed");
            }
            Err(e) => {
                error!(job_id, "Job failed: {}", e);
                self.store.update(job_id, |j| {
                    let _ = j.fail(e.to_string());
                });
            }
        }

        self.cleanup(job_id).await;
    }

    /// 执行检索流程：取数、生成提交文件、驱动自动化、移交产物
    async fn run(&self, job_id: &str) -> Result<(String, String), ServiceError> {
        let (email, format, start_date, end_date) = self
            .store
            .get(job_id)
            .map(|j| (j.email, j.format, j.start_date, j.end_date))
            .ok_or_else(|| ServiceError::MissingJob(job_id.to_string()))?;

        let records = match (start_date, end_date) {
            (Some(start), Some(end)) => self.records.find_by_range(start, end).await?,
            (Some(start), None) => self.records.find_by_date(start).await?,
            (None, _) => self.records.find_by_date(yesterday()).await?,
        };
        if records.is_empty() {
            return Err(ServiceError::NoRecords);
        }
        info!(job_id, records = records.len(), "Payment records fetched");
        self.store.update(job_id, |j| {
            j.records_processed = Some(records.len() as u32);
        });

        let submission_path = self.layout.submission_path(job_id);
        let input_file = write_submission_file(&records, &submission_path).await?;
        self.store.update(job_id, |j| {
            j.input_file_path = Some(input_file.clone());
        });

        let outcome = self
            .pipeline
            .run(job_id, &input_file, &email, format)
            .await?;

        // The token survives any downstream failure
        self.store.update(job_id, |j| {
            j.token = Some(outcome.token.clone());
        });

        let reference = self
            .storage
            .store_artifact(&outcome.artifact_path, job_id)
            .await?;

        Ok((outcome.token, reference))
    }

    /// 终态后的本地文件清理（幂等，从不失败）
    async fn cleanup(&self, job_id: &str) {
        delete_if_exists(&self.layout.submission_path(job_id)).await;
        delete_if_exists(&self.layout.artifact_path(job_id)).await;
    }
}
