// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::job::Job;

/// 任务受理响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CepAcceptedDto {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for CepAcceptedDto {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status.to_string(),
            created_at: job.created_at,
        }
    }
}

/// 任务状态响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CepStatusDto {
    pub id: String,
    pub status: String,
    pub email: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// 成功时的产物定位符（签名URL或本地路径）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for CepStatusDto {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status.to_string(),
            email: job.email.clone(),
            format: job.format.to_string(),
            start_date: job.start_date,
            end_date: job.end_date,
            records_processed: job.records_processed,
            token: job.token.clone(),
            result_reference: job.result_reference.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// 任务列表响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CepListDto {
    pub total: usize,
    pub jobs: Vec<CepSummaryDto>,
}

/// 列表中的任务摘要
#[derive(Debug, Serialize, Deserialize)]
pub struct CepSummaryDto {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for CepSummaryDto {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status.to_string(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}
