// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// 任务实体
///
/// 表示一次端到端的支付凭证检索请求。任务在创建时为Pending，
/// 由生命周期管理器独占推进到Processing，最终进入Completed或
/// Failed终态。状态只向前转换，终态后不再变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 任务唯一标识符，创建时生成，从不复用
    pub id: String,
    /// 任务状态
    pub status: JobStatus,
    /// 请求者邮箱，门户表单需要
    pub email: String,
    /// 产物输出格式
    pub format: OutputFormat,
    /// 查询起始日期，缺省表示昨天
    pub start_date: Option<NaiveDate>,
    /// 查询结束日期
    pub end_date: Option<NaiveDate>,
    /// 获取到输入数据后记录的条数
    pub records_processed: Option<u32>,
    /// 生成的提交文件本地路径，任务终态后由清理步骤删除
    pub input_file_path: Option<PathBuf>,
    /// 门户在上传成功后返回的确认令牌，设置后不可变
    pub token: Option<String>,
    /// 远端产物定位符（签名URL），仅在成功时设置
    pub result_reference: Option<String>,
    /// 失败原因，仅在Failed时设置
    pub error: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 终态时间
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务状态枚举
///
/// 状态转换只向前：Pending → Processing → Completed | Failed。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已接受，尚未开始处理
    #[default]
    Pending,
    /// 自动化流程进行中
    Processing,
    /// 成功完成，产物可下载
    Completed,
    /// 失败，error字段包含原因
    Failed,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 产物输出格式
///
/// 门户表单的格式下拉框取固定值：pdf→1、xml→2、both→3。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Pdf,
    Xml,
    #[default]
    Both,
}

impl OutputFormat {
    /// 门户下拉框对应的选项值
    pub fn portal_value(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "1",
            OutputFormat::Xml => "2",
            OutputFormat::Both => "3",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Pdf => write!(f, "pdf"),
            OutputFormat::Xml => write!(f, "xml"),
            OutputFormat::Both => write!(f, "both"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(OutputFormat::Pdf),
            "xml" => Ok(OutputFormat::Xml),
            "both" => Ok(OutputFormat::Both),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，状态机只允许向前转换
    #[error("Invalid state transition")]
    InvalidStateTransition,
}

impl Job {
    /// 创建一个新的待处理任务
    pub fn new(
        id: String,
        email: String,
        format: OutputFormat,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            email,
            format,
            start_date,
            end_date,
            records_processed: None,
            input_file_path: None,
            token: None,
            result_reference: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// 启动任务，Pending → Processing
    pub fn start(&mut self) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Processing;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成任务，Processing → Completed
    ///
    /// 同时记录令牌和远端产物定位符
    pub fn complete(&mut self, token: String, result_reference: String) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Processing => {
                self.status = JobStatus::Completed;
                self.token = Some(token);
                self.result_reference = Some(result_reference);
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务失败，Pending | Processing → Failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        match self.status {
            JobStatus::Pending | JobStatus::Processing => {
                self.status = JobStatus::Failed;
                self.error = Some(error.into());
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }
}
