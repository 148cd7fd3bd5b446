// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::models::payment::PaymentRecord;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// 支付记录仓库接口
///
/// 数据源错误不属于自动化错误：查询失败直接作为任务失败上报，不重试。
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// 查询指定日期的支付记录
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<PaymentRecord>, RepositoryError>;

    /// 查询日期区间内的支付记录（含两端）
    async fn find_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PaymentRecord>, RepositoryError>;
}
