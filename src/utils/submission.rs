// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::domain::models::payment::PaymentRecord;

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("invalid amount regex"));

/// 提交文件序列化错误
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// 金额无法解析为带符号十进制数
    #[error("invalid amount format \"{amount}\" for trace key {trace_key}")]
    InvalidAmount { amount: String, trace_key: String },

    #[error("failed to write submission file: {0}")]
    Io(#[from] std::io::Error),
}

/// 生成门户提交文件
///
/// 每条支付记录占一行，逗号分隔六个字段。日期截取ISO日期部分，
/// 金额去除千分位分隔符后必须是带符号十进制数，否则整个文件拒绝生成。
pub async fn write_submission_file(
    records: &[PaymentRecord],
    path: &Path,
) -> Result<PathBuf, SubmissionError> {
    let mut lines = Vec::with_capacity(records.len());

    for record in records {
        let payment_date = record
            .payment_date
            .split('T')
            .next()
            .unwrap_or(&record.payment_date);

        let amount = record.amount.trim().replace(',', "");
        if !AMOUNT_RE.is_match(&amount) {
            return Err(SubmissionError::InvalidAmount {
                amount: record.amount.clone(),
                trace_key: record.trace_key.clone(),
            });
        }

        lines.push(format!(
            "{},{},{},{},{},{}",
            payment_date,
            record.trace_key,
            record.issuer_code,
            record.receiver_code,
            record.beneficiary_account,
            amount
        ));
    }

    let content = lines.join("\n") + "\n";
    fs::write(path, content).await?;

    Ok(path.to_path_buf())
}
