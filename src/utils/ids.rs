// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;

/// 生成任务唯一标识符
///
/// 格式为 `YYYYMMDD-HHMM-XXX`，其中 XXX 是随机的3位大写字母数字后缀。
/// 标识符同时用作提交文件和下载产物的文件名前缀。
pub fn generate_job_id() -> String {
    let now = Utc::now();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(3)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("{}-{}", now.format("%Y%m%d-%H%M"), suffix)
}
