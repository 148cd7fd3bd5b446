// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 电子支付记录
///
/// 提交文件的只读输入，六个扁平字符串字段，由数据仓库按日期查询返回。
/// 自动化核心从不修改支付记录。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentRecord {
    /// 支付日期（ISO格式，可能带时间部分）
    pub payment_date: String,
    /// 追踪键
    pub trace_key: String,
    /// 发起机构代码
    pub issuer_code: String,
    /// 接收机构代码
    pub receiver_code: String,
    /// 受益人账户
    pub beneficiary_account: String,
    /// 金额（十进制字符串）
    pub amount: String,
}
