// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 凭证检索请求数据传输对象
///
/// 封装客户端发起的支付凭证检索请求参数
#[derive(Debug, Deserialize, Serialize)]
pub struct CepRequestDto {
    /// 接收门户通知的邮箱
    pub email: String,
    /// 产物格式：pdf、xml或both，缺省both
    pub format: Option<String>,
    /// 查询起始日期，缺省表示昨天
    pub start_date: Option<NaiveDate>,
    /// 查询结束日期，仅在给定起始日期时有意义
    pub end_date: Option<NaiveDate>,
}

impl CepRequestDto {
    /// 请求参数校验
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("email cannot be empty".to_string());
        }
        if !self.email.contains('@') {
            return Err("email is invalid".to_string());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err("end_date cannot precede start_date".to_string());
            }
        }
        if self.end_date.is_some() && self.start_date.is_none() {
            return Err("end_date requires start_date".to_string());
        }
        Ok(())
    }
}
