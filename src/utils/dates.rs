// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, NaiveDate, Utc};

/// 获取昨天的日期（UTC）
///
/// 请求中未指定日期范围时，默认查询昨天的支付记录
pub fn yesterday() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

/// 获取N天前的日期（UTC）
pub fn days_ago(days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yesterday_is_one_day_behind() {
        let today = Utc::now().date_naive();
        assert_eq!(today - yesterday(), Duration::days(1));
    }

    #[test]
    fn test_days_ago() {
        assert_eq!(days_ago(1), yesterday());
        let week = Utc::now().date_naive() - days_ago(7);
        assert_eq!(week, Duration::days(7));
    }
}
