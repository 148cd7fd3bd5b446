// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 阶段重试策略
///
/// 上传和查询两个阶段各自持有一个策略实例：最大尝试次数封顶，
/// 退避时间随尝试次数线性增长并叠加随机抖动，避免以固定节奏
/// 重试触发门户的反自动化检测。
#[derive(Debug, Clone)]
pub struct PhaseRetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 线性退避基数
    pub base_delay: Duration,
    /// 抖动上限
    pub max_jitter: Duration,
}

impl PhaseRetryPolicy {
    /// 上传阶段的默认策略
    pub fn upload() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_jitter: Duration::from_secs(2),
        }
    }

    /// 查询阶段的默认策略
    pub fn query() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(6),
            max_jitter: Duration::from_secs(3),
        }
    }

    /// 是否允许继续尝试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 计算第attempt次尝试失败后的退避时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(attempt);
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(rand::random_range(0.0..self.max_jitter.as_secs_f64()))
        };
        base + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_caps_attempts() {
        let policy = PhaseRetryPolicy::upload();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = PhaseRetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(15));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let policy = PhaseRetryPolicy::query();
        for attempt in 1..=3 {
            let backoff = policy.backoff(attempt);
            let base = policy.base_delay * attempt;
            assert!(backoff >= base);
            assert!(backoff < base + policy.max_jitter);
        }
    }
}
