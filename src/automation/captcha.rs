// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::automation::driver::BrowserDriver;

/// 门户CAPTCHA响应字段的DOM id
pub const CAPTCHA_RESPONSE_FIELD: &str = "g-recaptcha-response-100000";

/// CAPTCHA同步门
///
/// 轮询已解决挑战的响应字段，直到出现非空值或超过截止时间。
/// 从不尝试解决挑战本身，只等待外部（人工或第三方系统）解决。
#[derive(Debug, Clone)]
pub struct CaptchaGate {
    field_id: String,
    poll_interval: Duration,
}

impl Default for CaptchaGate {
    fn default() -> Self {
        Self {
            field_id: CAPTCHA_RESPONSE_FIELD.to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl CaptchaGate {
    pub fn new(field_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            field_id: field_id.into(),
            poll_interval,
        }
    }

    /// 等待挑战被标记为已解决
    ///
    /// 返回true表示在截止时间内观察到非空响应值；false表示超时。
    /// 驱动层错误同样按未确认处理，调用方按尽力而为继续。
    pub async fn wait_for_resolution(
        &self,
        driver: &dyn BrowserDriver,
        timeout: Duration,
    ) -> bool {
        let script = format!(
            "(() => {{ const el = document.getElementById({}); \
             return !!(el && el.value && el.value.length > 0); }})()",
            serde_json::to_string(&self.field_id).unwrap_or_default()
        );

        let deadline = Instant::now() + timeout;
        loop {
            match driver.evaluate(&script).await {
                Ok(value) if value.as_bool() == Some(true) => {
                    debug!("CAPTCHA response field populated");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("CAPTCHA poll evaluation failed: {}", e);
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                return false;
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::driver::DriverError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Driver stub that answers the poll script from a fixed sequence
    struct PollDriver {
        answers: Vec<bool>,
        calls: AtomicUsize,
    }

    impl PollDriver {
        fn new(answers: Vec<bool>) -> Self {
            Self {
                answers,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BrowserDriver for PollDriver {
        async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn wait_for_selector(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<(), DriverError> {
            Ok(())
        }
        async fn element_center(
            &self,
            _selector: &str,
        ) -> Result<Option<(f64, f64)>, DriverError> {
            Ok(None)
        }
        async fn move_pointer(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn force_click(&self, _selector: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn clear(&self, _selector: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn fill(&self, _selector: &str, _value: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn select_option(&self, _selector: &str, _value: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn attach_file(&self, _selector: &str, _path: &Path) -> Result<(), DriverError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, DriverError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers.get(i).copied().unwrap_or(false);
            Ok(Value::Bool(answer))
        }
        async fn content(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }
        async fn title(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }
        async fn current_url(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }
        async fn settle_network(&self, _timeout: Duration) -> Result<(), DriverError> {
            Ok(())
        }
        async fn download_via(
            &self,
            _selector: &str,
            dest: &Path,
            _timeout: Duration,
        ) -> Result<PathBuf, DriverError> {
            Ok(dest.to_path_buf())
        }
        async fn screenshot(&self, _path: &Path) -> Result<(), DriverError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_true_when_field_populates() {
        let driver = PollDriver::new(vec![false, false, true]);
        let gate = CaptchaGate::default();
        assert!(
            gate.wait_for_resolution(&driver, Duration::from_secs(5))
                .await
        );
        assert_eq!(driver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_solved() {
        let driver = PollDriver::new(vec![]);
        let gate = CaptchaGate::default();
        assert!(
            !gate
                .wait_for_resolution(&driver, Duration::from_secs(2))
                .await
        );
        // 2s deadline at 250ms interval: bounded number of polls
        assert!(driver.calls.load(Ordering::SeqCst) <= 9);
    }
}
