// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 浏览器引擎回退编排
//!
//! 按固定顺序依次尝试各引擎档案，任一引擎完整跑通即停止。
//! 引擎之间的退避和CAPTCHA确认窗口都随回退深度递增。

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::automation::driver::DriverFactory;
use crate::automation::engine::BrowserEngine;
use crate::automation::machine::{
    AttemptSpec, AutomationError, AutomationOutcome, PortalAutomation,
};
use crate::config::settings::AutomationSettings;
use crate::domain::models::job::OutputFormat;

/// 引擎回退节奏策略
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    engines: Vec<BrowserEngine>,
    engine_backoff: Duration,
    first_captcha_pause: Duration,
    fallback_captcha_pause: Duration,
    captcha_pause_step: Duration,
}

impl FallbackPolicy {
    pub fn from_settings(automation: &AutomationSettings) -> Self {
        Self {
            engines: BrowserEngine::FALLBACK_ORDER.to_vec(),
            engine_backoff: Duration::from_secs(automation.engine_backoff_secs),
            first_captcha_pause: Duration::from_secs(automation.first_captcha_pause_secs),
            fallback_captcha_pause: Duration::from_secs(automation.fallback_captcha_pause_secs),
            captcha_pause_step: Duration::from_secs(automation.captcha_pause_step_secs),
        }
    }

    pub fn engines(&self) -> &[BrowserEngine] {
        &self.engines
    }

    /// 第index个引擎失败后、启动下一个引擎前的退避
    pub fn backoff_after(&self, index: usize) -> Duration {
        self.engine_backoff.saturating_mul(index as u32 + 1)
    }

    /// 第index个引擎尝试的CAPTCHA确认窗口
    ///
    /// 首个引擎用短窗口；回退引擎说明门户可能已经提高了
    /// 挑战强度，窗口随深度线性拉长。
    pub fn captcha_pause_for(&self, index: usize) -> Duration {
        if index == 0 {
            self.first_captcha_pause
        } else {
            self.fallback_captcha_pause
                + self.captcha_pause_step.saturating_mul(index as u32 - 1)
        }
    }
}

/// 单引擎尝试的执行接口
///
/// 编排器通过这个接口驱动尝试，测试时可以用脚本化的假执行器
/// 验证回退顺序和节奏。
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn attempt(
        &self,
        engine: BrowserEngine,
        job_id: &str,
        spec: &AttemptSpec,
    ) -> Result<AutomationOutcome, AutomationError>;
}

/// 生产执行器：为每次尝试启动独立的浏览器实例
///
/// 浏览器在尝试结束时无条件关闭，成功与失败路径都不留进程。
pub struct PortalAttemptRunner {
    factory: Arc<dyn DriverFactory>,
    machine: Arc<PortalAutomation>,
}

impl PortalAttemptRunner {
    pub fn new(factory: Arc<dyn DriverFactory>, machine: Arc<PortalAutomation>) -> Self {
        Self { factory, machine }
    }
}

#[async_trait]
impl AttemptRunner for PortalAttemptRunner {
    async fn attempt(
        &self,
        engine: BrowserEngine,
        job_id: &str,
        spec: &AttemptSpec,
    ) -> Result<AutomationOutcome, AutomationError> {
        let driver = self.factory.launch(engine).await?;
        let result = self.machine.run(driver.as_ref(), job_id, spec).await;
        if let Err(e) = driver.close().await {
            warn!(job_id, engine = %engine, "Browser close failed: {}", e);
        }
        result
    }
}

/// 任务自动化入口
///
/// 任务服务只依赖这个接口，测试时用假流水线替换整个浏览器层。
#[async_trait]
pub trait AutomationPipeline: Send + Sync {
    async fn run(
        &self,
        job_id: &str,
        input_file: &Path,
        email: &str,
        format: OutputFormat,
    ) -> Result<AutomationOutcome, AutomationError>;
}

/// 回退编排器
///
/// 严格按策略给定的顺序尝试引擎，首个完整成功即返回；
/// 全部失败时把最后一个错误包进终态错误向上交付。
pub struct FallbackOrchestrator {
    policy: FallbackPolicy,
    runner: Arc<dyn AttemptRunner>,
}

impl FallbackOrchestrator {
    pub fn new(policy: FallbackPolicy, runner: Arc<dyn AttemptRunner>) -> Self {
        Self { policy, runner }
    }

    async fn execute(
        &self,
        job_id: &str,
        input_file: &Path,
        email: &str,
        format: OutputFormat,
    ) -> Result<AutomationOutcome, AutomationError> {
        let engines = self.policy.engines();
        let mut last_error: Option<AutomationError> = None;

        for (index, engine) in engines.iter().enumerate() {
            if index > 0 {
                let backoff = self.policy.backoff_after(index - 1);
                info!(
                    job_id,
                    engine = %engine,
                    backoff_ms = backoff.as_millis() as u64,
                    "Backing off before fallback engine"
                );
                sleep(backoff).await;
            }

            let spec = AttemptSpec {
                input_file: input_file.to_path_buf(),
                email: email.to_string(),
                format,
                captcha_pause: self.policy.captcha_pause_for(index),
            };

            info!(job_id, engine = %engine, attempt = index + 1, "Launching engine attempt");
            match self.runner.attempt(*engine, job_id, &spec).await {
                Ok(outcome) => {
                    info!(job_id, engine = %engine, "Engine attempt succeeded");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(job_id, engine = %engine, "Engine attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(AutomationError::AllEnginesFailed {
            engines: engines.len(),
            source: Box::new(
                last_error.unwrap_or(AutomationError::Driver(
                    crate::automation::driver::DriverError::Other(
                        "no engines configured".to_string(),
                    ),
                )),
            ),
        })
    }
}

#[async_trait]
impl AutomationPipeline for FallbackOrchestrator {
    async fn run(
        &self,
        job_id: &str,
        input_file: &Path,
        email: &str,
        format: OutputFormat,
    ) -> Result<AutomationOutcome, AutomationError> {
        self.execute(job_id, input_file, email, format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::driver::{BrowserDriver, DriverError};
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn settings() -> AutomationSettings {
        AutomationSettings {
            work_dir: "./data".to_string(),
            upload_max_attempts: 3,
            query_max_attempts: 3,
            selector_timeout_secs: 15,
            navigation_timeout_secs: 30,
            network_idle_timeout_secs: 60,
            download_control_timeout_secs: 15,
            download_timeout_secs: 60,
            first_captcha_pause_secs: 10,
            fallback_captcha_pause_secs: 20,
            captcha_pause_step_secs: 15,
            engine_backoff_secs: 5,
            job_deadline_secs: 1800,
        }
    }

    /// Scripted runner: fails the first `failures` attempts, then succeeds
    struct StubRunner {
        failures: usize,
        calls: Mutex<Vec<(BrowserEngine, Duration)>>,
    }

    impl StubRunner {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AttemptRunner for StubRunner {
        async fn attempt(
            &self,
            engine: BrowserEngine,
            _job_id: &str,
            spec: &AttemptSpec,
        ) -> Result<AutomationOutcome, AutomationError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((engine, spec.captcha_pause));
            if index < self.failures {
                Err(AutomationError::TokenNotFound)
            } else {
                Ok(AutomationOutcome {
                    token: "TOK123".to_string(),
                    artifact_path: PathBuf::from("/tmp/out.zip"),
                })
            }
        }
    }

    fn orchestrator(runner: Arc<StubRunner>) -> FallbackOrchestrator {
        FallbackOrchestrator::new(FallbackPolicy::from_settings(&settings()), runner)
    }

    #[test]
    fn test_captcha_pause_escalates_with_depth() {
        let policy = FallbackPolicy::from_settings(&settings());
        assert_eq!(policy.captcha_pause_for(0), Duration::from_secs(10));
        assert_eq!(policy.captcha_pause_for(1), Duration::from_secs(20));
        assert_eq!(policy.captcha_pause_for(2), Duration::from_secs(35));
    }

    #[test]
    fn test_backoff_grows_with_depth() {
        let policy = FallbackPolicy::from_settings(&settings());
        assert_eq!(policy.backoff_after(0), Duration::from_secs(5));
        assert_eq!(policy.backoff_after(1), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_stops_fallback() {
        let runner = Arc::new(StubRunner::new(0));
        let outcome = orchestrator(runner.clone())
            .run("job-1", Path::new("/tmp/in.txt"), "ops@example.com", OutputFormat::Pdf)
            .await
            .unwrap();

        assert_eq!(outcome.token, "TOK123");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, BrowserEngine::Chrome);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_tried_in_fixed_order() {
        let runner = Arc::new(StubRunner::new(2));
        let outcome = orchestrator(runner.clone())
            .run("job-1", Path::new("/tmp/in.txt"), "ops@example.com", OutputFormat::Xml)
            .await
            .unwrap();

        assert_eq!(outcome.token, "TOK123");
        let calls = runner.calls.lock().unwrap();
        let engines: Vec<BrowserEngine> = calls.iter().map(|(e, _)| *e).collect();
        assert_eq!(
            engines,
            vec![BrowserEngine::Chrome, BrowserEngine::Edge, BrowserEngine::Firefox]
        );
        // CAPTCHA window grows at each fallback depth
        let pauses: Vec<Duration> = calls.iter().map(|(_, p)| *p).collect();
        assert_eq!(
            pauses,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(35)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_surface_last_error() {
        let runner = Arc::new(StubRunner::new(3));
        let start = Instant::now();
        let err = orchestrator(runner.clone())
            .run("job-1", Path::new("/tmp/in.txt"), "ops@example.com", OutputFormat::Both)
            .await
            .unwrap_err();

        match err {
            AutomationError::AllEnginesFailed { engines, source } => {
                assert_eq!(engines, 3);
                assert!(matches!(*source, AutomationError::TokenNotFound));
            }
            other => panic!("unexpected error: {}", other),
        }
        // Inter-engine backoff: 5s before the second engine, 10s before the third
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    /// Factory/driver pair sharing a close counter
    struct CountingFactory {
        closes: Arc<AtomicUsize>,
        fail_navigation: bool,
    }

    struct CountingDriver {
        closes: Arc<AtomicUsize>,
        fail_navigation: bool,
    }

    #[async_trait]
    impl DriverFactory for CountingFactory {
        async fn launch(
            &self,
            _engine: BrowserEngine,
        ) -> Result<Box<dyn BrowserDriver>, DriverError> {
            Ok(Box::new(CountingDriver {
                closes: self.closes.clone(),
                fail_navigation: self.fail_navigation,
            }))
        }
    }

    #[async_trait]
    impl BrowserDriver for CountingDriver {
        async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
            if self.fail_navigation {
                Err(DriverError::Navigation("connection refused".to_string()))
            } else {
                Ok(())
            }
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
            Ok(Some((100.0, 100.0)))
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
        async fn attach_file(
            &self,
            _selector: &str,
            _path: &std::path::Path,
        ) -> Result<(), DriverError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, DriverError> {
            Ok(Value::Bool(true))
        }
        async fn content(&self) -> Result<String, DriverError> {
            Ok("Token: <strong>QWE789</strong>".to_string())
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
            dest: &std::path::Path,
            _timeout: Duration,
        ) -> Result<PathBuf, DriverError> {
            Ok(dest.to_path_buf())
        }
        async fn screenshot(&self, _path: &std::path::Path) -> Result<(), DriverError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), DriverError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn attempt_runner(closes: Arc<AtomicUsize>, fail_navigation: bool) -> PortalAttemptRunner {
        use crate::config::settings::PortalSettings;
        use crate::utils::files::FileLayout;

        let machine = PortalAutomation::new(
            PortalSettings {
                base_url: "https://portal.test/".to_string(),
                home_path: "inicio.do".to_string(),
                query_path: "inicio2.do".to_string(),
                headless: true,
            },
            settings(),
            FileLayout::new("/tmp/ceprs-test"),
        );
        PortalAttemptRunner::new(
            Arc::new(CountingFactory {
                closes,
                fail_navigation,
            }),
            Arc::new(machine),
        )
    }

    fn spec() -> AttemptSpec {
        AttemptSpec {
            input_file: PathBuf::from("/tmp/in.txt"),
            email: "ops@example.com".to_string(),
            format: OutputFormat::Both,
            captcha_pause: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_closed_after_success() {
        let closes = Arc::new(AtomicUsize::new(0));
        let runner = attempt_runner(closes.clone(), false);
        runner
            .attempt(BrowserEngine::Chrome, "job-1", &spec())
            .await
            .unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_closed_after_failure() {
        let closes = Arc::new(AtomicUsize::new(0));
        let runner = attempt_runner(closes.clone(), true);
        let err = runner
            .attempt(BrowserEngine::Chrome, "job-1", &spec())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::UploadExhausted { .. }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
