// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 门户自动化状态机
//!
//! 把一次取件驱动为两个有重试边界的阶段：上传阶段在首页提交
//! 检索文件并捕获确认令牌，查询阶段凭令牌换取下载产物。
//! 每个等待点都有显式超时，令牌一经捕获绝不因后续失败丢弃。

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::automation::captcha::CaptchaGate;
use crate::automation::driver::{BrowserDriver, DriverError};
use crate::automation::human;
use crate::config::settings::{AutomationSettings, PortalSettings};
use crate::domain::models::job::OutputFormat;
use crate::utils::files::FileLayout;
use crate::utils::retry_policy::PhaseRetryPolicy;

/// 首页文件输入控件
pub const FILE_INPUT: &str = r#"input[type="file"]"#;
/// 邮箱输入控件（首页与查询页共用）
pub const EMAIL_INPUT: &str = r#"input[type="email"][name="correo"]"#;
/// 令牌输入控件（查询页）
pub const TOKEN_INPUT: &str = r#"input[name="token"]"#;
/// 产物格式下拉框
pub const FORMAT_SELECT: &str = r#"select[name="formato"]"#;
/// 上传提交按钮
pub const UPLOAD_BUTTON: &str = r#"input[type="button"][value="Cargar archivo"]"#;
/// 确认页返回按钮
pub const RETURN_BUTTON: &str = r#"input[type="button"][value="Regresar"]"#;
/// 查询提交按钮
pub const QUERY_BUTTON: &str = r#"input[type="button"][value="Consultar resultado"]"#;
/// 下载按钮
pub const DOWNLOAD_BUTTON: &str = r#"input[type="button"][value="Descargar"]"#;

/// 门户的通用错误标记文案
pub const GENERIC_ERROR_MARKER: &str = "Ha ocurrido un error al procesar su solicitud";

/// 提交结果轮询间隔
const OUTCOME_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// CAPTCHA暂停窗口之后的二次确认轮询时长
const CAPTCHA_CONFIRM_WINDOW: Duration = Duration::from_secs(5);

/// 上传表单自带挑战的确认轮询时长
const UPLOAD_CAPTCHA_WINDOW: Duration = Duration::from_secs(10);

/// 令牌提取模式，按优先级排列
///
/// 首个模式匹配门户当前的确认页标记；后备模式覆盖历史上出现过的
/// 宽松变体。令牌本身始终是纯字母数字。
static TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)Token:\s*<strong>\s*([A-Za-z0-9]+)\s*</strong>").unwrap(),
        Regex::new(r"(?i)Token:?\s*</?\w+>\s*([A-Za-z0-9]{6,})").unwrap(),
        Regex::new(r"(?i)Token:\s+([A-Za-z0-9]{6,})").unwrap(),
    ]
});

/// 从确认页HTML中提取令牌
pub fn extract_token(html: &str) -> Option<String> {
    TOKEN_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// 自动化层错误类型
#[derive(Error, Debug)]
pub enum AutomationError {
    /// 门户在提交后返回了通用错误页（可重试）
    #[error("portal reported a generic processing error")]
    PortalGenericError,

    /// 查询页返回了错误视图（可重试）
    #[error("portal query returned an error view")]
    PortalQueryError,

    /// 提交后页面仍停留在上传表单；只能整个尝试重来，不在阶段内重试
    #[error("upload form did not submit")]
    FormNotSubmitted,

    /// 页面离开了表单但找不到令牌（终态）
    #[error("confirmation page did not contain a token")]
    TokenNotFound,

    /// 查询后下载控件未出现（阶段内可重试）
    #[error("download control never became available")]
    DownloadUnavailable,

    /// 上传阶段重试耗尽
    #[error("upload phase exhausted after {attempts} attempts: {source}")]
    UploadExhausted {
        attempts: u32,
        #[source]
        source: Box<AutomationError>,
    },

    /// 查询阶段重试耗尽
    #[error("query phase exhausted after {attempts} attempts: {source}")]
    QueryExhausted {
        attempts: u32,
        #[source]
        source: Box<AutomationError>,
    },

    /// 驱动层错误
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// 所有引擎尝试均失败
    #[error("all {engines} browser engines failed; last: {source}")]
    AllEnginesFailed {
        engines: usize,
        #[source]
        source: Box<AutomationError>,
    },
}

impl AutomationError {
    /// 上传阶段内是否值得换一次尝试
    pub fn is_upload_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::PortalGenericError | AutomationError::Driver(_)
        )
    }

    /// 查询阶段内是否值得换一次尝试
    pub fn is_query_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::PortalQueryError
                | AutomationError::DownloadUnavailable
                | AutomationError::Driver(_)
        )
    }
}

/// 单次引擎尝试的输入
#[derive(Debug, Clone)]
pub struct AttemptSpec {
    /// 待上传的提交文件
    pub input_file: PathBuf,
    /// 通知邮箱
    pub email: String,
    /// 请求的产物格式
    pub format: OutputFormat,
    /// 本次尝试的CAPTCHA暂停窗口（随引擎回退递增）
    pub captcha_pause: Duration,
}

/// 成功尝试的产出
#[derive(Debug, Clone)]
pub struct AutomationOutcome {
    /// 门户颁发的确认令牌
    pub token: String,
    /// 已落盘的下载产物
    pub artifact_path: PathBuf,
}

/// 门户自动化执行器
///
/// 对单个浏览器实例执行完整的上传+查询序列。引擎级的回退
/// 由上层编排器负责，这里只关心单引擎内的阶段重试。
pub struct PortalAutomation {
    portal: PortalSettings,
    automation: AutomationSettings,
    layout: FileLayout,
    gate: CaptchaGate,
    upload_policy: PhaseRetryPolicy,
    query_policy: PhaseRetryPolicy,
}

impl PortalAutomation {
    pub fn new(
        portal: PortalSettings,
        automation: AutomationSettings,
        layout: FileLayout,
    ) -> Self {
        let mut upload_policy = PhaseRetryPolicy::upload();
        upload_policy.max_attempts = automation.upload_max_attempts;
        let mut query_policy = PhaseRetryPolicy::query();
        query_policy.max_attempts = automation.query_max_attempts;

        Self {
            portal,
            automation,
            layout,
            gate: CaptchaGate::default(),
            upload_policy,
            query_policy,
        }
    }

    /// 执行完整的取件序列
    ///
    /// 上传阶段成功后令牌即被持有；查询阶段的任何失败都不会
    /// 回滚到上传阶段，令牌随错误路径一路保留到任务记录。
    pub async fn run(
        &self,
        driver: &dyn BrowserDriver,
        job_id: &str,
        spec: &AttemptSpec,
    ) -> Result<AutomationOutcome, AutomationError> {
        let token = self.upload_phase(driver, job_id, spec).await?;
        info!(job_id, token = %token, "Upload confirmed, token captured");

        // Best effort: leave the confirmation view before querying
        if let Err(e) = driver.click(RETURN_BUTTON).await {
            debug!(job_id, "Return button click skipped: {}", e);
        }

        let artifact_path = self.query_phase(driver, job_id, spec, &token).await?;
        info!(job_id, artifact = %artifact_path.display(), "Artifact downloaded");

        Ok(AutomationOutcome {
            token,
            artifact_path,
        })
    }

    /// 上传阶段：提交检索文件并捕获令牌
    async fn upload_phase(
        &self,
        driver: &dyn BrowserDriver,
        job_id: &str,
        spec: &AttemptSpec,
    ) -> Result<String, AutomationError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(job_id, attempt, "Starting upload attempt");

            match self.try_upload(driver, spec).await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_upload_retryable() && self.upload_policy.should_retry(attempt) => {
                    let backoff = self.upload_policy.backoff(attempt);
                    warn!(
                        job_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Upload attempt failed, retrying: {}",
                        e
                    );
                    sleep(backoff).await;
                    // Look around a little before the next attempt
                    let _ = human::scroll_page(driver).await;
                }
                Err(e) if e.is_upload_retryable() => {
                    return Err(AutomationError::UploadExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    if matches!(e, AutomationError::TokenNotFound) {
                        self.capture_diagnostics(driver, job_id, "error_no_token")
                            .await;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_upload(
        &self,
        driver: &dyn BrowserDriver,
        spec: &AttemptSpec,
    ) -> Result<String, AutomationError> {
        driver.navigate(&self.portal.home_url()).await?;
        if let Err(e) = driver
            .settle_network(self.automation.navigation_timeout())
            .await
        {
            debug!("Home page network did not settle: {}", e);
        }

        driver
            .wait_for_selector(FILE_INPUT, self.automation.selector_timeout())
            .await?;

        human::idle_activity(driver).await?;

        driver.attach_file(FILE_INPUT, &spec.input_file).await?;
        human::pause_between(400, 900).await;

        driver.clear(EMAIL_INPUT).await?;
        human::type_like_human(driver, EMAIL_INPUT, &spec.email).await?;
        human::pause_between(300, 700).await;

        driver
            .select_option(FORMAT_SELECT, spec.format.portal_value())
            .await?;
        human::pause_between(300, 700).await;

        if !self
            .gate
            .wait_for_resolution(driver, UPLOAD_CAPTCHA_WINDOW)
            .await
        {
            warn!("CAPTCHA response not observed before submit, proceeding");
        }

        if let Some((x, y)) = driver.element_center(UPLOAD_BUTTON).await? {
            human::approach_pointer(driver, x, y).await?;
        }
        if let Err(e) = driver.click(UPLOAD_BUTTON).await {
            debug!("Plain click failed, forcing: {}", e);
            driver.force_click(UPLOAD_BUTTON).await?;
        }

        self.await_submission_outcome(driver).await
    }

    /// 轮询提交结果直到导航超时
    ///
    /// 三种出口：确认页带令牌（成功）、通用错误页（可重试）、
    /// 超时后按页面是否仍是表单区分FormNotSubmitted与TokenNotFound。
    async fn await_submission_outcome(
        &self,
        driver: &dyn BrowserDriver,
    ) -> Result<String, AutomationError> {
        let deadline = Instant::now() + self.automation.navigation_timeout();
        loop {
            let html = driver.content().await?;
            if html.contains(GENERIC_ERROR_MARKER) {
                return Err(AutomationError::PortalGenericError);
            }
            if let Some(token) = extract_token(&html) {
                return Ok(token);
            }
            if Instant::now() + OUTCOME_POLL_INTERVAL > deadline {
                break;
            }
            sleep(OUTCOME_POLL_INTERVAL).await;
        }

        if driver.element_center(FILE_INPUT).await?.is_some() {
            Err(AutomationError::FormNotSubmitted)
        } else {
            Err(AutomationError::TokenNotFound)
        }
    }

    /// 查询阶段：凭令牌换取下载产物
    async fn query_phase(
        &self,
        driver: &dyn BrowserDriver,
        job_id: &str,
        spec: &AttemptSpec,
        token: &str,
    ) -> Result<PathBuf, AutomationError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(job_id, attempt, "Starting query attempt");

            match self.try_query(driver, job_id, spec, token).await {
                Ok(path) => return Ok(path),
                Err(e) if e.is_query_retryable() && self.query_policy.should_retry(attempt) => {
                    let backoff = self.query_policy.backoff(attempt);
                    warn!(
                        job_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Query attempt failed, retrying: {}",
                        e
                    );
                    sleep(backoff).await;
                }
                Err(e) if e.is_query_retryable() => {
                    return Err(AutomationError::QueryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_query(
        &self,
        driver: &dyn BrowserDriver,
        job_id: &str,
        spec: &AttemptSpec,
        token: &str,
    ) -> Result<PathBuf, AutomationError> {
        driver.navigate(&self.portal.query_url()).await?;
        driver
            .wait_for_selector(EMAIL_INPUT, self.automation.selector_timeout())
            .await?;

        driver.clear(EMAIL_INPUT).await?;
        human::type_like_human(driver, EMAIL_INPUT, &spec.email).await?;
        human::pause_between(300, 700).await;

        driver.clear(TOKEN_INPUT).await?;
        human::type_like_human(driver, TOKEN_INPUT, token).await?;
        human::pause_between(300, 700).await;

        // Suspension window for an external party to solve the challenge,
        // then a short confirmation poll; proceeding unconfirmed is allowed
        sleep(spec.captcha_pause).await;
        if !self
            .gate
            .wait_for_resolution(driver, CAPTCHA_CONFIRM_WINDOW)
            .await
        {
            warn!("CAPTCHA response not observed before query, proceeding");
        }

        if let Err(e) = driver.click(QUERY_BUTTON).await {
            debug!("Plain click failed, forcing: {}", e);
            driver.force_click(QUERY_BUTTON).await?;
        }

        if let Err(e) = driver
            .settle_network(self.automation.network_idle_timeout())
            .await
        {
            debug!("Query result network did not settle: {}", e);
        }

        let title = driver.title().await?;
        let html = driver.content().await?;
        if title.to_uppercase().contains("ERROR") || html.contains(GENERIC_ERROR_MARKER) {
            self.capture_diagnostics(driver, job_id, "error_query").await;
            return Err(AutomationError::PortalQueryError);
        }

        if driver
            .wait_for_selector(DOWNLOAD_BUTTON, self.automation.download_control_timeout())
            .await
            .is_err()
        {
            self.capture_diagnostics(driver, job_id, "error_no_download")
                .await;
            return Err(AutomationError::DownloadUnavailable);
        }

        let dest = self.layout.artifact_path(job_id);
        let path = driver
            .download_via(DOWNLOAD_BUTTON, &dest, self.automation.download_timeout())
            .await?;
        Ok(path)
    }

    /// 终态失败时的尽力而为截图
    async fn capture_diagnostics(&self, driver: &dyn BrowserDriver, job_id: &str, name: &str) {
        let path = self.layout.screenshot_path(job_id, name);
        match driver.screenshot(&path).await {
            Ok(()) => info!(job_id, screenshot = %path.display(), "Diagnostic screenshot saved"),
            Err(e) => warn!(job_id, "Diagnostic screenshot failed: {}", e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::script::ScriptedDriver;
    use super::*;

    const TOKEN_PAGE: &str =
        "<html><body>Su solicitud fue recibida. Token: <strong> ABC123XYZ </strong></body></html>";
    const ERROR_PAGE: &str =
        "<html><body>Ha ocurrido un error al procesar su solicitud</body></html>";
    const FORM_PAGE: &str = r#"<html><body><input type="file"></body></html>"#;

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

    fn portal() -> PortalSettings {
        PortalSettings {
            base_url: "https://portal.test/".to_string(),
            home_path: "inicio.do".to_string(),
            query_path: "inicio2.do".to_string(),
            headless: true,
        }
    }

    fn automation() -> PortalAutomation {
        PortalAutomation::new(portal(), settings(), FileLayout::new("/tmp/ceprs-test"))
    }

    fn spec() -> AttemptSpec {
        AttemptSpec {
            input_file: PathBuf::from("/tmp/ceprs-test/outputs/job.txt"),
            email: "ops@example.com".to_string(),
            format: OutputFormat::Both,
            captcha_pause: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_extract_token_from_confirmation_markup() {
        assert_eq!(extract_token(TOKEN_PAGE), Some("ABC123XYZ".to_string()));
    }

    #[test]
    fn test_extract_token_is_case_insensitive() {
        let html = "TOKEN: <STRONG>def456</STRONG>";
        assert_eq!(extract_token(html), Some("def456".to_string()));
    }

    #[test]
    fn test_extract_token_fallback_pattern() {
        let html = "Token: <b>GHI789JKL</b>";
        assert_eq!(extract_token(html), Some("GHI789JKL".to_string()));
    }

    #[test]
    fn test_extract_token_absent() {
        assert_eq!(extract_token(ERROR_PAGE), None);
        assert_eq!(extract_token(""), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_succeeds() {
        let driver = ScriptedDriver::new(vec![TOKEN_PAGE]);
        let outcome = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap();

        assert_eq!(outcome.token, "ABC123XYZ");
        assert_eq!(
            outcome.artifact_path,
            PathBuf::from("/tmp/ceprs-test/downloads/20250101-1200-ABC.zip")
        );
        assert_eq!(driver.attach_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(driver.download_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_error_retries_then_succeeds() {
        let driver = ScriptedDriver::new(vec![ERROR_PAGE, TOKEN_PAGE]);
        let outcome = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap();

        assert_eq!(outcome.token, "ABC123XYZ");
        assert_eq!(driver.attach_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_exhausts_after_attempt_cap() {
        let driver = ScriptedDriver::new(vec![ERROR_PAGE]);
        let err = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap_err();

        match err {
            AutomationError::UploadExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AutomationError::PortalGenericError));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(driver.attach_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(driver.download_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_is_terminal_with_screenshot() {
        // Page left the form but carries no recognizable token
        let driver = ScriptedDriver::new(vec!["<html><body>Gracias</body></html>"])
            .without_element(FILE_INPUT);
        let err = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap_err();

        assert!(matches!(err, AutomationError::TokenNotFound));
        // Terminal failure: single attempt, diagnostic captured
        assert_eq!(driver.attach_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let shots = driver.screenshots.lock().unwrap();
        assert_eq!(shots.len(), 1);
        assert!(shots[0].to_string_lossy().contains("error_no_token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubmitted_form_fails_the_attempt() {
        let driver = ScriptedDriver::new(vec![FORM_PAGE]);
        let err = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap_err();

        // Not retryable within the phase: the whole engine attempt fails
        assert!(matches!(err, AutomationError::FormNotSubmitted));
        assert_eq!(driver.attach_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_view_retries_then_succeeds() {
        let driver = ScriptedDriver::new(vec![TOKEN_PAGE])
            .with_titles(vec!["ERROR DEL SISTEMA", "Resultado de la consulta"]);
        let outcome = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap();

        assert_eq!(outcome.token, "ABC123XYZ");
        assert_eq!(driver.download_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        // First query attempt left a diagnostic screenshot
        let shots = driver.screenshots.lock().unwrap();
        assert!(shots[0].to_string_lossy().contains("error_query"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_download_control_retries_then_exhausts() {
        let driver = ScriptedDriver::new(vec![TOKEN_PAGE]).without_selector(DOWNLOAD_BUTTON);
        let err = automation()
            .run(&driver, "20250101-1200-ABC", &spec())
            .await
            .unwrap_err();

        match err {
            AutomationError::QueryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AutomationError::DownloadUnavailable));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(driver.download_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        let shots = driver.screenshots.lock().unwrap();
        assert!(shots[0].to_string_lossy().contains("error_no_download"));
    }
}
