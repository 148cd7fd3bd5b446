// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 基于chromiumoxide的浏览器驱动实现
//!
//! 每次引擎尝试启动一个独立的Chromium进程，按引擎档案注入
//! User-Agent、启动参数和反检测脚本。下载通过CDP的下载行为
//! 重定向到会话专属目录，再轮询落盘完成。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::automation::driver::{BrowserDriver, DriverError, DriverFactory};
use crate::automation::engine::{BrowserEngine, StealthLevel};
use crate::utils::files;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DOWNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 基础伪装：抹掉webdriver标志，伪造语言列表
const STEALTH_BASIC: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['es-MX', 'es', 'en'] });
"#;

/// 完整伪装：额外伪造插件列表、硬件并发数和权限查询
const STEALTH_FULL: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['es-MX', 'es', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters)
);
"#;

/// Chromium驱动实例
///
/// 持有一个专属的浏览器进程和单个页面。关闭后实例不可复用。
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    download_dir: PathBuf,
}

impl ChromiumDriver {
    fn escape(value: &str) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }

    async fn find(&self, selector: &str) -> Result<chromiumoxide::element::Element, DriverError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| DriverError::Interaction(format!("{}: {}", selector, e)))
    }

    /// 轮询下载目录直到产物完整落盘
    ///
    /// Chromium在下载中会留下.crdownload占位文件；只有当目录里
    /// 出现非占位文件且不再有占位文件时才算完成。
    async fn await_download(&self, dest: &Path, timeout: Duration) -> Result<PathBuf, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut completed: Option<PathBuf> = None;
            let mut in_progress = false;

            let mut entries = tokio::fs::read_dir(&self.download_dir)
                .await
                .map_err(|e| DriverError::Download(e.to_string()))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DriverError::Download(e.to_string()))?
            {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".crdownload") || name.ends_with(".tmp") {
                    in_progress = true;
                } else if path.is_file() {
                    completed = Some(path);
                }
            }

            if let (Some(path), false) = (completed, in_progress) {
                tokio::fs::rename(&path, dest)
                    .await
                    .map_err(|e| DriverError::Download(e.to_string()))?;
                return Ok(dest.to_path_buf());
            }

            if Instant::now() + DOWNLOAD_POLL_INTERVAL > deadline {
                return Err(DriverError::DownloadTimeout(timeout));
            }
            sleep(DOWNLOAD_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() + SELECTOR_POLL_INTERVAL > deadline {
                return Err(DriverError::SelectorTimeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn element_center(&self, selector: &str) -> Result<Option<(f64, f64)>, DriverError> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                let point = element
                    .clickable_point()
                    .await
                    .map_err(|e| DriverError::Interaction(e.to_string()))?;
                Ok(Some((point.x, point.y)))
            }
            Err(_) => Ok(None),
        }
    }

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(DriverError::Interaction)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.find(selector)
            .await?
            .click()
            .await
            .map_err(|e| DriverError::Interaction(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    async fn force_click(&self, selector: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; el.click(); return true; }})()",
            Self::escape(selector)
        );
        let result = self.evaluate(&script).await?;
        if result.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::Interaction(format!(
                "{}: element not present for forced click",
                selector
            )))
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.find(selector)
            .await?
            .type_str(text)
            .await
            .map_err(|e| DriverError::Interaction(format!("{}: {}", selector, e)))?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (el) el.value = ''; }})()",
            Self::escape(selector)
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.value = {val}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             return true; }})()",
            sel = Self::escape(selector),
            val = Self::escape(value)
        );
        let result = self.evaluate(&script).await?;
        if result.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::Interaction(format!(
                "{}: element not present for fill",
                selector
            )))
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.value = {val}; el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()",
            sel = Self::escape(selector),
            val = Self::escape(value)
        );
        let result = self.evaluate(&script).await?;
        if result.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::Interaction(format!(
                "{}: option {} could not be selected",
                selector, value
            )))
        }
    }

    async fn attach_file(&self, selector: &str, path: &Path) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string_lossy().to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(DriverError::Interaction)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?
            .unwrap_or_default())
    }

    async fn settle_network(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready = self
                .evaluate("document.readyState === 'complete'")
                .await
                .map(|v| v.as_bool() == Some(true))
                .unwrap_or(false);
            if ready {
                // Give late XHRs a moment to land
                sleep(Duration::from_millis(500)).await;
                return Ok(());
            }
            if Instant::now() + SELECTOR_POLL_INTERVAL > deadline {
                return Err(DriverError::Other(format!(
                    "page did not settle within {:?}",
                    timeout
                )));
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn download_via(
        &self,
        selector: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, DriverError> {
        if let Err(e) = self.click(selector).await {
            debug!("Plain download click failed, forcing: {}", e);
            self.force_click(selector).await?;
        }
        self.await_download(dest, timeout).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        self.page
            .save_screenshot(
                ScreenshotParams::builder().full_page(true).build(),
                path,
            )
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?;
        if let Err(e) = browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        files::delete_dir_if_exists(&self.download_dir).await;
        Ok(())
    }
}

/// Chromium驱动工厂
pub struct ChromiumFactory {
    headless: bool,
    downloads_root: PathBuf,
}

impl ChromiumFactory {
    pub fn new(headless: bool, downloads_root: impl Into<PathBuf>) -> Self {
        Self {
            headless,
            downloads_root: downloads_root.into(),
        }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn launch(&self, engine: BrowserEngine) -> Result<Box<dyn BrowserDriver>, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1366, 768)
            .request_timeout(Duration::from_secs(30));
        if !self.headless {
            builder = builder.with_head();
        }
        for arg in engine.launch_args() {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(DriverError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // Drive the CDP event loop for this browser's lifetime
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        page.set_user_agent(engine.user_agent())
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let stealth = match engine.stealth_level() {
            StealthLevel::Basic => STEALTH_BASIC,
            StealthLevel::Full => STEALTH_FULL,
        };
        let inject = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(stealth)
            .build()
            .map_err(DriverError::Launch)?;
        page.execute(inject)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // Session-scoped download directory, one per browser instance
        let session = format!(
            "session-{}-{:04}",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            rand::random_range(0..10_000)
        );
        let download_dir = self.downloads_root.join(session);
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().to_string())
            .build()
            .map_err(DriverError::Launch)?;
        if let Err(e) = page.execute(behavior).await {
            warn!("Download behavior setup failed: {}", e);
        }

        Ok(Box::new(ChromiumDriver {
            browser: Mutex::new(browser),
            page,
            download_dir,
        }))
    }
}
