// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::automation::engine::BrowserEngine;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 浏览器启动失败
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// 导航失败
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// 选择器在限定时间内未变为可交互
    #[error("selector `{selector}` not interactable within {timeout:?}")]
    SelectorTimeout { selector: String, timeout: Duration },

    /// 元素交互失败（点击、输入等）
    #[error("element interaction failed: {0}")]
    Interaction(String),

    /// 脚本执行失败
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// 下载未在限定时间内完成
    #[error("download did not complete within {0:?}")]
    DownloadTimeout(Duration),

    /// 下载失败
    #[error("download failed: {0}")]
    Download(String),

    /// 其他浏览器错误
    #[error("browser error: {0}")]
    Other(String),
}

/// 浏览器驱动能力接口
///
/// 状态机只依赖这组能力，不依赖具体的浏览器自动化库，
/// 因此可以用脚本化的假驱动对上传/查询流程做单元测试。
/// 所有等待类方法都有显式超时，不允许无限阻塞。
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 导航到目标URL，等待文档加载
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// 等待选择器出现在DOM中
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// 元素的可点击中心坐标，元素不存在时返回None
    async fn element_center(&self, selector: &str) -> Result<Option<(f64, f64)>, DriverError>;

    /// 移动指针到视口坐标
    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// 点击元素
    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// 通过脚本强制触发点击，绕过遮挡和动画
    async fn force_click(&self, selector: &str) -> Result<(), DriverError>;

    /// 向元素追加键盘输入
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// 清空输入框
    async fn clear(&self, selector: &str) -> Result<(), DriverError>;

    /// 直接设置输入框的值
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// 选中下拉框选项
    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// 将本地文件附加到文件输入控件
    async fn attach_file(&self, selector: &str, path: &Path) -> Result<(), DriverError>;

    /// 在页面上下文中执行脚本并返回结果
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    /// 当前页面HTML内容
    async fn content(&self) -> Result<String, DriverError>;

    /// 当前页面标题
    async fn title(&self) -> Result<String, DriverError>;

    /// 当前页面URL
    async fn current_url(&self) -> Result<String, DriverError>;

    /// 等待网络活动平息（尽力而为，超时返回错误由调用方决定是否忽略）
    async fn settle_network(&self, timeout: Duration) -> Result<(), DriverError>;

    /// 点击下载控件并等待产物落盘，成功时产物位于dest
    async fn download_via(
        &self,
        selector: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, DriverError>;

    /// 保存整页截图（诊断用）
    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    /// 关闭浏览器，释放进程资源
    async fn close(&self) -> Result<(), DriverError>;
}

/// 浏览器驱动工厂
///
/// 回退编排器通过工厂为每次引擎尝试启动独立的浏览器实例；
/// 任务之间、尝试之间从不共享浏览器资源。
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, engine: BrowserEngine) -> Result<Box<dyn BrowserDriver>, DriverError>;
}
