// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含服务器、数据库、存储、门户和自动化等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 门户配置
    pub portal: PortalSettings,
    /// 自动化配置
    pub automation: AutomationSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
    /// 签名URL有效期（秒），默认7天
    pub signed_url_ttl_secs: u64,
}

/// 门户配置设置
///
/// 固定指向官方门户；测试时可指向本地桩服务
#[derive(Debug, Clone, Deserialize)]
pub struct PortalSettings {
    /// 门户入口URL
    pub base_url: String,
    /// 首页视图路径
    pub home_path: String,
    /// 查询视图路径
    pub query_path: String,
    /// 是否以无头模式运行浏览器
    pub headless: bool,
}

impl PortalSettings {
    pub fn home_url(&self) -> String {
        format!("{}{}", self.base_url, self.home_path)
    }

    pub fn query_url(&self) -> String {
        format!("{}{}", self.base_url, self.query_path)
    }
}

/// 自动化配置设置
///
/// 每一个有界等待点的超时和重试/回退的节奏常量
#[derive(Debug, Clone, Deserialize)]
pub struct AutomationSettings {
    /// 本地工作目录（outputs/downloads/screenshots的父目录）
    pub work_dir: String,
    /// 上传阶段最大尝试次数
    pub upload_max_attempts: u32,
    /// 查询阶段最大尝试次数
    pub query_max_attempts: u32,
    /// 选择器等待超时（秒）
    pub selector_timeout_secs: u64,
    /// 导航超时（秒）
    pub navigation_timeout_secs: u64,
    /// 网络平息等待超时（秒）
    pub network_idle_timeout_secs: u64,
    /// 下载控件出现等待超时（秒）
    pub download_control_timeout_secs: u64,
    /// 下载事件超时（秒）
    pub download_timeout_secs: u64,
    /// 首个引擎的CAPTCHA暂停窗口（秒）
    pub first_captcha_pause_secs: u64,
    /// 回退引擎的CAPTCHA暂停基数（秒）
    pub fallback_captcha_pause_secs: u64,
    /// 每次回退递增的CAPTCHA暂停步长（秒）
    pub captcha_pause_step_secs: u64,
    /// 引擎间回退退避基数（秒）
    pub engine_backoff_secs: u64,
    /// 任务全局截止时间（秒）
    pub job_deadline_secs: u64,
}

impl AutomationSettings {
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_secs(self.selector_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.network_idle_timeout_secs)
    }

    pub fn download_control_timeout(&self) -> Duration {
        Duration::from_secs(self.download_control_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_secs)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从配置文件和环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default DB pool settings
            .set_default("database.max_connections", 20)?
            .set_default("database.connect_timeout", 10)?
            // Default Storage settings
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            .set_default("storage.signed_url_ttl_secs", 604_800)?
            // Default Portal settings
            .set_default("portal.base_url", "https://www.banxico.org.mx/cep-scl/")?
            .set_default("portal.home_path", "inicio.do")?
            .set_default("portal.query_path", "inicio2.do")?
            .set_default("portal.headless", true)?
            // Default Automation settings
            .set_default("automation.work_dir", "./data")?
            .set_default("automation.upload_max_attempts", 3)?
            .set_default("automation.query_max_attempts", 3)?
            .set_default("automation.selector_timeout_secs", 15)?
            .set_default("automation.navigation_timeout_secs", 30)?
            .set_default("automation.network_idle_timeout_secs", 60)?
            .set_default("automation.download_control_timeout_secs", 15)?
            .set_default("automation.download_timeout_secs", 60)?
            .set_default("automation.first_captcha_pause_secs", 10)?
            .set_default("automation.fallback_captcha_pause_secs", 20)?
            .set_default("automation.captcha_pause_step_secs", 15)?
            .set_default("automation.engine_backoff_secs", 5)?
            .set_default("automation.job_deadline_secs", 1800)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CEPRS").separator("__"));

        builder.build()?.try_deserialize()
    }
}
