// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

/// 人类特征伪装强度
///
/// 决定启动时注入多少反检测对抗措施。回退序列中靠后的引擎
/// 使用更强的伪装，因为前面的引擎已经被门户标记过。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealthLevel {
    /// 基础：覆盖webdriver标志和语言列表
    Basic,
    /// 完整：额外伪造插件列表、硬件并发数和权限查询行为
    Full,
}

/// 浏览器引擎描述符
///
/// 回退序列中的引擎是同一Chromium内核的三种启动档案，各自携带
/// 不同的User-Agent、启动参数和伪装强度。顺序是设计常量，
/// 决定回退顺序，运行期不可配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    /// Chrome桌面档案，首选引擎
    Chrome,
    /// Edge桌面档案，第一回退
    Edge,
    /// Firefox桌面档案，最后回退，伪装最完整
    Firefox,
}

impl BrowserEngine {
    /// 固定的回退顺序
    pub const FALLBACK_ORDER: [BrowserEngine; 3] =
        [BrowserEngine::Chrome, BrowserEngine::Edge, BrowserEngine::Firefox];

    pub fn name(&self) -> &'static str {
        match self {
            BrowserEngine::Chrome => "chrome",
            BrowserEngine::Edge => "edge",
            BrowserEngine::Firefox => "firefox",
        }
    }

    /// 引擎对外呈现的User-Agent
    pub fn user_agent(&self) -> &'static str {
        match self {
            BrowserEngine::Chrome => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
            }
            BrowserEngine::Edge => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0"
            }
            BrowserEngine::Firefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) \
                 Gecko/20100101 Firefox/131.0"
            }
        }
    }

    /// 引擎专属的Chromium启动参数
    pub fn launch_args(&self) -> Vec<&'static str> {
        let mut args = vec![
            "--lang=es-MX,es",
            "--disable-dev-shm-usage",
            "--disable-infobars",
            "--disable-blink-features=AutomationControlled",
            "--window-position=0,0",
        ];
        match self {
            BrowserEngine::Chrome => {}
            BrowserEngine::Edge => {
                args.push("--disable-features=IsolateOrigins,site-per-process");
            }
            BrowserEngine::Firefox => {
                args.push("--disable-features=IsolateOrigins,site-per-process");
                args.push("--ignore-certificate-errors");
            }
        }
        args
    }

    /// 伪装强度
    pub fn stealth_level(&self) -> StealthLevel {
        match self {
            BrowserEngine::Chrome => StealthLevel::Basic,
            BrowserEngine::Edge | BrowserEngine::Firefox => StealthLevel::Full,
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
