// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// CAPTCHA同步门
pub mod captcha;

/// chromiumoxide浏览器驱动实现
pub mod chromium;

/// 浏览器驱动能力接口
pub mod driver;

/// 浏览器引擎描述符
pub mod engine;

/// 引擎回退编排器
pub mod fallback;

/// 人类行为模拟
pub mod human;

/// 门户自动化状态机
pub mod machine;
