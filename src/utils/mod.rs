// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 日期工具
pub mod dates;

/// 本地文件目录管理
pub mod files;

/// 任务ID生成器
pub mod ids;

/// 阶段重试策略
pub mod retry_policy;

/// 提交文件序列化
pub mod submission;

/// 日志初始化
pub mod telemetry;
