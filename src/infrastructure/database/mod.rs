// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据库连接池
pub mod connection;

/// 支付记录仓库实现
pub mod record_repo_impl;
