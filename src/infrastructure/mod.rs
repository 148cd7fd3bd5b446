// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据库访问
pub mod database;

/// 产物存储
pub mod storage;
