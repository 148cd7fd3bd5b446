// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 支付记录仓库接口
pub mod record_repository;

/// 产物存储仓库接口
pub mod storage_repository;
