// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 任务实体和状态机
pub mod job;

/// 支付记录
pub mod payment;
