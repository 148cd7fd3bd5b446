// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 检索请求DTO
pub mod cep_request;

/// 检索响应DTO
pub mod cep_response;
