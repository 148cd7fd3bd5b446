// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::services::job_service::JobService;
use crate::presentation::handlers::cep_handler;

/// 创建应用路由
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(service: Arc<JobService>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let cep_routes = Router::new()
        .route("/v1/ceps", post(cep_handler::create_cep))
        .route("/v1/ceps", get(cep_handler::list_ceps))
        .route("/v1/ceps/{id}", get(cep_handler::get_cep_status));

    Router::new()
        .merge(public_routes)
        .merge(cep_routes)
        .layer(Extension(service))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
