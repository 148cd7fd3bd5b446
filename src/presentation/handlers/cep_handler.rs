// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::{
    application::dto::{
        cep_request::CepRequestDto,
        cep_response::{CepAcceptedDto, CepListDto, CepStatusDto, CepSummaryDto},
    },
    domain::models::job::OutputFormat,
    domain::services::job_service::JobService,
    presentation::errors::AppError,
};

/// 受理检索请求
///
/// 校验通过后立即返回202和任务标识，处理在后台进行。
pub async fn create_cep(
    Extension(service): Extension<Arc<JobService>>,
    Json(payload): Json<CepRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|message| anyhow::anyhow!(message))?;

    let format = match payload.format.as_deref() {
        None => OutputFormat::default(),
        Some(raw) => OutputFormat::from_str(raw).map_err(|()| {
            anyhow::anyhow!("invalid format \"{}\", expected pdf, xml or both", raw)
        })?,
    };

    let job = service.submit(
        payload.email.trim().to_string(),
        format,
        payload.start_date,
        payload.end_date,
    );
    info!(job_id = %job.id, "CEP retrieval request accepted");

    Ok((StatusCode::ACCEPTED, Json(CepAcceptedDto::from(&job))))
}

/// 查询任务状态
pub async fn get_cep_status(
    Extension(service): Extension<Arc<JobService>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match service.store().get(&id) {
        Some(job) => (StatusCode::OK, Json(CepStatusDto::from(&job))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("job {} not found", id) })),
        )
            .into_response(),
    }
}

/// 列出所有任务（创建时间倒序）
pub async fn list_ceps(Extension(service): Extension<Arc<JobService>>) -> impl IntoResponse {
    let jobs = service.store().list();
    let body = CepListDto {
        total: jobs.len(),
        jobs: jobs.iter().map(CepSummaryDto::from).collect(),
    };
    (StatusCode::OK, Json(body)).into_response()
}
