// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPool;

use crate::domain::models::payment::PaymentRecord;
use crate::domain::repositories::record_repository::{RecordRepository, RepositoryError};

/// 支付记录的PostgreSQL仓库实现
///
/// 原始支付表的列按门户提交文件需要的六个字段取出；数值列
/// 统一转成文本，格式化交给提交文件序列化器。
pub struct PgRecordRepository {
    pool: PgPool,
}

impl PgRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT fecha_operacion::text   AS payment_date,
           clave_rastreo           AS trace_key,
           institucion_ordenante::text    AS issuer_code,
           institucion_beneficiaria::text AS receiver_code,
           cuenta_beneficiario     AS beneficiary_account,
           monto::text             AS amount
      FROM pagos_stp_raw
"#;

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let query = format!(
            "{} WHERE fecha_operacion::date = $1 ORDER BY clave_rastreo",
            SELECT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }

    async fn find_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let query = format!(
            "{} WHERE fecha_operacion::date BETWEEN $1 AND $2 ORDER BY fecha_operacion, clave_rastreo",
            SELECT_COLUMNS
        );
        sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }
}
