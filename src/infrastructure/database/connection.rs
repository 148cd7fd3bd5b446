// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::config::settings::DatabaseSettings;

/// 创建PostgreSQL连接池
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections.unwrap_or(20))
        .acquire_timeout(Duration::from_secs(settings.connect_timeout.unwrap_or(10)))
        .connect(&settings.url)
        .await?;

    info!("Database connection pool established");
    Ok(pool)
}
