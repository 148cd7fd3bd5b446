// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use ceprs::automation::chromium::ChromiumFactory;
use ceprs::automation::fallback::{FallbackOrchestrator, FallbackPolicy, PortalAttemptRunner};
use ceprs::automation::machine::PortalAutomation;
use ceprs::config::settings::Settings;
use ceprs::domain::services::job_service::{JobService, JobStore};
use ceprs::infrastructure::database::connection;
use ceprs::infrastructure::database::record_repo_impl::PgRecordRepository;
use ceprs::infrastructure::storage::create_storage_repository;
use ceprs::presentation::routes;
use ceprs::utils::files::FileLayout;
use ceprs::utils::telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting ceprs...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    // 3. Connect to database
    let pool = connection::create_pool(&settings.database).await?;
    let records = Arc::new(PgRecordRepository::new(pool));

    // 4. Initialize storage
    let storage = create_storage_repository(&settings.storage)
        .await
        .map_err(|e| anyhow::anyhow!("storage setup failed: {}", e))?;
    info!(storage_type = %settings.storage.storage_type, "Artifact storage initialized");

    // 5. Prepare the local work directory layout
    let layout = FileLayout::new(&settings.automation.work_dir);
    layout.bootstrap().await?;

    // 6. Wire the automation stack
    let factory = Arc::new(ChromiumFactory::new(
        settings.portal.headless,
        format!("{}/downloads", settings.automation.work_dir),
    ));
    let machine = Arc::new(PortalAutomation::new(
        settings.portal.clone(),
        settings.automation.clone(),
        layout.clone(),
    ));
    let runner = Arc::new(PortalAttemptRunner::new(factory, machine));
    let pipeline = Arc::new(FallbackOrchestrator::new(
        FallbackPolicy::from_settings(&settings.automation),
        runner,
    ));

    // 7. Job lifecycle service
    let service = Arc::new(JobService::new(
        JobStore::new(),
        records,
        storage,
        pipeline,
        settings.automation.clone(),
        layout,
    ));

    // 8. Serve
    let app = routes::routes(service);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
