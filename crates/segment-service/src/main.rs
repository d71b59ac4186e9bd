//! 客户分群服务
//!
//! 提供分群规则预览、保存、刷新和受众解析的 REST API。

use std::sync::Arc;

use axum::http::HeaderValue;
use crm_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
};
use segment_service::{
    routes,
    service::SegmentService,
    state::AppState,
    store::{
        CustomerStore, MemoryCustomerStore, MemorySegmentRepository, PgCustomerStore,
        PgSegmentRepository, SCHEMA, SegmentRepository,
    },
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "segment-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    let (state, database) = match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, data is lost on restart");
            let customers: Arc<dyn CustomerStore> = Arc::new(MemoryCustomerStore::new());
            let segments: Arc<dyn SegmentRepository> = Arc::new(MemorySegmentRepository::new());
            let state = AppState::new(Arc::new(SegmentService::new(
                customers,
                segments,
                config.segment.clone(),
            )));
            (state, None)
        }
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            db.apply_schema(SCHEMA).await?;

            let customers: Arc<dyn CustomerStore> =
                Arc::new(PgCustomerStore::new(db.pool().clone()));
            let segments: Arc<dyn SegmentRepository> =
                Arc::new(PgSegmentRepository::new(db.pool().clone()));
            let state = AppState::new(Arc::new(SegmentService::new(
                customers,
                segments,
                config.segment.clone(),
            )))
            .with_database(db.clone());
            (state, Some(db))
        }
    };

    let app = routes::app(state).layer(cors_layer(config.is_production()));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 收到 SIGTERM 或 Ctrl+C 后停止接收新连接，等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close().await;
    }

    info!("Server shutdown complete");

    Ok(())
}

/// CORS 配置：通过 CRM_CORS_ORIGINS 环境变量控制允许的来源
fn cors_layer(production: bool) -> CorsLayer {
    let allowed_origins = std::env::var("CRM_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    if allowed_origins == "*" {
        if production {
            warn!("CRM_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 监听关闭信号
///
/// 信号处理器注册失败时只记录错误，该分支永不完成，不影响另一个信号。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("注册 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
