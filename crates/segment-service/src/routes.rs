//! 路由配置模块

use axum::{
    Router, middleware,
    routing::{get, post},
};
use crm_shared::observability::middleware as obs_middleware;

use crate::{handlers, state::AppState};

/// 分群相关路由，挂载在 `/api` 下
pub fn segment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/segments",
            get(handlers::segment::list_segments).post(handlers::segment::create_segment),
        )
        .route("/segments/preview", post(handlers::segment::preview_segment))
        .route(
            "/segments/refresh-all",
            post(handlers::segment::refresh_all_segments),
        )
        .route("/segments/{id}", get(handlers::segment::get_segment))
        .route(
            "/segments/{id}/refresh",
            post(handlers::segment::refresh_segment),
        )
        .route(
            "/segments/{id}/audience",
            get(handlers::segment::segment_audience),
        )
}

/// 组装完整应用，包含探针和可观测性中间件
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", segment_routes())
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
