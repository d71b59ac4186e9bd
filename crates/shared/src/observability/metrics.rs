//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    /// 停止指标 HTTP 服务器
    pub fn shutdown(self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "segment_compilations_total",
        "Total number of segment rule compilations"
    );
    metrics::describe_histogram!(
        "segment_compilation_duration_seconds",
        "Segment rule compilation duration in seconds"
    );
    metrics::describe_counter!(
        "segment_validation_failures_total",
        "Total number of rule trees rejected by validation"
    );
    metrics::describe_histogram!(
        "segment_audience_size",
        "Number of customers matched by a segment"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次规则编译
///
/// `operation` 取 preview / save / refresh / audience，`predicates` 为编译结果的叶子谓词数。
#[inline]
pub fn record_segment_compilation(operation: &str, predicates: usize, duration_secs: f64) {
    let match_all = (predicates == 0).to_string();
    metrics::counter!(
        "segment_compilations_total",
        "operation" => operation.to_string(),
        "match_all" => match_all
    )
    .increment(1);

    metrics::histogram!(
        "segment_compilation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// 记录一次校验失败
#[inline]
pub fn record_validation_failure(operation: &str, error_count: usize) {
    metrics::counter!(
        "segment_validation_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);

    tracing::debug!(operation, error_count, "Rule tree rejected");
}

/// 记录受众规模
#[inline]
pub fn record_audience_size(operation: &str, count: u64) {
    metrics::histogram!(
        "segment_audience_size",
        "operation" => operation.to_string()
    )
    .record(count as f64);
}
