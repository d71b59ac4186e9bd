//! PostgreSQL 连接池
//!
//! 客户和分群表由服务启动时执行的建表脚本创建，这里不维护迁移目录。

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// 按配置构造连接池参数
fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
}

/// 日志中隐藏连接串里的密码
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

impl Database {
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let target = redact_url(&config.url);
        let pool = pool_options(config).connect(&config.url).await?;

        info!(
            database = %target,
            max_connections = config.max_connections,
            "Database pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 就绪检查使用
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// 执行建表脚本，脚本必须可重复执行（`IF NOT EXISTS`）
    #[instrument(skip(self, script))]
    pub async fn apply_schema(&self, script: &str) -> Result<()> {
        let started = Instant::now();
        sqlx::raw_sql(script).execute(&self.pool).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Segment schema ensured"
        );
        Ok(())
    }

    /// 等待已借出的连接归还后关闭
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
