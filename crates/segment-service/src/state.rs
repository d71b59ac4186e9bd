//! 应用状态定义

use std::sync::Arc;

use crm_shared::database::Database;

use crate::service::SegmentService;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub segments: Arc<SegmentService>,
    /// 使用 PostgreSQL 存储时用于就绪检查
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(segments: Arc<SegmentService>) -> Self {
        Self {
            segments,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}
