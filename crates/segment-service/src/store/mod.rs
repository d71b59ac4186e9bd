//! 存储接口定义
//!
//! 服务层依赖这里的 trait 而非具体实现，内存实现用于开发和测试，
//! PostgreSQL 实现用于生产。两者对编译后过滤条件的语义保持一致。

mod memory;
mod postgres;

pub use memory::{MemoryCustomerStore, MemorySegmentRepository};
pub use postgres::{PgCustomerStore, PgSegmentRepository, SCHEMA};

use async_trait::async_trait;
use segment_engine::CompiledFilter;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Customer, Segment, SegmentStats};

/// 客户查询接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// 统计某个运营账号下匹配过滤条件的客户数
    async fn count(&self, filter: &CompiledFilter, owner_id: &str) -> Result<u64>;

    /// 按最后下单时间倒序（未下单的排在最后）返回至多 `limit` 个匹配客户
    async fn find(
        &self,
        filter: &CompiledFilter,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Customer>>;
}

/// 分群仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SegmentRepository: Send + Sync {
    /// 保存新分群，同一账号下重名返回 `SegmentNameTaken`
    async fn insert(&self, segment: &Segment) -> Result<()>;
    async fn find_by_name(&self, owner_id: &str, name: &str) -> Result<Option<Segment>>;
    async fn get(&self, owner_id: &str, id: Uuid) -> Result<Option<Segment>>;
    /// 按创建时间倒序
    async fn list(&self, owner_id: &str) -> Result<Vec<Segment>>;
    async fn update_stats(&self, id: Uuid, stats: &SegmentStats) -> Result<()>;
}
