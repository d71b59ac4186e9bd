//! 分群实体

use chrono::{DateTime, Utc};
use segment_engine::CompiledFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 已保存的分群
///
/// `rules` 保留用户提交的原始规则树，`compiled_filter` 是保存或最近一次
/// 刷新时的编译快照。含 `inactiveDays` 的规则会随时间漂移，执行前应重新编译。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub rules: Value,
    pub compiled_filter: CompiledFilter,
    pub customer_count: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
}

impl Segment {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        rules: Value,
        compiled_filter: CompiledFilter,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            description,
            rules,
            compiled_filter,
            customer_count: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_run: None,
        }
    }

    /// 写入一次统计结果
    pub fn apply_stats(&mut self, stats: &SegmentStats) {
        self.compiled_filter = stats.compiled_filter.clone();
        self.customer_count = Some(stats.customer_count);
        self.last_run = Some(stats.last_run);
        self.updated_at = stats.last_run;
    }
}

/// 刷新分群时写回的统计数据
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStats {
    pub compiled_filter: CompiledFilter,
    pub customer_count: i64,
    pub last_run: DateTime<Utc>,
}
