//! 分群业务服务
//!
//! 串联校验、编译与存储。每次执行都以当前时刻重新编译规则，
//! 保证 `inactiveDays` 条件相对执行时刻而不是保存时刻。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use crm_shared::config::SegmentConfig;
use crm_shared::observability::metrics;
use segment_engine::{CompiledFilter, QueryCompiler, validate_rules};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::models::{Customer, Segment, SegmentStats};
use crate::store::{CustomerStore, SegmentRepository};

/// 时钟，测试中可替换为固定时刻
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 新分群参数
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub name: String,
    pub description: Option<String>,
    pub rules: Value,
}

/// 预览结果
#[derive(Debug, Clone)]
pub struct Preview {
    pub count: u64,
    pub sample: Vec<Customer>,
    pub evaluated_at: DateTime<Utc>,
}

/// 受众解析结果
#[derive(Debug, Clone)]
pub struct Audience {
    pub segment_id: Uuid,
    pub count: u64,
    pub customers: Vec<Customer>,
    pub evaluated_at: DateTime<Utc>,
}

/// 批量刷新统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct SegmentService {
    customers: Arc<dyn CustomerStore>,
    segments: Arc<dyn SegmentRepository>,
    settings: SegmentConfig,
    clock: Clock,
}

impl SegmentService {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        segments: Arc<dyn SegmentRepository>,
        settings: SegmentConfig,
    ) -> Self {
        Self {
            customers,
            segments,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn validate(&self, operation: &str, rules: &Value) -> Result<()> {
        let errors = validate_rules(rules);
        if errors.is_empty() {
            return Ok(());
        }
        metrics::record_validation_failure(operation, errors.len());
        Err(ServiceError::InvalidRules(errors))
    }

    fn compile(&self, operation: &str, rules: &Value, now: DateTime<Utc>) -> CompiledFilter {
        let started = Instant::now();
        let filter = QueryCompiler::at(now).compile_value(rules);
        metrics::record_segment_compilation(
            operation,
            filter.predicate_count(),
            started.elapsed().as_secs_f64(),
        );
        debug!(operation, %filter, "Rules compiled");
        filter
    }

    /// 预览规则命中的客户数和样本
    #[instrument(skip(self, rules))]
    pub async fn preview(&self, owner_id: &str, rules: &Value) -> Result<Preview> {
        self.validate("preview", rules)?;

        let now = self.now();
        let filter = self.compile("preview", rules, now);
        let count = self.customers.count(&filter, owner_id).await?;
        let sample = self
            .customers
            .find(&filter, owner_id, self.settings.preview_sample_size)
            .await?;
        metrics::record_audience_size("preview", count);

        Ok(Preview {
            count,
            sample,
            evaluated_at: now,
        })
    }

    /// 保存分群并计算初始人数
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn save(&self, owner_id: &str, new: NewSegment) -> Result<Segment> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "Segment name is required".to_string(),
            ));
        }
        self.validate("save", &new.rules)?;

        if self.segments.find_by_name(owner_id, name).await?.is_some() {
            return Err(ServiceError::SegmentNameTaken(name.to_string()));
        }

        let now = self.now();
        let filter = self.compile("save", &new.rules, now);
        let count = self.customers.count(&filter, owner_id).await?;

        let description = new
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let mut segment = Segment::new(
            owner_id,
            name,
            description,
            new.rules,
            filter.clone(),
            now,
        );
        segment.apply_stats(&SegmentStats {
            compiled_filter: filter,
            customer_count: clamp_count(count),
            last_run: now,
        });

        self.segments.insert(&segment).await?;
        info!(segment_id = %segment.id, customer_count = count, "Segment created");

        Ok(segment)
    }

    /// 当前账号的全部分群，新建的在前
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Segment>> {
        self.segments.list(owner_id).await
    }

    pub async fn get(&self, owner_id: &str, id: Uuid) -> Result<Segment> {
        self.segments
            .get(owner_id, id)
            .await?
            .ok_or_else(|| ServiceError::SegmentNotFound(id.to_string()))
    }

    /// 按当前时刻重新编译并重新计数
    #[instrument(skip(self))]
    pub async fn refresh(&self, owner_id: &str, id: Uuid) -> Result<Segment> {
        let segment = self.get(owner_id, id).await?;
        self.refresh_segment(segment).await
    }

    /// 刷新账号下所有启用的分群，单个失败不影响其他分群
    #[instrument(skip(self))]
    pub async fn refresh_all(&self, owner_id: &str) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();

        for segment in self.segments.list(owner_id).await? {
            if !segment.is_active {
                continue;
            }
            let id = segment.id;
            match self.refresh_segment(segment).await {
                Ok(_) => summary.refreshed += 1,
                Err(e) => {
                    warn!(segment_id = %id, error = %e, "Segment refresh failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Segments refreshed"
        );
        Ok(summary)
    }

    async fn refresh_segment(&self, mut segment: Segment) -> Result<Segment> {
        self.validate("refresh", &segment.rules)?;

        let now = self.now();
        let filter = self.compile("refresh", &segment.rules, now);
        let count = self.customers.count(&filter, &segment.owner_id).await?;

        let stats = SegmentStats {
            compiled_filter: filter,
            customer_count: clamp_count(count),
            last_run: now,
        };
        self.segments.update_stats(segment.id, &stats).await?;
        segment.apply_stats(&stats);

        Ok(segment)
    }

    /// 解析分群的受众，供活动投放使用
    ///
    /// 存储的规则会重新校验，并以当前时刻重新编译，不使用保存时的快照。
    #[instrument(skip(self))]
    pub async fn audience(&self, owner_id: &str, id: Uuid) -> Result<Audience> {
        let segment = self.get(owner_id, id).await?;
        self.validate("audience", &segment.rules)?;

        let now = self.now();
        let filter = self.compile("audience", &segment.rules, now);
        let count = self.customers.count(&filter, owner_id).await?;
        let customers = self
            .customers
            .find(&filter, owner_id, self.settings.audience_limit)
            .await?;
        metrics::record_audience_size("audience", count);

        Ok(Audience {
            segment_id: segment.id,
            count,
            customers,
            evaluated_at: now,
        })
    }
}

fn clamp_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
