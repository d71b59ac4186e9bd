//! PostgreSQL 存储
//!
//! 编译后的过滤条件经 `QueryBuilder` 翻译为 WHERE 子句，所有比较值都以绑定参数传入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use segment_engine::{Attribute, Comparator, CompiledFilter, FilterValue};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::{CustomerStore, SegmentRepository};
use crate::error::{Result, ServiceError};
use crate::models::{Customer, Segment, SegmentStats};

/// 建表脚本，可重复执行
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id UUID PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    spend DOUBLE PRECISION NOT NULL DEFAULT 0,
    visits BIGINT NOT NULL DEFAULT 0,
    last_order_date TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_customers_owner_last_order
    ON customers (owner_id, last_order_date DESC NULLS LAST);

CREATE TABLE IF NOT EXISTS segments (
    id UUID PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    rules JSONB NOT NULL,
    compiled_filter JSONB NOT NULL,
    customer_count BIGINT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    last_run TIMESTAMPTZ,
    CONSTRAINT uq_segments_owner_name UNIQUE (owner_id, name)
);
"#;

const CUSTOMER_COLUMNS: &str =
    "id, owner_id, name, email, spend, visits, last_order_date, created_at";

const SEGMENT_COLUMNS: &str = "id, owner_id, name, description, rules, compiled_filter, \
     customer_count, is_active, created_at, updated_at, last_run";

fn is_temporal(attribute: Attribute) -> bool {
    matches!(attribute, Attribute::LastOrderDate)
}

/// 把过滤条件追加到查询中
///
/// 缺失值（NULL）只满足 `ne`，与内存求值保持一致。
pub(crate) fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &CompiledFilter) {
    match filter {
        CompiledFilter::MatchAll => {
            builder.push("TRUE");
        }
        CompiledFilter::And { clauses } | CompiledFilter::Or { clauses } => {
            let (joiner, empty) = if matches!(filter, CompiledFilter::And { .. }) {
                (" AND ", "TRUE")
            } else {
                (" OR ", "FALSE")
            };
            if clauses.is_empty() {
                builder.push(empty);
                return;
            }
            builder.push("(");
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    builder.push(joiner);
                }
                push_filter(builder, clause);
            }
            builder.push(")");
        }
        CompiledFilter::Compare {
            attribute,
            comparator,
            value,
        } => {
            let column = attribute.column();
            let type_matches = matches!(
                (is_temporal(*attribute), value),
                (true, FilterValue::Timestamp(_)) | (false, FilterValue::Number(_))
            );
            // 类型不符等同于属性缺失
            if !type_matches {
                builder.push(if *comparator == Comparator::Ne { "TRUE" } else { "FALSE" });
                return;
            }

            if *comparator == Comparator::Ne {
                builder.push(format_args!("({column} IS NULL OR {column} <> "));
                push_value(builder, value);
                builder.push(")");
            } else {
                builder.push(format_args!("{column} {} ", comparator.sql()));
                push_value(builder, value);
            }
        }
        CompiledFilter::Pattern { attribute, pattern } => {
            builder.push(format_args!("CAST({} AS TEXT) ~* ", attribute.column()));
            builder.push_bind(pattern.clone());
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Number(n) => {
            builder.push_bind(*n);
        }
        FilterValue::Timestamp(t) => {
            builder.push_bind(*t);
        }
    }
}

/// PostgreSQL 客户存储
pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn scoped<'a>(prefix: &str, filter: &CompiledFilter, owner_id: &str) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(prefix);
        builder.push(" WHERE owner_id = ");
        builder.push_bind(owner_id.to_string());
        builder.push(" AND ");
        push_filter(&mut builder, filter);
        builder
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    #[instrument(skip(self, filter))]
    async fn count(&self, filter: &CompiledFilter, owner_id: &str) -> Result<u64> {
        let mut builder = Self::scoped("SELECT COUNT(*) FROM customers", filter, owner_id);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, filter))]
    async fn find(
        &self,
        filter: &CompiledFilter,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Customer>> {
        let prefix = format!("SELECT {CUSTOMER_COLUMNS} FROM customers");
        let mut builder = Self::scoped(&prefix, filter, owner_id);
        builder.push(" ORDER BY last_order_date DESC NULLS LAST, id ASC LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let customers = builder
            .build_query_as::<Customer>()
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }
}

/// 数据库查询结果行结构
#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: Uuid,
    owner_id: String,
    name: String,
    description: Option<String>,
    rules: Json<Value>,
    compiled_filter: Json<CompiledFilter>,
    customer_count: Option<i64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            rules: row.rules.0,
            compiled_filter: row.compiled_filter.0,
            customer_count: row.customer_count,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_run: row.last_run,
        }
    }
}

/// PostgreSQL 分群仓储
pub struct PgSegmentRepository {
    pool: PgPool,
}

impl PgSegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl SegmentRepository for PgSegmentRepository {
    #[instrument(skip(self, segment), fields(segment_id = %segment.id))]
    async fn insert(&self, segment: &Segment) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO segments (id, owner_id, name, description, rules, compiled_filter,
                                  customer_count, is_active, created_at, updated_at, last_run)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(segment.id)
        .bind(&segment.owner_id)
        .bind(&segment.name)
        .bind(&segment.description)
        .bind(Json(&segment.rules))
        .bind(Json(&segment.compiled_filter))
        .bind(segment.customer_count)
        .bind(segment.is_active)
        .bind(segment.created_at)
        .bind(segment.updated_at)
        .bind(segment.last_run)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(ServiceError::SegmentNameTaken(segment.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_name(&self, owner_id: &str, name: &str) -> Result<Option<Segment>> {
        let row = sqlx::query_as::<_, SegmentRow>(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments WHERE owner_id = $1 AND name = $2"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Segment::from))
    }

    async fn get(&self, owner_id: &str, id: Uuid) -> Result<Option<Segment>> {
        let row = sqlx::query_as::<_, SegmentRow>(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Segment::from))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Segment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments WHERE owner_id = $1 \
             ORDER BY created_at DESC, id ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Segment::from).collect())
    }

    #[instrument(skip(self, stats))]
    async fn update_stats(&self, id: Uuid, stats: &SegmentStats) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE segments
            SET compiled_filter = $2, customer_count = $3, last_run = $4, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&stats.compiled_filter))
        .bind(stats.customer_count)
        .bind(stats.last_run)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::SegmentNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sql(filter: &CompiledFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_filter(&mut builder, filter);
        builder.sql().to_string()
    }

    fn spend(comparator: Comparator, n: f64) -> CompiledFilter {
        CompiledFilter::compare(Attribute::Spend, comparator, FilterValue::Number(n))
    }

    #[test]
    fn test_match_all() {
        assert_eq!(sql(&CompiledFilter::MatchAll), "TRUE");
    }

    #[test]
    fn test_comparison_uses_placeholders() {
        assert_eq!(sql(&spend(Comparator::Gte, 10.0)), "spend >= $1");
    }

    #[test]
    fn test_ne_keeps_null_rows() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = CompiledFilter::compare(
            Attribute::LastOrderDate,
            Comparator::Ne,
            FilterValue::Timestamp(at),
        );
        assert_eq!(
            sql(&filter),
            "(last_order_date IS NULL OR last_order_date <> $1)"
        );
    }

    #[test]
    fn test_nested_groups() {
        let filter = CompiledFilter::And {
            clauses: vec![
                spend(Comparator::Gt, 1000.0),
                CompiledFilter::Or {
                    clauses: vec![
                        CompiledFilter::compare(
                            Attribute::Visits,
                            Comparator::Lt,
                            FilterValue::Number(3.0),
                        ),
                        spend(Comparator::Eq, 0.0),
                    ],
                },
            ],
        };
        assert_eq!(
            sql(&filter),
            "(spend > $1 AND (visits < $2 OR spend = $3))"
        );
    }

    #[test]
    fn test_type_mismatch_is_constant() {
        let filter = CompiledFilter::compare(
            Attribute::LastOrderDate,
            Comparator::Gt,
            FilterValue::Number(1.0),
        );
        assert_eq!(sql(&filter), "FALSE");

        let filter = CompiledFilter::compare(
            Attribute::LastOrderDate,
            Comparator::Ne,
            FilterValue::Number(1.0),
        );
        assert_eq!(sql(&filter), "TRUE");
    }

    #[test]
    fn test_pattern() {
        let filter = CompiledFilter::Pattern {
            attribute: Attribute::Spend,
            pattern: r"1\.5".to_string(),
        };
        assert_eq!(sql(&filter), "CAST(spend AS TEXT) ~* $1");
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(sql(&CompiledFilter::And { clauses: vec![] }), "TRUE");
        assert_eq!(sql(&CompiledFilter::Or { clauses: vec![] }), "FALSE");
    }

    #[test]
    fn test_schema_is_idempotent() {
        assert!(SCHEMA.matches("IF NOT EXISTS").count() >= 3);
    }
}
