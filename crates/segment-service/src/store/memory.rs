//! 内存存储
//!
//! 基于 DashMap，每次扫描构建一次 `FilterMatcher` 对客户逐条求值。

use std::cmp::Ordering;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use segment_engine::CompiledFilter;
use uuid::Uuid;

use super::{CustomerStore, SegmentRepository};
use crate::error::{Result, ServiceError};
use crate::models::{Customer, Segment, SegmentStats};

/// 内存客户存储
#[derive(Default)]
pub struct MemoryCustomerStore {
    customers: DashMap<Uuid, Customer>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    fn matching(&self, filter: &CompiledFilter, owner_id: &str) -> Vec<Customer> {
        let matcher = filter.matcher();
        self.customers
            .iter()
            .filter(|entry| entry.owner_id == owner_id && matcher.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// 最后下单时间倒序，未下单排最后，id 保证顺序稳定
fn by_recent_order(a: &Customer, b: &Customer) -> Ordering {
    match (a.last_order_date, b.last_order_date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn count(&self, filter: &CompiledFilter, owner_id: &str) -> Result<u64> {
        let matcher = filter.matcher();
        let count = self
            .customers
            .iter()
            .filter(|entry| entry.owner_id == owner_id && matcher.matches(entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn find(
        &self,
        filter: &CompiledFilter,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Customer>> {
        let mut customers = self.matching(filter, owner_id);
        customers.sort_by(by_recent_order);
        customers.truncate(limit);
        Ok(customers)
    }
}

/// 内存分群仓储
#[derive(Default)]
pub struct MemorySegmentRepository {
    segments: DashMap<Uuid, Segment>,
    /// (owner_id, name) -> id，保证同一账号下名称唯一
    names: DashMap<(String, String), Uuid>,
}

impl MemorySegmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentRepository for MemorySegmentRepository {
    async fn insert(&self, segment: &Segment) -> Result<()> {
        match self
            .names
            .entry((segment.owner_id.clone(), segment.name.clone()))
        {
            Entry::Occupied(_) => Err(ServiceError::SegmentNameTaken(segment.name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(segment.id);
                self.segments.insert(segment.id, segment.clone());
                Ok(())
            }
        }
    }

    async fn find_by_name(&self, owner_id: &str, name: &str) -> Result<Option<Segment>> {
        let id = self
            .names
            .get(&(owner_id.to_string(), name.to_string()))
            .map(|entry| *entry.value());

        Ok(id.and_then(|id| self.segments.get(&id).map(|s| s.value().clone())))
    }

    async fn get(&self, owner_id: &str, id: Uuid) -> Result<Option<Segment>> {
        Ok(self
            .segments
            .get(&id)
            .filter(|s| s.owner_id == owner_id)
            .map(|s| s.value().clone()))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .map(|s| s.value().clone())
            .collect();
        segments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(segments)
    }

    async fn update_stats(&self, id: Uuid, stats: &SegmentStats) -> Result<()> {
        let mut segment = self
            .segments
            .get_mut(&id)
            .ok_or_else(|| ServiceError::SegmentNotFound(id.to_string()))?;
        segment.apply_stats(stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use segment_engine::{Attribute, Comparator, FilterValue};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn seeded() -> MemoryCustomerStore {
        let store = MemoryCustomerStore::new();
        store.insert(
            Customer::new("u1", "old", "old@example.com")
                .with_spend(100.0)
                .with_last_order(now() - Duration::days(90)),
        );
        store.insert(
            Customer::new("u1", "recent", "recent@example.com")
                .with_spend(2000.0)
                .with_last_order(now() - Duration::days(1)),
        );
        store.insert(Customer::new("u1", "never", "never@example.com").with_spend(5000.0));
        store.insert(Customer::new("u2", "other-owner", "x@example.com").with_spend(9000.0));
        store
    }

    #[tokio::test]
    async fn test_count_is_scoped_to_owner() {
        let store = seeded();
        assert_eq!(store.count(&CompiledFilter::MatchAll, "u1").await.unwrap(), 3);
        assert_eq!(store.count(&CompiledFilter::MatchAll, "u2").await.unwrap(), 1);
        assert_eq!(store.count(&CompiledFilter::MatchAll, "u3").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_orders_by_last_order_nulls_last() {
        let store = seeded();
        let names: Vec<String> = store
            .find(&CompiledFilter::MatchAll, "u1", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["recent", "old", "never"]);
    }

    #[tokio::test]
    async fn test_find_applies_filter_and_limit() {
        let store = seeded();
        let filter =
            CompiledFilter::compare(Attribute::Spend, Comparator::Gt, FilterValue::Number(1000.0));

        let all = store.find(&filter, "u1", 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let limited = store.find(&filter, "u1", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].name, "recent");
    }

    fn segment(owner: &str, name: &str, created_at: DateTime<Utc>) -> Segment {
        Segment::new(
            owner,
            name,
            None,
            json!({"combinator": "and", "rules": []}),
            CompiledFilter::MatchAll,
            created_at,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_name_per_owner() {
        let repo = MemorySegmentRepository::new();
        repo.insert(&segment("u1", "VIP", now())).await.unwrap();

        let err = repo.insert(&segment("u1", "VIP", now())).await.unwrap_err();
        assert!(matches!(err, ServiceError::SegmentNameTaken(name) if name == "VIP"));

        // 不同账号可以同名
        repo.insert(&segment("u2", "VIP", now())).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_is_scoped_to_owner() {
        let repo = MemorySegmentRepository::new();
        let seg = segment("u1", "VIP", now());
        repo.insert(&seg).await.unwrap();

        assert!(repo.get("u1", seg.id).await.unwrap().is_some());
        assert!(repo.get("u2", seg.id).await.unwrap().is_none());
        assert!(repo.find_by_name("u1", "VIP").await.unwrap().is_some());
        assert!(repo.find_by_name("u2", "VIP").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = MemorySegmentRepository::new();
        repo.insert(&segment("u1", "first", now())).await.unwrap();
        repo.insert(&segment("u1", "second", now() + Duration::hours(1)))
            .await
            .unwrap();

        let names: Vec<String> = repo
            .list("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_update_stats() {
        let repo = MemorySegmentRepository::new();
        let seg = segment("u1", "VIP", now());
        repo.insert(&seg).await.unwrap();

        let run = now() + Duration::days(1);
        repo.update_stats(
            seg.id,
            &SegmentStats {
                compiled_filter: CompiledFilter::MatchAll,
                customer_count: 7,
                last_run: run,
            },
        )
        .await
        .unwrap();

        let stored = repo.get("u1", seg.id).await.unwrap().unwrap();
        assert_eq!(stored.customer_count, Some(7));
        assert_eq!(stored.last_run, Some(run));

        let missing = repo
            .update_stats(
                Uuid::new_v4(),
                &SegmentStats {
                    compiled_filter: CompiledFilter::MatchAll,
                    customer_count: 0,
                    last_run: run,
                },
            )
            .await;
        assert!(matches!(missing, Err(ServiceError::SegmentNotFound(_))));
    }
}
