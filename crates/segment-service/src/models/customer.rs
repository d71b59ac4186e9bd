//! 客户实体

use chrono::{DateTime, Utc};
use segment_engine::{Attribute, FilterTarget, FilterValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// 客户
///
/// `owner_id` 是创建该客户的运营账号，所有查询都按它隔离。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub email: String,
    /// 累计消费金额
    pub spend: f64,
    /// 累计到店次数
    pub visits: i64,
    pub last_order_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            email: email.into(),
            spend: 0.0,
            visits: 0,
            last_order_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_spend(mut self, spend: f64) -> Self {
        self.spend = spend;
        self
    }

    pub fn with_visits(mut self, visits: i64) -> Self {
        self.visits = visits;
        self
    }

    pub fn with_last_order(mut self, at: DateTime<Utc>) -> Self {
        self.last_order_date = Some(at);
        self
    }

    /// 距最后一次下单的天数，向上取整；从未下单返回 None
    pub fn inactive_days(&self, now: DateTime<Utc>) -> Option<i64> {
        let last = self.last_order_date?;
        let millis = (now - last).num_milliseconds().abs();
        Some((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY)
    }
}

impl FilterTarget for Customer {
    fn attribute(&self, attribute: Attribute) -> Option<FilterValue> {
        match attribute {
            Attribute::Spend => Some(FilterValue::Number(self.spend)),
            Attribute::Visits => Some(FilterValue::Number(self.visits as f64)),
            Attribute::LastOrderDate => self.last_order_date.map(FilterValue::Timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_inactive_days_rounds_up() {
        let customer = Customer::new("u1", "Ada", "ada@example.com")
            .with_last_order(now() - Duration::days(3) - Duration::hours(1));
        assert_eq!(customer.inactive_days(now()), Some(4));

        let exact = Customer::new("u1", "Ada", "ada@example.com")
            .with_last_order(now() - Duration::days(3));
        assert_eq!(exact.inactive_days(now()), Some(3));
    }

    #[test]
    fn test_inactive_days_never_ordered() {
        let customer = Customer::new("u1", "Ada", "ada@example.com");
        assert_eq!(customer.inactive_days(now()), None);
    }

    #[test]
    fn test_filter_target() {
        let customer = Customer::new("u1", "Ada", "ada@example.com")
            .with_spend(12.5)
            .with_visits(3);
        assert_eq!(
            customer.attribute(Attribute::Spend),
            Some(FilterValue::Number(12.5))
        );
        assert_eq!(
            customer.attribute(Attribute::Visits),
            Some(FilterValue::Number(3.0))
        );
        assert_eq!(customer.attribute(Attribute::LastOrderDate), None);
    }
}
