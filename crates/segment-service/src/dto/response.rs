//! 响应 DTO 定义

use chrono::{DateTime, Utc};
use segment_engine::CompiledFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Customer, Segment};

/// 统一 API 响应包装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "操作成功")
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 客户摘要（预览样本和受众列表）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub spend: f64,
    pub visits: i64,
    pub last_order_date: Option<DateTime<Utc>>,
    pub inactive_days: Option<i64>,
}

impl CustomerDto {
    pub fn from_customer(customer: Customer, now: DateTime<Utc>) -> Self {
        Self {
            inactive_days: customer.inactive_days(now),
            id: customer.id,
            name: customer.name,
            email: customer.email,
            spend: customer.spend,
            visits: customer.visits,
            last_order_date: customer.last_order_date,
        }
    }
}

/// 预览结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub count: u64,
    pub sample: Vec<CustomerDto>,
}

/// 保存分群结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCreatedDto {
    pub id: Uuid,
    pub name: String,
    pub customer_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<&Segment> for SegmentCreatedDto {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id,
            name: segment.name.clone(),
            customer_count: segment.customer_count,
            created_at: segment.created_at,
        }
    }
}

/// 分群列表项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSummaryDto {
    pub id: Uuid,
    pub name: String,
    pub customer_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
}

impl From<Segment> for SegmentSummaryDto {
    fn from(segment: Segment) -> Self {
        Self {
            id: segment.id,
            name: segment.name,
            customer_count: segment.customer_count,
            created_at: segment.created_at,
            last_run: segment.last_run,
        }
    }
}

/// 分群详情
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDetailDto {
    pub id: Uuid,
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

impl From<Segment> for SegmentDetailDto {
    fn from(segment: Segment) -> Self {
        Self {
            id: segment.id,
            name: segment.name,
            description: segment.description,
            rules: segment.rules,
            compiled_filter: segment.compiled_filter,
            customer_count: segment.customer_count,
            is_active: segment.is_active,
            created_at: segment.created_at,
            updated_at: segment.updated_at,
            last_run: segment.last_run,
        }
    }
}

/// 受众解析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceResponse {
    pub segment_id: Uuid,
    pub count: u64,
    pub customers: Vec<CustomerDto>,
}

/// 批量刷新结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAllResponse {
    pub refreshed: usize,
    pub failed: usize,
}
