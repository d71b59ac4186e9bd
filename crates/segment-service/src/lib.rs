//! 客户分群服务
//!
//! 提供分群规则预览、保存、刷新和受众解析的 REST API。
//!
//! ## 模块结构
//!
//! - `auth`: 从网关注入的请求头读取调用方身份
//! - `dto`: 请求和响应的数据传输对象
//! - `models`: 客户与分群实体
//! - `store`: 存储接口及内存、PostgreSQL 实现
//! - `service`: 校验 → 编译 → 存储的业务编排
//! - `handlers` / `routes` / `state`: HTTP 层
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

pub use error::{Result, ServiceError};
pub use models::{Customer, Segment, SegmentStats};
pub use service::{Audience, NewSegment, Preview, RefreshSummary, SegmentService};
pub use state::AppState;
