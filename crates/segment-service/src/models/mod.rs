//! 领域模型
//!
//! 客户与分群两个实体，客户由上游系统写入，分群由本服务维护。

mod customer;
mod segment;

pub use customer::Customer;
pub use segment::{Segment, SegmentStats};
