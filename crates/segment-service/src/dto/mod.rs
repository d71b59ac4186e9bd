//! 数据传输对象

pub mod request;
pub mod response;

pub use request::{CreateSegmentRequest, PreviewSegmentRequest};
pub use response::{
    ApiResponse, AudienceResponse, CustomerDto, PreviewResponse, RefreshAllResponse,
    SegmentCreatedDto, SegmentDetailDto, SegmentSummaryDto,
};
