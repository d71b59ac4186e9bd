//! 分群服务错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crm_shared::error::CrmError;
use serde_json::json;

/// 分群服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("未授权: {0}")]
    Unauthorized(String),

    // 验证错误
    #[error("{0}")]
    Validation(String),
    #[error("Invalid query rules")]
    InvalidRules(Vec<String>),

    // 业务错误
    #[error("A segment with this name already exists: {0}")]
    SegmentNameTaken(String),
    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ServiceError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::InvalidRules(_) => StatusCode::BAD_REQUEST,
            Self::SegmentNameTaken(_) => StatusCode::CONFLICT,
            Self::SegmentNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidRules(_) => "INVALID_RULES",
            Self::SegmentNameTaken(_) => "SEGMENT_NAME_TAKEN",
            Self::SegmentNotFound(_) => "SEGMENT_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        if let Self::InvalidRules(errors) = &self {
            body["errors"] = json!(errors);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从共享基础设施错误转换
impl From<CrmError> for ServiceError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Database(e) => Self::Database(e),
            CrmError::Validation(msg) => Self::Validation(msg),
            CrmError::NotFound { id, .. } => Self::SegmentNotFound(id),
            CrmError::AlreadyExists { value, .. } => Self::SegmentNameTaken(value),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;
