//! 调用方身份
//!
//! 认证由上游网关完成，网关把已认证的用户 id 写入 `x-user-id` 请求头。

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// 当前调用方，分群和客户数据都按它隔离
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or_else(|| ServiceError::Unauthorized("missing user identity".to_string()))
    }
}
