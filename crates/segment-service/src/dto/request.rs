//! 请求 DTO 定义

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

/// 预览分群请求
///
/// `rules` 是未经信任的规则树，缺省时按 `null` 交给校验器处理。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSegmentRequest {
    #[serde(default)]
    pub rules: Value,
}

/// 保存分群请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSegmentRequest {
    /// 去除首尾空白后不能为空，由服务层检查
    #[serde(default)]
    #[validate(length(max = 100, message = "分群名称不能超过100个字符"))]
    pub name: String,
    #[validate(length(max = 500, message = "分群描述不能超过500个字符"))]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Value,
}
