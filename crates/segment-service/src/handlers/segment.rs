//! 分群 API 处理器

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::CurrentUser,
    dto::{
        ApiResponse, AudienceResponse, CreateSegmentRequest, CustomerDto, PreviewResponse,
        PreviewSegmentRequest, RefreshAllResponse, SegmentCreatedDto, SegmentDetailDto,
        SegmentSummaryDto,
    },
    error::{Result, ServiceError},
    service::NewSegment,
    state::AppState,
};

/// 路径中的 id 不是合法 UUID 时按不存在处理
fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::SegmentNotFound(raw.to_string()))
}

/// 预览分群
///
/// POST /api/segments/preview
pub async fn preview_segment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PreviewSegmentRequest>,
) -> Result<Json<ApiResponse<PreviewResponse>>> {
    let preview = state.segments.preview(user.id(), &req.rules).await?;

    let sample = preview
        .sample
        .into_iter()
        .map(|c| CustomerDto::from_customer(c, preview.evaluated_at))
        .collect();

    Ok(Json(ApiResponse::success(PreviewResponse {
        count: preview.count,
        sample,
    })))
}

/// 保存分群
///
/// POST /api/segments
pub async fn create_segment(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SegmentCreatedDto>>)> {
    req.validate()?;

    let segment = state
        .segments
        .save(
            user.id(),
            NewSegment {
                name: req.name,
                description: req.description,
                rules: req.rules,
            },
        )
        .await?;

    info!(segment_id = %segment.id, owner = %user.id(), "Segment saved");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            SegmentCreatedDto::from(&segment),
            "Segment created successfully",
        )),
    ))
}

/// 分群列表
///
/// GET /api/segments
pub async fn list_segments(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<SegmentSummaryDto>>>> {
    let segments = state.segments.list(user.id()).await?;
    Ok(Json(ApiResponse::success(
        segments.into_iter().map(SegmentSummaryDto::from).collect(),
    )))
}

/// 分群详情
///
/// GET /api/segments/{id}
pub async fn get_segment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SegmentDetailDto>>> {
    let segment = state.segments.get(user.id(), parse_id(&id)?).await?;
    Ok(Json(ApiResponse::success(SegmentDetailDto::from(segment))))
}

/// 重新计算分群人数
///
/// POST /api/segments/{id}/refresh
pub async fn refresh_segment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SegmentDetailDto>>> {
    let segment = state.segments.refresh(user.id(), parse_id(&id)?).await?;
    Ok(Json(ApiResponse::success(SegmentDetailDto::from(segment))))
}

/// 刷新全部启用的分群
///
/// POST /api/segments/refresh-all
pub async fn refresh_all_segments(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<RefreshAllResponse>>> {
    let summary = state.segments.refresh_all(user.id()).await?;
    Ok(Json(ApiResponse::success(RefreshAllResponse {
        refreshed: summary.refreshed,
        failed: summary.failed,
    })))
}

/// 解析分群受众
///
/// GET /api/segments/{id}/audience
pub async fn segment_audience(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AudienceResponse>>> {
    let audience = state.segments.audience(user.id(), parse_id(&id)?).await?;

    let customers = audience
        .customers
        .into_iter()
        .map(|c| CustomerDto::from_customer(c, audience.evaluated_at))
        .collect();

    Ok(Json(ApiResponse::success(AudienceResponse {
        segment_id: audience.segment_id,
        count: audience.count,
        customers,
    })))
}
