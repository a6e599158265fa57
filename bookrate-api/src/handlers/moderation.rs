use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use bookrate_core::{
    ContentKind, ContentRef, ModerationAction, Report, ReportReason, ReportStatus,
};

use crate::error::ApiResult;
use crate::extract::{CurrentUser, Moderator};
use crate::state::AppState;

#[derive(Deserialize)]
struct NewReportRequest {
    target_type: String,
    target_id: Uuid,
    reason: ReportReason,
    note: Option<String>,
}

async fn submit_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewReportRequest>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let target = ContentRef::new(ContentKind::parse(&req.target_type)?, req.target_id);
    let report = state
        .services
        .moderation
        .submit_report(&user, target, req.reason, req.note)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Debug, Default, Deserialize)]
struct ReportListQuery {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_reports(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Query(query): Query<ReportListQuery>,
) -> ApiResult<Json<Vec<Report>>> {
    let status = query
        .status
        .as_deref()
        .map(ReportStatus::parse)
        .transpose()?;
    Ok(Json(
        state
            .services
            .moderation
            .list_reports(
                &moderator,
                status,
                Some(query.limit.unwrap_or(50).min(200)),
                query.offset,
            )
            .await?,
    ))
}

async fn report_detail(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    Ok(Json(
        state.services.moderation.get_report(&moderator, id).await?,
    ))
}

async fn claim_report(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Report>> {
    Ok(Json(
        state.services.moderation.claim_report(&moderator, id).await?,
    ))
}

#[derive(Deserialize)]
struct ResolveRequest {
    action: ModerationAction,
    note: Option<String>,
}

async fn resolve_report(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<Report>> {
    Ok(Json(
        state
            .services
            .moderation
            .resolve_report(&moderator, id, req.action, req.note)
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ActionListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_actions(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Query(query): Query<ActionListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let actions = state
        .services
        .moderation
        .list_actions(
            &moderator,
            Some(query.limit.unwrap_or(50).min(200)),
            query.offset,
        )
        .await?;
    Ok(Json(serde_json::to_value(actions)?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(submit_report))
        .route("/reports/:id", get(report_detail))
        .route("/reports/:id/claim", post(claim_report))
        .route("/reports/:id/resolve", post(resolve_report))
        .route("/actions", get(list_actions))
}
