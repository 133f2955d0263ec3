use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use kifu_shared::types::api::ApiResponse;
use kifu_shared::types::pagination::{Paginated, PaginationParams};
use kifu_shared::AppResult;

use crate::models::Report;
use crate::queue::ClaimOutcome;
use crate::registry::ReportRelation;
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub helpful: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportCounts {
    pub active: usize,
    pub available: usize,
    pub left_until_goal: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Claimed,
    Vanished,
    AlreadyClaimed,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub status: ClaimStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}

// --- Queue views ---

/// The reports this moderator should work on next.
pub async fn list_eligible(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<Report>>> {
    Json(ApiResponse::ok(state.queue.eligible_reports()))
}

/// Every visible report, including ones claimed by other moderators.
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Json<ApiResponse<Paginated<Report>>> {
    let sorted = state.queue.sorted_reports();
    Json(ApiResponse::ok(Paginated::from_slice(&sorted, &params)))
}

pub async fn count(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ReportCounts>> {
    let counts = state.queue.with_registry(|registry| ReportCounts {
        active: registry.active_count(),
        available: registry.available_reports().len(),
        left_until_goal: registry.reports_left_until_goal(),
    });
    Json(ApiResponse::ok(counts))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let report = state.queue.get_report(id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn related(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<ApiResponse<Vec<ReportRelation>>> {
    Json(ApiResponse::ok(state.queue.related_reports(id)))
}

// --- Actions ---

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ClaimResponse>>> {
    let response = match state.queue.claim(id).await? {
        ClaimOutcome::Claimed(report) => ApiResponse::ok(ClaimResponse {
            status: ClaimStatus::Claimed,
            report: Some(report),
        }),
        ClaimOutcome::Vanished => ApiResponse::ok_with_message(
            ClaimResponse { status: ClaimStatus::Vanished, report: None },
            "Report was removed",
        ),
        ClaimOutcome::AlreadyClaimed => ApiResponse::ok_with_message(
            ClaimResponse { status: ClaimStatus::AlreadyClaimed, report: None },
            "Report was removed",
        ),
    };
    Ok(Json(response))
}

pub async fn unclaim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let report = state.queue.unclaim(id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn steal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let report = state.queue.steal(id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn reopen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let report = state.queue.reopen(id).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ResolveRequest>,
) -> AppResult<Json<ApiResponse<Option<Report>>>> {
    let report = if body.helpful {
        state.queue.good_report(id).await?
    } else {
        state.queue.bad_report(id).await?
    };
    Ok(Json(ApiResponse::ok_with_message(report, "Report resolved")))
}

pub async fn ignore(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<ApiResponse<()>> {
    state.queue.ignore(id);
    Json(ApiResponse::ok_with_message((), "Report ignored for 7 days"))
}
