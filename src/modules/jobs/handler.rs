use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::modules::jobs::dto::{JobResponse, UpdateStatusRequest};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = ApiResponse<JobResponse>),
        (status = 404, description = "Job Not Found")
    ),
    tag = "Jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.intake.job(id).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobResponse::from(job), "Job retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Worker status callback
#[utoipa::path(
    put,
    path = "/api/v1/jobs/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status recorded", body = ApiResponse<JobResponse>),
        (status = 400, description = "Malformed status update"),
        (status = 404, description = "Job Not Found"),
        (status = 409, description = "Transition not allowed from the current status")
    ),
    tag = "Jobs"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let status = req.status;
    match state.intake.report(id, status, req.detail()).await {
        Ok(job) => ApiSuccess(
            ApiResponse::success(JobResponse::from(job), "Status recorded"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
