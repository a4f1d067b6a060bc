use crate::common::response::{ApiError, ApiResponse};
use crate::modules::transform::dto::{TransformRequest, TransformResponse};
use crate::modules::transform::service::TransformationService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Submit a product for transformation
///
/// Returns as soon as the job is registered; poll the `Location` for progress.
#[utoipa::path(
    post,
    path = "/api/v1/transform",
    request_body = TransformRequest,
    params(
        (
            "Idempotency-Key" = Option<String>,
            Header,
            description = "Used when the body carries no idempotency_key"
        )
    ),
    responses(
        (
            status = 202,
            description = "Accepted for processing",
            body = ApiResponse<TransformResponse>
        ),
        (status = 400, description = "Invalid Request"),
        (status = 503, description = "Worker dispatch unavailable")
    ),
    tag = "Transform"
)]
pub async fn transform(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TransformRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(mut req) = match payload {
        Ok(req) => req,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    if req.idempotency_key.is_none() {
        req.idempotency_key = headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }

    match state.intake.transform(req).await {
        Ok(res) => {
            let message = if res.duplicate {
                "Transform request already accepted"
            } else {
                "Transform request accepted"
            };
            let location = res.location.clone();
            (
                StatusCode::ACCEPTED,
                [(header::LOCATION, location)],
                Json(ApiResponse::success(res, message)),
            )
                .into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
